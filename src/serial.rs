//! Binary serialization and deserialization of compiled programs.
//!
//! A compiled [`Program`](crate::Program) can be persisted and reloaded
//! without recompiling its forest. The format consists of a 32-byte fixed
//! header followed by a bincode-encoded payload.
//!
//! ## Layout
//!
//! ```text
//! bytes   field
//! 0..4    magic b"RQFB"
//! 4..6    format version, u16 LE
//! 6..8    engine version, u16 LE (informational)
//! 8..12   flags, reserved as zero
//! 12..16  payload length, u32 LE
//! 16..32  first 16 bytes of the payload's BLAKE3 digest
//! 32..    bincode payload
//! ```
//!
//! A blob whose format version differs from [`FORMAT_VERSION`] is refused
//! with [`DeserializeError::IncompatibleVersion`] before the payload is read.
//!
//! Decoded programs are checked structurally before they are handed to a
//! [`Vm`](crate::Vm): opcodes, execution modes, jump targets, string
//! offsets and entry points must all be in range.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Code, ExecutionMode, Instruction, Memory, Opcode, Operands, Program};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAGIC: &[u8; 4] = b"RQFB";
const FORMAT_VERSION: u16 = 1;
const ENGINE_VERSION: u16 = 1;
const HEADER_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when serializing a [`Program`](crate::Program) to bytes.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to encode program: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to write program: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when deserializing a [`Program`](crate::Program) from bytes.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("not a reqfilter binary: invalid magic bytes")]
    BadMagic,

    #[error("blob uses format v{blob}, this build reads v{supported}")]
    IncompatibleVersion { blob: u16, supported: u16 },

    #[error("payload digest does not match the header")]
    ChecksumMismatch,

    #[error("truncated blob: needed {expected} bytes, found {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("malformed payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("invalid program: {0}")]
    Validation(String),

    #[error("failed to read program: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Serialized type hierarchy
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SerializedProgram {
    metadata: ProgramMetadata,
    /// `[opcode, a, b, c]` per slot.
    code: Vec<[u32; 4]>,
    memory: Vec<u8>,
    offsets: Vec<u32>,
    entries: Vec<(String, u32)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProgramMetadata {
    instruction_count: usize,
    memory_len: usize,
    entry_count: usize,
}

// ---------------------------------------------------------------------------
// Program <-> SerializedProgram
// ---------------------------------------------------------------------------

fn program_to_serialized(program: &Program) -> SerializedProgram {
    let code: Vec<[u32; 4]> = program
        .code
        .iter()
        .map(|ins| [ins.op.as_u32(), ins.a, ins.b, ins.c])
        .collect();

    SerializedProgram {
        metadata: ProgramMetadata {
            instruction_count: code.len(),
            memory_len: program.memory.len(),
            entry_count: program.entries.len(),
        },
        code,
        memory: program.memory.as_bytes().to_vec(),
        offsets: program.offsets.clone(),
        entries: program.entries.clone(),
    }
}

fn serialized_to_program(ser: SerializedProgram) -> Result<Program, DeserializeError> {
    validate(&ser)?;

    let code = ser
        .code
        .iter()
        .map(|&[op, a, b, c]| Instruction::from_raw(op, a, b, c))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Program::with_entries(
        Code::new(code),
        Memory::from_bytes(ser.memory),
        ser.offsets,
        ser.entries,
    ))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(ser: &SerializedProgram) -> Result<(), DeserializeError> {
    let len = ser.code.len();

    // Metadata consistency
    if ser.metadata.instruction_count != len {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} instructions but payload has {}",
            ser.metadata.instruction_count, len
        )));
    }
    if ser.metadata.memory_len != ser.memory.len() {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} bytes of memory but payload has {}",
            ser.metadata.memory_len,
            ser.memory.len()
        )));
    }
    if ser.metadata.entry_count != ser.entries.len() {
        return Err(DeserializeError::Validation(format!(
            "metadata says {} entries but payload has {}",
            ser.metadata.entry_count,
            ser.entries.len()
        )));
    }

    // Memory framing
    if ser.memory.first() != Some(&0) || ser.memory.last() != Some(&0) {
        return Err(DeserializeError::Validation(
            "memory must start and end with a NUL byte".to_owned(),
        ));
    }
    let memory = Memory::from_bytes(ser.memory.clone());

    for (slot, &[op, a, b, c]) in ser.code.iter().enumerate() {
        validate_instruction(slot, Instruction::from_raw(op, a, b, c)?, len, &memory)?;
    }

    // Entry points
    for &offset in &ser.offsets {
        if offset as usize >= len {
            return Err(DeserializeError::Validation(format!(
                "entry offset {offset} out of bounds (max {len})"
            )));
        }
    }
    for (name, offset) in &ser.entries {
        if *offset as usize >= len {
            return Err(DeserializeError::Validation(format!(
                "entry '{name}' at {offset} out of bounds (max {len})"
            )));
        }
    }
    for window in ser.entries.windows(2) {
        if window[0].0 >= window[1].0 {
            return Err(DeserializeError::Validation(
                "entries not sorted by unique name".to_owned(),
            ));
        }
    }

    Ok(())
}

fn validate_instruction(
    slot: usize,
    ins: Instruction,
    len: usize,
    memory: &Memory,
) -> Result<(), DeserializeError> {
    let string = |offset: u32| -> Result<(), DeserializeError> {
        if memory.is_string_start(offset) {
            Ok(())
        } else {
            Err(DeserializeError::Validation(format!(
                "slot {slot}: {} operand {offset} is not a string in memory",
                ins.op
            )))
        }
    };
    let target = |target: u32| -> Result<(), DeserializeError> {
        if (target as usize) < len {
            Ok(())
        } else {
            Err(DeserializeError::Validation(format!(
                "slot {slot}: {} target {target} out of bounds (max {len})",
                ins.op
            )))
        }
    };

    match ins.op.operands() {
        Operands::Nullary => Ok(()),
        Operands::Label | Operands::Name | Operands::Threshold => string(ins.a),
        Operands::Text => {
            string(ins.a)?;
            if memory.str_at(ins.a).len() < ins.b as usize {
                return Err(DeserializeError::Validation(format!(
                    "slot {slot}: length {} exceeds its string",
                    ins.b
                )));
            }
            Ok(())
        }
        Operands::NameValue | Operands::MarkerThreshold => {
            string(ins.a)?;
            string(ins.b)
        }
        Operands::Print => {
            string(ins.a)?;
            string(ins.b)?;
            if ins.c != 0 && ExecutionMode::from_u32(ins.c).is_none() {
                return Err(DeserializeError::Validation(format!(
                    "slot {slot}: invalid print guard {}",
                    ins.c
                )));
            }
            Ok(())
        }
        Operands::Call => {
            if ExecutionMode::from_u32(ins.a).is_none() {
                return Err(DeserializeError::Validation(format!(
                    "slot {slot}: invalid execution mode {}",
                    ins.a
                )));
            }
            target(ins.b)
        }
        Operands::Jump => {
            if ins.a as usize == slot {
                return Err(DeserializeError::Validation(format!(
                    "slot {slot}: redirect targets itself"
                )));
            }
            target(ins.a)
        }
    }
}

impl Instruction {
    fn from_raw(op: u32, a: u32, b: u32, c: u32) -> Result<Self, DeserializeError> {
        Opcode::from_u32(op)
            .map(|op| Self::new(op, a, b, c))
            .ok_or_else(|| DeserializeError::Validation(format!("unknown opcode {op}")))
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

const DIGEST_LEN: usize = 16;

/// Decoded fixed-size prefix of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    format_version: u16,
    payload_len: u32,
    digest: [u8; DIGEST_LEN],
}

impl Header {
    fn for_payload(payload: &[u8]) -> Self {
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&blake3::hash(payload).as_bytes()[..DIGEST_LEN]);
        #[allow(clippy::cast_possible_truncation)] // programs stay far below 4 GiB
        let payload_len = payload.len() as u32;
        Self {
            format_version: FORMAT_VERSION,
            payload_len,
            digest,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.format_version.to_le_bytes());
        out.extend_from_slice(&ENGINE_VERSION.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&self.payload_len.to_le_bytes());
        out.extend_from_slice(&self.digest);
    }

    #[allow(clippy::cast_possible_truncation)] // HEADER_SIZE is 32
    fn parse(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let Some(head) = bytes.get(..HEADER_SIZE) else {
            return Err(DeserializeError::LengthMismatch {
                expected: HEADER_SIZE as u32,
                actual: bytes.len(),
            });
        };
        if &head[..4] != MAGIC {
            return Err(DeserializeError::BadMagic);
        }
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&head[16..]);
        Ok(Self {
            format_version: u16::from_le_bytes([head[4], head[5]]),
            payload_len: u32::from_le_bytes([head[12], head[13], head[14], head[15]]),
            digest,
        })
    }

    /// The payload this header describes, once version, length and digest agree.
    fn payload<'b>(&self, bytes: &'b [u8]) -> Result<&'b [u8], DeserializeError> {
        if self.format_version != FORMAT_VERSION {
            return Err(DeserializeError::IncompatibleVersion {
                blob: self.format_version,
                supported: FORMAT_VERSION,
            });
        }
        let body = &bytes[HEADER_SIZE..];
        let Some(payload) = body.get(..self.payload_len as usize) else {
            return Err(DeserializeError::LengthMismatch {
                expected: self.payload_len,
                actual: body.len(),
            });
        };
        if Self::for_payload(payload).digest != self.digest {
            return Err(DeserializeError::ChecksumMismatch);
        }
        Ok(payload)
    }
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

pub(crate) fn encode(program: &Program) -> Result<Vec<u8>, SerializeError> {
    let config = bincode::config::standard();
    let payload = bincode::serde::encode_to_vec(program_to_serialized(program), config)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    Header::for_payload(&payload).write(&mut out);
    out.extend_from_slice(&payload);
    Ok(out)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Program, DeserializeError> {
    let payload = Header::parse(bytes)?.payload(bytes)?;
    let (serialized, _): (SerializedProgram, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
    serialized_to_program(serialized)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
