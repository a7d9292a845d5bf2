//! Low-level bytecode emitter.
//!
//! [`Assembler`] appends one instruction per call and interns string
//! operands into a shared arena. Each predicate family has a typed helper;
//! string arguments a caller may legitimately omit are `Option<&str>`, and
//! omitting a required one yields [`AssembleError::InvalidArgument`].

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::{AssembleError, Code, ExecutionMode, Instruction, Memory, Opcode, Program};

#[derive(Debug, Clone)]
pub struct Assembler {
    code: Vec<Instruction>,
    memory: Vec<u8>,
    interned: HashMap<String, u32>,
    labels: Vec<(String, u32)>,
}

/// Saved emitter state, used to discard a partially emitted tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Checkpoint {
    code: usize,
    memory: usize,
    labels: usize,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            memory: vec![0],
            interned: HashMap::new(),
            labels: Vec::new(),
        }
    }

    /// Number of instructions emitted so far; also the slot of the next one.
    #[must_use]
    pub fn code_size(&self) -> u32 {
        u32::try_from(self.code.len()).expect("code exceeds u32::MAX instructions")
    }

    #[must_use]
    pub fn memory_size(&self) -> u32 {
        u32::try_from(self.memory.len()).expect("memory exceeds u32::MAX bytes")
    }

    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    #[must_use]
    pub fn memory_bytes(&self) -> &[u8] {
        &self.memory
    }

    /// Append one instruction and return its slot.
    pub fn push(&mut self, op: Opcode, a: u32, b: u32, c: u32) -> u32 {
        let slot = self.code_size();
        self.code.push(Instruction::new(op, a, b, c));
        slot
    }

    /// Append an instruction from a raw opcode word.
    ///
    /// # Panics
    ///
    /// Panics if `op` is not a valid opcode.
    pub fn push_raw(&mut self, op: u32, a: u32, b: u32, c: u32) -> u32 {
        let Some(op) = Opcode::from_u32(op) else {
            panic!("opcode {op} out of range");
        };
        self.push(op, a, b, c)
    }

    /// Intern `value` and return its byte offset.
    ///
    /// Absent or empty strings map to offset 0. Identical strings share one
    /// copy.
    ///
    /// # Panics
    ///
    /// Panics if `value` contains a NUL byte.
    pub fn push_memory(&mut self, value: Option<&str>) -> u32 {
        let value = match value {
            None | Some("") => return 0,
            Some(v) => v,
        };
        assert!(!value.contains('\0'), "interned strings cannot contain NUL");
        if let Some(&offset) = self.interned.get(value) {
            return offset;
        }
        let offset = self.memory_size();
        self.memory.extend_from_slice(value.as_bytes());
        self.memory.push(0);
        self.interned.insert(value.to_owned(), offset);
        offset
    }

    /// Name `slot`. The first definition of a name wins.
    pub fn label(&mut self, name: &str, slot: u32) -> bool {
        if self.label_offset(name).is_some() {
            return false;
        }
        self.labels.push((name.to_owned(), slot));
        true
    }

    #[must_use]
    pub fn label_offset(&self, name: &str) -> Option<u32> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, slot)| *slot)
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            code: self.code.len(),
            memory: self.memory.len(),
            labels: self.labels.len(),
        }
    }

    pub(crate) fn rollback(&mut self, to: Checkpoint) {
        self.code.truncate(to.code);
        self.memory.truncate(to.memory);
        self.labels.truncate(to.labels);
        let limit = to.memory;
        self.interned.retain(|_, offset| (*offset as usize) < limit);
    }

    pub(crate) fn into_parts(self) -> (Code, Memory, Vec<(String, u32)>) {
        (
            Code::new(self.code),
            Memory::from_bytes(self.memory),
            self.labels,
        )
    }

    /// Finish assembly. Labels become the program's named entries.
    #[must_use]
    pub fn into_program(self) -> Program {
        let (code, memory, labels) = self.into_parts();
        Program::with_entries(code, memory, Vec::new(), labels)
    }

    // -- control --

    pub fn push_halt(&mut self) -> u32 {
        self.push(Opcode::Halt, 0, 0, 0)
    }

    pub fn push_skip(&mut self, label: Option<&str>) -> u32 {
        let a = self.push_memory(label);
        self.push(Opcode::Skip, a, 0, 0)
    }

    /// Call the block at `target` under `mode`. A `budget` of 0 is unbounded.
    ///
    /// `target` must already be emitted.
    pub fn push_execute(
        &mut self,
        mode: ExecutionMode,
        target: u32,
        budget: u32,
    ) -> Result<u32, AssembleError> {
        self.emitted(target, 2)?;
        Ok(self.push(Opcode::Execute, mode.as_u32(), target, budget))
    }

    /// One-instruction redirect to `target`, resolved while fetching.
    ///
    /// `target` must already be emitted, so a redirect never points at itself.
    pub fn push_execute_single(&mut self, target: u32) -> Result<u32, AssembleError> {
        self.emitted(target, 1)?;
        Ok(self.push(Opcode::ExecuteSingle, target, 0, 0))
    }

    fn emitted(&self, target: u32, position: u8) -> Result<(), AssembleError> {
        match target.cmp(&self.code_size()) {
            Ordering::Less => Ok(()),
            Ordering::Equal => Err(AssembleError::InvalidArgument {
                position,
                reason: "target is the instruction itself",
            }),
            Ordering::Greater => Err(AssembleError::InvalidArgument {
                position,
                reason: "target outside emitted code",
            }),
        }
    }

    pub fn push_return(&mut self) -> u32 {
        self.push(Opcode::Return, 0, 0, 0)
    }

    pub fn push_none(&mut self) -> u32 {
        self.push(Opcode::None, 0, 0, 0)
    }

    pub fn push_and(&mut self) -> u32 {
        self.push(Opcode::And, 0, 0, 0)
    }

    pub fn push_or(&mut self) -> u32 {
        self.push(Opcode::Or, 0, 0, 0)
    }

    pub fn push_not(&mut self) -> u32 {
        self.push(Opcode::Not, 0, 0, 0)
    }

    pub fn push_flip(&mut self) -> u32 {
        self.push(Opcode::Flip, 0, 0, 0)
    }

    pub fn push_true(&mut self) -> u32 {
        self.push(Opcode::True, 0, 0, 0)
    }

    pub fn push_false(&mut self) -> u32 {
        self.push(Opcode::False, 0, 0, 0)
    }

    // -- diagnostics --

    /// Emit a debug print. With `guard` And it fires only while Result is
    /// true, with Or only while Result is false, with None always.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError::InvalidArgument`] if `message` is absent.
    pub fn push_print_debug(
        &mut self,
        message: Option<&str>,
        tag: Option<&str>,
        guard: ExecutionMode,
    ) -> Result<u32, AssembleError> {
        self.push_print(Opcode::PrintDebug, message, tag, guard)
    }

    /// Emit an error print; see [`push_print_debug`](Self::push_print_debug).
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError::InvalidArgument`] if `message` is absent.
    pub fn push_print_error(
        &mut self,
        message: Option<&str>,
        tag: Option<&str>,
        guard: ExecutionMode,
    ) -> Result<u32, AssembleError> {
        self.push_print(Opcode::PrintError, message, tag, guard)
    }

    fn push_print(
        &mut self,
        op: Opcode,
        message: Option<&str>,
        tag: Option<&str>,
        guard: ExecutionMode,
    ) -> Result<u32, AssembleError> {
        let message = required(message, 1)?;
        let tag = tag.map(|t| checked(t, 2)).transpose()?;
        let a = self.push_memory(Some(message));
        let b = self.push_memory(tag);
        Ok(self.push(op, a, b, guard.as_u32()))
    }

    // -- method, scheme, domain, path --
    //
    // `len` is the number of leading bytes of `value` the predicate compares.

    pub fn push_is_method(&mut self, value: Option<&str>, len: u32) -> Result<u32, AssembleError> {
        self.push_text(Opcode::IsMethod, value, len, 0)
    }

    pub fn push_is_scheme(&mut self, value: Option<&str>, len: u32) -> Result<u32, AssembleError> {
        self.push_text(Opcode::IsScheme, value, len, 0)
    }

    pub fn push_contains_domain(
        &mut self,
        value: Option<&str>,
        len: u32,
    ) -> Result<u32, AssembleError> {
        self.push_text(Opcode::ContainsDomain, value, len, 0)
    }

    pub fn push_equal_domain(
        &mut self,
        value: Option<&str>,
        len: u32,
    ) -> Result<u32, AssembleError> {
        self.push_text(Opcode::EqualDomain, value, len, 0)
    }

    pub fn push_not_equal_domain(
        &mut self,
        value: Option<&str>,
        len: u32,
    ) -> Result<u32, AssembleError> {
        self.push_text(Opcode::NotEqualDomain, value, len, 0)
    }

    /// Domain has `value` at byte offset `at`.
    pub fn push_starts_with_domain(
        &mut self,
        value: Option<&str>,
        len: u32,
        at: u32,
    ) -> Result<u32, AssembleError> {
        self.push_text(Opcode::StartsWithDomain, value, len, at)
    }

    pub fn push_contains_path(
        &mut self,
        value: Option<&str>,
        len: u32,
    ) -> Result<u32, AssembleError> {
        self.push_text(Opcode::ContainsPath, value, len, 0)
    }

    pub fn push_equal_path(&mut self, value: Option<&str>, len: u32) -> Result<u32, AssembleError> {
        self.push_text(Opcode::EqualPath, value, len, 0)
    }

    pub fn push_not_equal_path(
        &mut self,
        value: Option<&str>,
        len: u32,
    ) -> Result<u32, AssembleError> {
        self.push_text(Opcode::NotEqualPath, value, len, 0)
    }

    pub fn push_starts_with_path(
        &mut self,
        value: Option<&str>,
        len: u32,
        at: u32,
    ) -> Result<u32, AssembleError> {
        self.push_text(Opcode::StartsWithPath, value, len, at)
    }

    fn push_text(
        &mut self,
        op: Opcode,
        value: Option<&str>,
        len: u32,
        at: u32,
    ) -> Result<u32, AssembleError> {
        let value = required(value, 1)?;
        let len_bytes = len as usize;
        if len_bytes > value.len() {
            return Err(AssembleError::InvalidArgument {
                position: 2,
                reason: "length exceeds string",
            });
        }
        if !value.is_char_boundary(len_bytes) {
            return Err(AssembleError::InvalidArgument {
                position: 2,
                reason: "length splits a character",
            });
        }
        let a = self.push_memory(Some(value));
        Ok(self.push(op, a, len, at))
    }

    // -- query parameters --

    pub fn push_contains_query_parameter(
        &mut self,
        name: Option<&str>,
        value: &str,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::ContainsQueryParameter, name, value, 0)
    }

    pub fn push_equal_query_parameter(
        &mut self,
        name: Option<&str>,
        value: &str,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::EqualQueryParameter, name, value, 0)
    }

    pub fn push_not_equal_query_parameter(
        &mut self,
        name: Option<&str>,
        value: &str,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::NotEqualQueryParameter, name, value, 0)
    }

    pub fn push_starts_with_query_parameter(
        &mut self,
        name: Option<&str>,
        value: &str,
        at: u32,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::StartsWithQueryParameter, name, value, at)
    }

    pub fn push_exists_query_parameter(
        &mut self,
        name: Option<&str>,
    ) -> Result<u32, AssembleError> {
        self.push_name(Opcode::ExistsQueryParameter, name)
    }

    pub fn push_greater_than_query_parameter(
        &mut self,
        name: Option<&str>,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_threshold(Opcode::GreaterThanQueryParameter, name, than)
    }

    pub fn push_less_than_query_parameter(
        &mut self,
        name: Option<&str>,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_threshold(Opcode::LessThanQueryParameter, name, than)
    }

    pub fn push_greater_than_after_query_parameter(
        &mut self,
        name: Option<&str>,
        marker: &str,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_marker_threshold(Opcode::GreaterThanAfterQueryParameter, name, marker, than)
    }

    pub fn push_less_than_after_query_parameter(
        &mut self,
        name: Option<&str>,
        marker: &str,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_marker_threshold(Opcode::LessThanAfterQueryParameter, name, marker, than)
    }

    // -- headers --

    pub fn push_contains_header(
        &mut self,
        name: Option<&str>,
        value: &str,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::ContainsHeader, name, value, 0)
    }

    pub fn push_equal_header(
        &mut self,
        name: Option<&str>,
        value: &str,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::EqualHeader, name, value, 0)
    }

    pub fn push_not_equal_header(
        &mut self,
        name: Option<&str>,
        value: &str,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::NotEqualHeader, name, value, 0)
    }

    pub fn push_starts_with_header(
        &mut self,
        name: Option<&str>,
        value: &str,
        at: u32,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::StartsWithHeader, name, value, at)
    }

    pub fn push_exists_header(&mut self, name: Option<&str>) -> Result<u32, AssembleError> {
        self.push_name(Opcode::ExistsHeader, name)
    }

    pub fn push_greater_than_header(
        &mut self,
        name: Option<&str>,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_threshold(Opcode::GreaterThanHeader, name, than)
    }

    pub fn push_less_than_header(
        &mut self,
        name: Option<&str>,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_threshold(Opcode::LessThanHeader, name, than)
    }

    pub fn push_greater_than_after_header(
        &mut self,
        name: Option<&str>,
        marker: &str,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_marker_threshold(Opcode::GreaterThanAfterHeader, name, marker, than)
    }

    pub fn push_less_than_after_header(
        &mut self,
        name: Option<&str>,
        marker: &str,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_marker_threshold(Opcode::LessThanAfterHeader, name, marker, than)
    }

    // -- cookies --

    pub fn push_contains_cookie(
        &mut self,
        name: Option<&str>,
        value: &str,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::ContainsCookie, name, value, 0)
    }

    pub fn push_equal_cookie(
        &mut self,
        name: Option<&str>,
        value: &str,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::EqualCookie, name, value, 0)
    }

    pub fn push_not_equal_cookie(
        &mut self,
        name: Option<&str>,
        value: &str,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::NotEqualCookie, name, value, 0)
    }

    pub fn push_starts_with_cookie(
        &mut self,
        name: Option<&str>,
        value: &str,
        at: u32,
    ) -> Result<u32, AssembleError> {
        self.push_name_value(Opcode::StartsWithCookie, name, value, at)
    }

    pub fn push_exists_cookie(&mut self, name: Option<&str>) -> Result<u32, AssembleError> {
        self.push_name(Opcode::ExistsCookie, name)
    }

    pub fn push_greater_than_cookie(
        &mut self,
        name: Option<&str>,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_threshold(Opcode::GreaterThanCookie, name, than)
    }

    pub fn push_less_than_cookie(
        &mut self,
        name: Option<&str>,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_threshold(Opcode::LessThanCookie, name, than)
    }

    pub fn push_greater_than_after_cookie(
        &mut self,
        name: Option<&str>,
        marker: &str,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_marker_threshold(Opcode::GreaterThanAfterCookie, name, marker, than)
    }

    pub fn push_less_than_after_cookie(
        &mut self,
        name: Option<&str>,
        marker: &str,
        than: i32,
    ) -> Result<u32, AssembleError> {
        self.push_marker_threshold(Opcode::LessThanAfterCookie, name, marker, than)
    }

    // -- shared encoders --

    fn push_name(&mut self, op: Opcode, name: Option<&str>) -> Result<u32, AssembleError> {
        let name = required(name, 1)?;
        let a = self.push_memory(Some(name));
        Ok(self.push(op, a, 0, 0))
    }

    fn push_name_value(
        &mut self,
        op: Opcode,
        name: Option<&str>,
        value: &str,
        at: u32,
    ) -> Result<u32, AssembleError> {
        let name = required(name, 1)?;
        let value = checked(value, 2)?;
        let a = self.push_memory(Some(name));
        let b = self.push_memory(Some(value));
        Ok(self.push(op, a, b, at))
    }

    fn push_threshold(
        &mut self,
        op: Opcode,
        name: Option<&str>,
        than: i32,
    ) -> Result<u32, AssembleError> {
        let name = required(name, 1)?;
        let a = self.push_memory(Some(name));
        Ok(self.push(op, a, than as u32, 0))
    }

    fn push_marker_threshold(
        &mut self,
        op: Opcode,
        name: Option<&str>,
        marker: &str,
        than: i32,
    ) -> Result<u32, AssembleError> {
        let name = required(name, 1)?;
        let marker = checked(marker, 2)?;
        let a = self.push_memory(Some(name));
        let b = self.push_memory(Some(marker));
        Ok(self.push(op, a, b, than as u32))
    }
}

fn required(value: Option<&str>, position: u8) -> Result<&str, AssembleError> {
    checked(value.ok_or_else(|| AssembleError::null(position))?, position)
}

fn checked(value: &str, position: u8) -> Result<&str, AssembleError> {
    if value.contains('\0') {
        return Err(AssembleError::InvalidArgument {
            position,
            reason: "embedded NUL byte",
        });
    }
    Ok(value)
}
