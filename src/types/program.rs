use std::fmt;

use super::error::CompileError;
use super::instruction::Code;
use super::memory::Memory;
use super::tree::Forest;

/// A compiled filter program: bytecode, string arena, and entry points.
///
/// Immutable once built. `Program` is `Send + Sync`, so one instance can sit
/// behind an `Arc` and back any number of concurrently running
/// [`Vm`](crate::Vm)s.
///
/// # Example
///
/// ```
/// use reqfilter::{Forest, NoopBackend, Program, Tree, Vm};
///
/// let mut tree = Tree::named("always");
/// tree.add_op("true", &[]);
/// let program = Program::compile(&Forest::new().with(tree)).unwrap();
///
/// let mut vm = Vm::new(NoopBackend, &program);
/// assert_eq!(vm.run_named("always"), Some(true));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub(crate) code: Code,
    pub(crate) memory: Memory,
    /// One entry slot per compiled tree, in forest order.
    pub(crate) offsets: Vec<u32>,
    /// Named entry points, sorted by name.
    pub(crate) entries: Vec<(String, u32)>,
}

impl Program {
    /// Compile every tree of `forest` into a single program.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] if any tree uses an unknown predicate,
    /// malformed parameters, or nests blocks too deeply.
    pub fn compile(forest: &Forest) -> Result<Self, CompileError> {
        let mut compiler = crate::Compiler::new();
        compiler.compile(forest)?;
        Ok(compiler.finish())
    }

    /// Wrap hand-assembled bytecode with no recorded entry points.
    #[must_use]
    pub fn from_parts(code: Code, memory: Memory) -> Self {
        Self {
            code,
            memory,
            offsets: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub(crate) fn with_entries(
        code: Code,
        memory: Memory,
        offsets: Vec<u32>,
        mut entries: Vec<(String, u32)>,
    ) -> Self {
        entries.sort();
        Self {
            code,
            memory,
            offsets,
            entries,
        }
    }

    #[must_use]
    pub fn code(&self) -> &Code {
        &self.code
    }

    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    #[must_use]
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Entry slot of the tree compiled under `name`.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<u32> {
        self.entries
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|i| self.entries[i].1)
    }

    /// Named entry points in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(n, o)| (n.as_str(), *o))
    }

    /// Annotated listing of the bytecode.
    #[must_use]
    pub fn disassemble(&self) -> String {
        crate::disasm::disassemble(&self.code, &self.memory)
    }
}

#[cfg(feature = "binary-cache")]
impl Program {
    /// Serialize this program to a byte vector.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::SerializeError) if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::SerializeError> {
        crate::serial::encode(self)
    }

    /// Deserialize a program previously produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::DeserializeError) on
    /// format, integrity, or validation failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::DeserializeError> {
        crate::serial::decode(bytes)
    }

    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::SerializeError) on
    /// encoding or I/O failure.
    pub fn to_binary_file(
        &self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), crate::SerializeError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::DeserializeError) on
    /// I/O, format, integrity, or validation failure.
    pub fn from_binary_file(
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, crate::DeserializeError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Program({} instructions, {} bytes of strings, {} entries)",
            self.code.len(),
            self.memory.len(),
            self.offsets.len(),
        )
    }
}
