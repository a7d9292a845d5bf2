mod error;
mod instruction;
mod memory;
mod opcode;
mod program;
mod tree;

pub use error::{AssembleError, CompileError};
pub use instruction::{Code, Instruction};
pub use memory::Memory;
pub use opcode::{ExecutionMode, Opcode, Operands};
pub use program::Program;
pub use tree::{Block, Forest, Node, NodeId, NodeKind, Op, Tree};
