//! Compiles boolean filters over HTTP request attributes into compact
//! bytecode and evaluates them against a pluggable predicate [`Backend`].
//!
//! Filters are authored as [`Tree`]s, lowered once by the [`Compiler`] into a
//! shared, immutable [`Program`], then executed by any number of per-request
//! [`Vm`]s. Each `Vm` memoizes every predicate it has answered, so evaluating
//! several filters against one request never asks the backend twice.
//!
//! ```
//! use reqfilter::{Forest, Program, Request, RequestBackend, Tree, Vm};
//!
//! // isMethod(POST) and (containsHeader(content-type, json) or not existsCookie(session))
//! let mut tree = Tree::named("json-post");
//! tree.add_and();
//! tree.add_child_op("isMethod", &["POST"]);
//! tree.add_or();
//! tree.add_child_op("containsHeader", &["content-type", "json"]);
//! tree.add_not();
//! tree.add_op("existsCookie", &["session"]);
//!
//! let program = Program::compile(&Forest::new().with(tree)).unwrap();
//!
//! let request = Request::new("POST").header("Content-Type", "application/json");
//! let mut vm = Vm::new(RequestBackend::new(&request), &program);
//! assert_eq!(vm.run_named("json-post"), Some(true));
//! ```

mod assemble;
mod backend;
mod cache;
mod compile;
mod disasm;
mod error;
mod request;
#[cfg(feature = "binary-cache")]
mod serial;
mod types;
mod vm;

pub use assemble::Assembler;
pub use backend::{Backend, ConsoleBackend, NoopBackend};
pub use cache::{ResultCache, Slot};
pub use compile::{Compiler, DEFAULT_MAX_DEPTH, PREDICATES};
pub use disasm::disassemble;
pub use error::FilterError;
#[cfg(feature = "binary-cache")]
pub use serial::{DeserializeError, SerializeError};
pub use request::{Level, Message, Request, RequestBackend};
pub use types::{
    AssembleError, Block, Code, CompileError, ExecutionMode, Forest, Instruction, Memory, Node,
    NodeId, NodeKind, Op, Opcode, Operands, Program, Tree,
};
pub use vm::Vm;
