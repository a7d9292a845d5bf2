use tracing::debug;

use crate::assemble::Assembler;
use crate::types::{
    AssembleError, CompileError, ExecutionMode, Forest, NodeId, NodeKind, Op, Program, Tree,
};

/// Deepest block nesting accepted by default, matching the VM's call stack.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Every predicate name the compiler understands, in lexical order.
pub const PREDICATES: &[&str] = &NAMES;

const NAMES: [&str; TABLE.len()] = names();

const fn names() -> [&'static str; TABLE.len()] {
    let mut names = [""; TABLE.len()];
    let mut i = 0;
    while i < TABLE.len() {
        names[i] = TABLE[i].0;
        i += 1;
    }
    names
}

/// Lowers [`Tree`]s into one shared [`Program`].
///
/// Slot 0 of every program is a `Halt`; trees without a root get it as
/// their entry, which makes them evaluate to `true` without touching the
/// backend.
///
/// # Example
///
/// ```
/// use reqfilter::{Compiler, Tree};
///
/// let mut tree = Tree::new();
/// tree.add_op("existsHeader", &["authorization"]);
///
/// let mut compiler = Compiler::new();
/// let entry = compiler.compile_tree(&tree).unwrap();
/// let program = compiler.finish();
/// assert_eq!(entry, 1);
/// assert_eq!(program.code().len(), 4); // Halt, ExistsHeader, Return, Halt
/// ```
#[derive(Debug, Clone)]
pub struct Compiler {
    assembler: Assembler,
    offsets: Vec<u32>,
    max_depth: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    #[must_use]
    pub fn new() -> Self {
        let mut assembler = Assembler::new();
        assembler.push_halt();
        Self {
            assembler,
            offsets: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Reject trees whose blocks nest deeper than `depth`.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    #[must_use]
    pub fn assembler(&self) -> &Assembler {
        &self.assembler
    }

    /// Direct access for hand-written blocks sharing the program.
    pub fn assembler_mut(&mut self) -> &mut Assembler {
        &mut self.assembler
    }

    /// Compile every tree of `forest`, returning one entry slot per tree.
    ///
    /// Nothing is emitted if any tree fails.
    ///
    /// # Errors
    ///
    /// Returns the first [`CompileError`] encountered.
    pub fn compile(&mut self, forest: &Forest) -> Result<Vec<u32>, CompileError> {
        let checkpoint = self.assembler.checkpoint();
        let recorded = self.offsets.len();
        let mut offsets = Vec::with_capacity(forest.len());
        for tree in forest {
            match self.lower_tree(tree) {
                Ok(entry) => offsets.push(entry),
                Err(err) => {
                    self.assembler.rollback(checkpoint);
                    self.offsets.truncate(recorded);
                    return Err(err);
                }
            }
        }
        Ok(offsets)
    }

    /// Compile one tree and return its entry slot.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] and emits nothing if the tree is malformed.
    pub fn compile_tree(&mut self, tree: &Tree) -> Result<u32, CompileError> {
        let checkpoint = self.assembler.checkpoint();
        self.lower_tree(tree).inspect_err(|_| {
            self.assembler.rollback(checkpoint);
        })
    }

    /// Entry slots recorded so far, in compilation order.
    #[must_use]
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    #[must_use]
    pub fn finish(self) -> Program {
        let (code, memory, labels) = self.assembler.into_parts();
        Program::with_entries(code, memory, self.offsets, labels)
    }

    fn lower_tree(&mut self, tree: &Tree) -> Result<u32, CompileError> {
        let entry = match tree.root() {
            None => 0,
            Some(root) => {
                let depth = tree.depth();
                if depth > self.max_depth {
                    return Err(CompileError::NestingTooDeep {
                        depth,
                        limit: self.max_depth,
                    });
                }
                let entry = self.lower_block(tree, root)?;
                self.assembler.push_halt();
                entry
            }
        };
        if let Some(name) = tree.name() {
            self.assembler.label(name, entry);
        }
        self.offsets.push(entry);
        debug!(
            target: "reqfilter::compile",
            tree = tree.name().unwrap_or("<anonymous>"),
            entry,
            instructions = self.assembler.code_size(),
            "compiled tree"
        );
        Ok(entry)
    }

    /// Emit the block starting at `first`, children before their parent,
    /// and return the block's entry slot.
    fn lower_block(&mut self, tree: &Tree, first: NodeId) -> Result<u32, CompileError> {
        let mut children = Vec::new();
        for id in tree.block(first) {
            if let Some(child) = tree.node(id).child() {
                children.push(self.lower_block(tree, child)?);
            }
        }

        let entry = self.assembler.code_size();
        let mut children = children.into_iter();
        for id in tree.block(first) {
            let node = tree.node(id);
            match node.kind() {
                kind @ (NodeKind::And | NodeKind::Or) => {
                    let (mode, label) = if *kind == NodeKind::And {
                        (ExecutionMode::And, "And")
                    } else {
                        (ExecutionMode::Or, "Or")
                    };
                    let target = match node.child() {
                        Some(_) => children.next(),
                        None => None,
                    };
                    let Some(target) = target else {
                        return Err(CompileError::MissingChild { kind: label });
                    };
                    self.assembler
                        .push_execute(mode, target, 0)
                        .map_err(|source| CompileError::Assemble {
                            name: label.to_owned(),
                            source,
                        })?;
                }
                NodeKind::Not => {
                    self.assembler.push_not();
                }
                NodeKind::Op(op) => {
                    emit(&mut self.assembler, op)?;
                }
            }
        }
        self.assembler.push_return();
        Ok(entry)
    }
}

type Emit = fn(&mut Assembler, &Op) -> Result<u32, CompileError>;

/// Arity and encoder of one named predicate.
#[derive(Clone, Copy)]
struct Predicate {
    min: usize,
    max: usize,
    emit: Emit,
}

impl Predicate {
    const fn new(min: usize, max: usize, emit: Emit) -> Self {
        Self { min, max, emit }
    }

    const fn exact(arity: usize, emit: Emit) -> Self {
        Self::new(arity, arity, emit)
    }
}

fn emit(asm: &mut Assembler, op: &Op) -> Result<u32, CompileError> {
    let predicate = lookup(&op.name).ok_or_else(|| CompileError::UnknownPredicate {
        name: op.name.clone(),
    })?;
    let found = op.params.len();
    if found < predicate.min || found > predicate.max {
        let expected = if predicate.min == predicate.max {
            predicate.min.to_string()
        } else {
            format!("{}..={}", predicate.min, predicate.max)
        };
        return Err(CompileError::Arity {
            name: op.name.clone(),
            expected,
            found,
        });
    }
    (predicate.emit)(asm, op)
}

/// Predicate encoders keyed by name. Sorted for binary search.
const TABLE: &[(&str, Predicate)] = &[
    (
        "containsCookie",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_contains_cookie(Some(arg(op, 0)), arg(op, 1)))
        }),
    ),
    (
        "containsDomain",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_contains_domain(Some(arg(op, 0)), len(arg(op, 0))))
        }),
    ),
    (
        "containsHeader",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_contains_header(Some(arg(op, 0)), arg(op, 1)))
        }),
    ),
    (
        "containsPath",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_contains_path(Some(arg(op, 0)), len(arg(op, 0))))
        }),
    ),
    (
        "containsQueryParameter",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_contains_query_parameter(Some(arg(op, 0)), arg(op, 1)))
        }),
    ),
    (
        "equalCookie",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_equal_cookie(Some(arg(op, 0)), arg(op, 1)))
        }),
    ),
    (
        "equalDomain",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_equal_domain(Some(arg(op, 0)), len(arg(op, 0))))
        }),
    ),
    (
        "equalHeader",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_equal_header(Some(arg(op, 0)), arg(op, 1)))
        }),
    ),
    (
        "equalPath",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_equal_path(Some(arg(op, 0)), len(arg(op, 0))))
        }),
    ),
    (
        "equalQueryParameter",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_equal_query_parameter(Some(arg(op, 0)), arg(op, 1)))
        }),
    ),
    (
        "existsCookie",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_exists_cookie(Some(arg(op, 0))))
        }),
    ),
    (
        "existsHeader",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_exists_header(Some(arg(op, 0))))
        }),
    ),
    (
        "existsQueryParameter",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_exists_query_parameter(Some(arg(op, 0))))
        }),
    ),
    ("false", Predicate::exact(0, |a, _| Ok(a.push_false()))),
    (
        "greaterThanAfterCookie",
        Predicate::exact(3, |a, op| {
            let than = number(op, 2)?;
            checked(op, a.push_greater_than_after_cookie(Some(arg(op, 0)), arg(op, 1), than))
        }),
    ),
    (
        "greaterThanAfterHeader",
        Predicate::exact(3, |a, op| {
            let than = number(op, 2)?;
            checked(op, a.push_greater_than_after_header(Some(arg(op, 0)), arg(op, 1), than))
        }),
    ),
    (
        "greaterThanAfterQueryParameter",
        Predicate::exact(3, |a, op| {
            let than = number(op, 2)?;
            checked(
                op,
                a.push_greater_than_after_query_parameter(Some(arg(op, 0)), arg(op, 1), than),
            )
        }),
    ),
    (
        "greaterThanCookie",
        Predicate::exact(2, |a, op| {
            let than = number(op, 1)?;
            checked(op, a.push_greater_than_cookie(Some(arg(op, 0)), than))
        }),
    ),
    (
        "greaterThanHeader",
        Predicate::exact(2, |a, op| {
            let than = number(op, 1)?;
            checked(op, a.push_greater_than_header(Some(arg(op, 0)), than))
        }),
    ),
    (
        "greaterThanQueryParameter",
        Predicate::exact(2, |a, op| {
            let than = number(op, 1)?;
            checked(op, a.push_greater_than_query_parameter(Some(arg(op, 0)), than))
        }),
    ),
    (
        "isMethod",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_is_method(Some(arg(op, 0)), len(arg(op, 0))))
        }),
    ),
    (
        "isScheme",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_is_scheme(Some(arg(op, 0)), len(arg(op, 0))))
        }),
    ),
    (
        "lessThanAfterCookie",
        Predicate::exact(3, |a, op| {
            let than = number(op, 2)?;
            checked(op, a.push_less_than_after_cookie(Some(arg(op, 0)), arg(op, 1), than))
        }),
    ),
    (
        "lessThanAfterHeader",
        Predicate::exact(3, |a, op| {
            let than = number(op, 2)?;
            checked(op, a.push_less_than_after_header(Some(arg(op, 0)), arg(op, 1), than))
        }),
    ),
    (
        "lessThanAfterQueryParameter",
        Predicate::exact(3, |a, op| {
            let than = number(op, 2)?;
            checked(
                op,
                a.push_less_than_after_query_parameter(Some(arg(op, 0)), arg(op, 1), than),
            )
        }),
    ),
    (
        "lessThanCookie",
        Predicate::exact(2, |a, op| {
            let than = number(op, 1)?;
            checked(op, a.push_less_than_cookie(Some(arg(op, 0)), than))
        }),
    ),
    (
        "lessThanHeader",
        Predicate::exact(2, |a, op| {
            let than = number(op, 1)?;
            checked(op, a.push_less_than_header(Some(arg(op, 0)), than))
        }),
    ),
    (
        "lessThanQueryParameter",
        Predicate::exact(2, |a, op| {
            let than = number(op, 1)?;
            checked(op, a.push_less_than_query_parameter(Some(arg(op, 0)), than))
        }),
    ),
    (
        "notEqualCookie",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_not_equal_cookie(Some(arg(op, 0)), arg(op, 1)))
        }),
    ),
    (
        "notEqualDomain",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_not_equal_domain(Some(arg(op, 0)), len(arg(op, 0))))
        }),
    ),
    (
        "notEqualHeader",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_not_equal_header(Some(arg(op, 0)), arg(op, 1)))
        }),
    ),
    (
        "notEqualPath",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_not_equal_path(Some(arg(op, 0)), len(arg(op, 0))))
        }),
    ),
    (
        "notEqualQueryParameter",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_not_equal_query_parameter(Some(arg(op, 0)), arg(op, 1)))
        }),
    ),
    (
        "printDebug",
        Predicate::new(1, 3, |a, op| {
            let (message, tag, guard) = print_args(op)?;
            checked(op, a.push_print_debug(Some(message), tag, guard))
        }),
    ),
    (
        "printError",
        Predicate::new(1, 3, |a, op| {
            let (message, tag, guard) = print_args(op)?;
            checked(op, a.push_print_error(Some(message), tag, guard))
        }),
    ),
    (
        "startsWithCookie",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_starts_with_cookie(Some(arg(op, 0)), arg(op, 1), 0))
        }),
    ),
    (
        "startsWithDomain",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_starts_with_domain(Some(arg(op, 0)), len(arg(op, 0)), 0))
        }),
    ),
    (
        "startsWithHeader",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_starts_with_header(Some(arg(op, 0)), arg(op, 1), 0))
        }),
    ),
    (
        "startsWithPath",
        Predicate::exact(1, |a, op| {
            checked(op, a.push_starts_with_path(Some(arg(op, 0)), len(arg(op, 0)), 0))
        }),
    ),
    (
        "startsWithQueryParameter",
        Predicate::exact(2, |a, op| {
            checked(op, a.push_starts_with_query_parameter(Some(arg(op, 0)), arg(op, 1), 0))
        }),
    ),
    ("true", Predicate::exact(0, |a, _| Ok(a.push_true()))),
];

fn lookup(name: &str) -> Option<Predicate> {
    TABLE
        .binary_search_by_key(&name, |&(n, _)| n)
        .ok()
        .map(|i| TABLE[i].1)
}

fn arg(op: &Op, index: usize) -> &str {
    &op.params[index]
}

/// Byte length as a length operand; oversized values are rejected by the assembler.
fn len(value: &str) -> u32 {
    u32::try_from(value.len()).unwrap_or(u32::MAX)
}

fn number(op: &Op, index: usize) -> Result<i32, CompileError> {
    let raw = arg(op, index);
    raw.trim().parse().map_err(|_| CompileError::InvalidNumber {
        name: op.name.clone(),
        value: raw.to_owned(),
    })
}

fn checked(op: &Op, emitted: Result<u32, AssembleError>) -> Result<u32, CompileError> {
    emitted.map_err(|source| CompileError::Assemble {
        name: op.name.clone(),
        source,
    })
}

/// `message[, tag[, true|false]]`. An empty tag is treated as absent.
fn print_args(op: &Op) -> Result<(&str, Option<&str>, ExecutionMode), CompileError> {
    let message = arg(op, 0);
    let tag = op.params.get(1).map(String::as_str).filter(|t| !t.is_empty());
    let guard = match op.params.get(2).map(String::as_str) {
        None => ExecutionMode::None,
        Some("true" | "True" | "TRUE") => ExecutionMode::And,
        Some("false" | "False" | "FALSE") => ExecutionMode::Or,
        Some(other) => {
            return Err(CompileError::InvalidPrintMode {
                value: other.to_owned(),
            })
        }
    };
    Ok((message, tag, guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Instruction, Opcode};

    fn ops(program: &Program) -> Vec<Opcode> {
        program.code().iter().map(|i| i.op).collect()
    }

    fn leaf(name: &str, params: &[&str]) -> Tree {
        let mut tree = Tree::new();
        tree.add_op(name, params);
        tree
    }

    #[test]
    fn predicate_table_is_sorted_and_names_match() {
        assert!(TABLE.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(PREDICATES.len(), TABLE.len());
        for (name, (key, _)) in PREDICATES.iter().zip(TABLE) {
            assert_eq!(name, key);
            assert!(lookup(name).is_some(), "{name} has no encoder");
        }
        assert!(lookup("isTeapot").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn every_predicate_compiles_to_its_own_opcode() {
        for &(name, predicate) in TABLE {
            let params: Vec<&str> = (0..predicate.min)
                .map(|i| {
                    let numeric = name.starts_with("greaterThan") || name.starts_with("lessThan");
                    if numeric && i + 1 == predicate.min {
                        "7"
                    } else {
                        "x"
                    }
                })
                .collect();
            let mut compiler = Compiler::new();
            let entry = compiler
                .compile_tree(&leaf(name, &params))
                .unwrap_or_else(|err| panic!("{name}: {err}"));
            let program = compiler.finish();
            let op = program.code()[entry].op;
            assert!(
                op.name().eq_ignore_ascii_case(name),
                "{name} lowered to {}",
                op.name()
            );
        }
    }

    #[test]
    fn single_leaf_lowers_to_predicate_return_halt() {
        let mut compiler = Compiler::new();
        let entry = compiler
            .compile_tree(&leaf("containsHeader", &["accept", "json"]))
            .unwrap();
        let program = compiler.finish();
        assert_eq!(entry, 1);
        assert_eq!(
            ops(&program),
            [Opcode::Halt, Opcode::ContainsHeader, Opcode::Return, Opcode::Halt]
        );
        let ins = program.code()[1];
        assert_eq!(program.memory().str_at(ins.a), "accept");
        assert_eq!(program.memory().str_at(ins.b), "json");
    }

    #[test]
    fn empty_tree_maps_to_reserved_halt() {
        let mut compiler = Compiler::new();
        assert_eq!(compiler.compile_tree(&Tree::named("nothing")).unwrap(), 0);
        let program = compiler.finish();
        assert_eq!(ops(&program), [Opcode::Halt]);
        assert_eq!(program.entry("nothing"), Some(0));
    }

    #[test]
    fn nested_blocks_are_emitted_before_their_caller() {
        // Or { true, And { false } }, Not, isMethod(GET)
        let mut tree = Tree::new();
        tree.add_or();
        tree.add_child_op("true", &[]);
        tree.add_and();
        tree.add_child_op("false", &[]);
        tree.parent();
        tree.parent();
        tree.add_not();
        tree.add_op("isMethod", &["GET"]);

        let mut compiler = Compiler::new();
        let entry = compiler.compile_tree(&tree).unwrap();
        let program = compiler.finish();
        let code = program.code();

        // 1: False, 2: Return (And block)
        // 3: True, 4: Execute And -> 1, 5: Return (Or block)
        // 6: Execute Or -> 3, 7: Not, 8: IsMethod, 9: Return, 10: Halt
        assert_eq!(entry, 6);
        assert_eq!(code[4], Instruction::new(Opcode::Execute, 2, 1, 0));
        assert_eq!(code[6], Instruction::new(Opcode::Execute, 3, 3, 0));
        assert_eq!(code[7].op, Opcode::Not);
        assert_eq!(code[8].op, Opcode::IsMethod);
        assert_eq!(code[8].b, 3);
        assert_eq!(code[9].op, Opcode::Return);
        assert_eq!(code[10].op, Opcode::Halt);
    }

    #[test]
    fn forest_offsets_follow_tree_order_and_share_strings() {
        let forest = Forest::new()
            .with(leaf("existsCookie", &["sid"]))
            .with(leaf("equalCookie", &["sid", "1"]));
        let mut compiler = Compiler::new();
        let offsets = compiler.compile(&forest).unwrap();
        let program = compiler.finish();
        assert_eq!(offsets, [1, 4]);
        assert_eq!(program.offsets(), [1, 4]);
        assert_eq!(program.code()[1].a, program.code()[4].a);
    }

    #[test]
    fn unknown_predicate_is_an_error() {
        let mut compiler = Compiler::new();
        let err = compiler.compile_tree(&leaf("isTeapot", &[])).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownPredicate {
                name: "isTeapot".into()
            }
        );
    }

    #[test]
    fn wrong_arity_is_an_error() {
        let mut compiler = Compiler::new();
        let err = compiler
            .compile_tree(&leaf("containsHeader", &["accept"]))
            .unwrap_err();
        assert!(matches!(err, CompileError::Arity { found: 1, .. }));
        let err = compiler
            .compile_tree(&leaf("printError", &["a", "b", "true", "x"]))
            .unwrap_err();
        assert_eq!(err.to_string(), "predicate 'printError' takes 1..=3 parameter(s), got 4");
    }

    #[test]
    fn numbers_are_parsed_as_signed() {
        let mut compiler = Compiler::new();
        compiler
            .compile_tree(&leaf("lessThanAfterHeader", &["range", "bytes=", "-5"]))
            .unwrap();
        let err = compiler
            .compile_tree(&leaf("greaterThanCookie", &["age", "old"]))
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidNumber { .. }));
        let program = compiler.finish();
        assert_eq!(program.code()[1].c_signed(), -5);
    }

    #[test]
    fn print_modes() {
        let mut compiler = Compiler::new();
        let tree = {
            let mut t = Tree::new();
            t.add_op("printDebug", &["plain"]);
            t.add_op("printError", &["tagged", "T"]);
            t.add_op("printError", &["on true", "", "TRUE"]);
            t.add_op("printDebug", &["on false", "x", "False"]);
            t
        };
        compiler.compile_tree(&tree).unwrap();
        let program = compiler.finish();
        let code = program.code();
        assert_eq!(code[1].c, ExecutionMode::None.as_u32());
        assert_eq!(code[1].b, 0);
        assert_eq!(program.memory().str_at(code[2].b), "T");
        assert_eq!(code[3].b, 0);
        assert_eq!(code[3].c, ExecutionMode::And.as_u32());
        assert_eq!(code[4].c, ExecutionMode::Or.as_u32());

        let err = Compiler::new()
            .compile_tree(&leaf("printError", &["m", "t", "yes"]))
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::InvalidPrintMode {
                value: "yes".into()
            }
        );
    }

    #[test]
    fn failed_forest_emits_nothing() {
        let mut compiler = Compiler::new();
        compiler.compile_tree(&leaf("true", &[])).unwrap();
        let before = compiler.assembler().code_size();
        let before_memory = compiler.assembler().memory_size();

        let mut good = Tree::named("good");
        good.add_op("existsHeader", &["host"]);
        let forest = Forest::new().with(good).with(leaf("nope", &[]));
        assert!(compiler.compile(&forest).is_err());

        assert_eq!(compiler.assembler().code_size(), before);
        assert_eq!(compiler.assembler().memory_size(), before_memory);
        assert_eq!(compiler.offsets(), [1]);
        assert_eq!(compiler.assembler().label_offset("good"), None);
    }

    #[test]
    fn and_without_child_is_rejected() {
        let mut tree = Tree::new();
        tree.add_and();
        let err = Compiler::new().compile_tree(&tree).unwrap_err();
        assert_eq!(err, CompileError::MissingChild { kind: "And" });
    }

    #[test]
    fn nesting_limit() {
        let mut tree = Tree::new();
        tree.add_and();
        tree.add_child_and();
        tree.add_child_op("true", &[]);
        let err = Compiler::new()
            .with_max_depth(1)
            .compile_tree(&tree)
            .unwrap_err();
        assert_eq!(err, CompileError::NestingTooDeep { depth: 2, limit: 1 });
        assert!(Compiler::new().with_max_depth(2).compile_tree(&tree).is_ok());
    }

    #[test]
    fn first_name_wins_for_duplicate_trees() {
        let forest = Forest::new()
            .with({
                let mut t = Tree::named("dup");
                t.add_op("true", &[]);
                t
            })
            .with({
                let mut t = Tree::named("dup");
                t.add_op("false", &[]);
                t
            });
        let program = Program::compile(&forest).unwrap();
        assert_eq!(program.entry("dup"), Some(program.offsets()[0]));
    }
}
