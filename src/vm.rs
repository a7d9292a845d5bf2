use tracing::trace;

use crate::backend::Backend;
use crate::cache::ResultCache;
use crate::compile::DEFAULT_MAX_DEPTH;
use crate::types::{Code, ExecutionMode, Instruction, Memory, Opcode, Program};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registers {
    pc: u32,
    /// Instructions left in this frame; `None` is unbounded.
    remaining: Option<u32>,
    result: bool,
    not: bool,
    mode: ExecutionMode,
}

impl Registers {
    fn enter(pc: u32, budget: u32, mode: ExecutionMode) -> Self {
        Self {
            pc,
            remaining: (budget > 0).then_some(budget),
            result: mode != ExecutionMode::Or,
            not: false,
            mode,
        }
    }
}

enum Flow {
    Continue,
    Return,
    Halt,
}

/// Executes a compiled [`Program`] against one [`Backend`].
///
/// A `Vm` belongs to a single evaluation context. Its result cache lives as
/// long as the `Vm`, so evaluating several entries (or the same entry twice)
/// never asks the backend the same question twice. Registers and the call
/// stack are reset at the start of every run.
///
/// # Example
///
/// ```
/// use reqfilter::{Forest, Program, Request, RequestBackend, Tree, Vm};
///
/// let mut tree = Tree::new();
/// tree.add_op("isMethod", &["GET"]);
/// tree.add_op("existsHeader", &["authorization"]);
/// let program = Program::compile(&Forest::new().with(tree)).unwrap();
///
/// let request = Request::new("GET").header("Authorization", "Bearer x");
/// let mut vm = Vm::new(RequestBackend::new(&request), &program);
/// assert!(vm.run(program.offsets()[0]));
/// ```
#[derive(Debug)]
pub struct Vm<'p, B> {
    code: &'p Code,
    memory: &'p Memory,
    entries: &'p [(String, u32)],
    backend: B,
    regs: Registers,
    stack: Vec<Registers>,
    cache: ResultCache,
    max_depth: usize,
}

impl<'p, B: Backend> Vm<'p, B> {
    pub fn new(backend: B, program: &'p Program) -> Self {
        let mut vm = Self::from_parts(backend, &program.code, &program.memory);
        vm.entries = &program.entries;
        vm
    }

    /// Run hand-assembled code directly. Named entries are unavailable.
    pub fn from_parts(backend: B, code: &'p Code, memory: &'p Memory) -> Self {
        Self {
            code,
            memory,
            entries: &[],
            backend,
            regs: Registers::enter(0, 0, ExecutionMode::None),
            stack: Vec::new(),
            cache: ResultCache::new(code.len()),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Bound the call stack to `depth` nested blocks.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Evaluate from `entry` with no instruction budget.
    ///
    /// # Panics
    ///
    /// Panics if `entry` is outside the code, or if the code breaks a VM
    /// contract (running off the end, self-redirect, stack overflow).
    pub fn run(&mut self, entry: u32) -> bool {
        self.run_with_budget(entry, 0)
    }

    /// Evaluate from `entry`, forcing a return once `budget` instructions
    /// have been fetched in the outermost frame. A budget of 0 is unbounded.
    ///
    /// # Panics
    ///
    /// See [`run`](Self::run). Debug builds also panic when the budget
    /// reaches past the last instruction.
    pub fn run_with_budget(&mut self, entry: u32, budget: u32) -> bool {
        assert!(
            (entry as usize) < self.code.len(),
            "entry {entry} is outside a program of {} instructions",
            self.code.len()
        );
        debug_assert!(
            budget == 0 || entry as usize + budget as usize <= self.code.len(),
            "budget {budget} from entry {entry} runs past the end of the code"
        );
        self.stack.clear();
        self.regs = Registers::enter(entry, budget, ExecutionMode::None);
        trace!(target: "reqfilter::vm", entry, budget, "run");

        loop {
            let flow = if self.regs.remaining == Some(0) {
                Flow::Return
            } else if self.regs.mode.admits(self.regs.result) {
                self.step()
            } else {
                Flow::Return
            };
            match flow {
                Flow::Continue => {}
                Flow::Return => {
                    if !self.leave() {
                        break;
                    }
                }
                Flow::Halt => break,
            }
        }

        trace!(target: "reqfilter::vm", pc = self.regs.pc, verdict = self.regs.result, "halt");
        self.regs.result
    }

    /// Evaluate the tree compiled under `name`, if the program has one.
    pub fn run_named(&mut self, name: &str) -> Option<bool> {
        let index = self
            .entries
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()?;
        let entry = self.entries[index].1;
        Some(self.run(entry))
    }

    /// Program counter after the last run.
    #[must_use]
    pub fn pc(&self) -> u32 {
        self.regs.pc
    }

    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Forget every memoized result, e.g. after the backend's request changed.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[must_use]
    pub fn into_backend(self) -> B {
        self.backend
    }

    fn step(&mut self) -> Flow {
        let slot = self.regs.pc;
        if let Some(raw) = self.cache.get(slot) {
            self.set_result(raw);
            self.advance();
            return Flow::Continue;
        }
        let ins = self.fetch();
        self.dispatch(slot, ins)
    }

    fn instruction(&self, slot: u32) -> Instruction {
        match self.code.get(slot) {
            Some(ins) => *ins,
            None => panic!(
                "slot {slot} is outside a program of {} instructions",
                self.code.len()
            ),
        }
    }

    /// Load the instruction at pc, following `ExecuteSingle` redirects.
    fn fetch(&mut self) -> Instruction {
        let origin = self.regs.pc;
        let mut at = origin;
        let mut ins = self.instruction(at);
        let mut hops = 0;
        while ins.op == Opcode::ExecuteSingle {
            assert!(
                ins.a != at && ins.a != origin,
                "redirect at slot {at} loops back to slot {}",
                ins.a
            );
            hops += 1;
            assert!(
                hops < self.code.len(),
                "redirect chain from slot {origin} does not terminate"
            );
            at = ins.a;
            ins = self.instruction(at);
        }
        self.advance();
        ins
    }

    fn advance(&mut self) {
        self.regs.pc += 1;
        if let Some(remaining) = &mut self.regs.remaining {
            *remaining -= 1;
        }
    }

    /// Store a result, consuming a pending `Not`.
    fn set_result(&mut self, raw: bool) {
        self.regs.result = raw != self.regs.not;
        self.regs.not = false;
    }

    fn dispatch(&mut self, slot: u32, ins: Instruction) -> Flow {
        let raw = match ins.op {
            Opcode::Skip => return Flow::Continue,
            Opcode::Execute => {
                self.call(ins);
                return Flow::Continue;
            }
            Opcode::ExecuteSingle => unreachable!("redirects are resolved by fetch"),
            Opcode::Return => return Flow::Return,
            Opcode::Halt => return Flow::Halt,
            Opcode::None => {
                self.regs.mode = ExecutionMode::None;
                return Flow::Continue;
            }
            Opcode::And => {
                self.regs.mode = ExecutionMode::And;
                self.regs.result = true;
                return Flow::Continue;
            }
            Opcode::Or => {
                self.regs.mode = ExecutionMode::Or;
                self.regs.result = false;
                return Flow::Continue;
            }
            Opcode::Not => {
                self.regs.not = true;
                return Flow::Continue;
            }
            Opcode::PrintError | Opcode::PrintDebug => {
                self.print(ins);
                return Flow::Continue;
            }
            Opcode::Flip => !self.regs.result,
            Opcode::True => true,
            Opcode::False => false,
            _ => query(&mut self.backend, self.memory, ins),
        };
        self.set_result(raw);
        self.cache.set(slot, raw);
        Flow::Continue
    }

    fn call(&mut self, ins: Instruction) {
        let Some(mode) = ExecutionMode::from_u32(ins.a) else {
            panic!("execute at slot {} has invalid mode {}", self.regs.pc - 1, ins.a)
        };
        assert!(
            self.stack.len() < self.max_depth,
            "call stack overflow: more than {} nested blocks",
            self.max_depth
        );
        self.stack.push(self.regs);
        self.regs = Registers::enter(ins.b, ins.c, mode);
        trace!(target: "reqfilter::vm", target_slot = ins.b, %mode, depth = self.stack.len(), "enter block");
    }

    /// Pop one frame and fold the finished block into the caller.
    /// Returns `false` when there is no caller left.
    fn leave(&mut self) -> bool {
        let Some(caller) = self.stack.pop() else {
            return false;
        };
        let raw = self.regs.result;
        self.regs = caller;
        self.set_result(raw);
        let site = self.regs.pc - 1;
        self.cache.set(site, raw);
        trace!(target: "reqfilter::vm", site, raw, depth = self.stack.len(), "leave block");
        true
    }

    fn print(&mut self, ins: Instruction) {
        let enabled = match ExecutionMode::from_u32(ins.c) {
            Some(ExecutionMode::And) => self.regs.result,
            Some(ExecutionMode::Or) => !self.regs.result,
            _ => true,
        };
        if !enabled {
            return;
        }
        let message = self.memory.str_at(ins.a);
        let tag = (ins.b != 0).then(|| self.memory.str_at(ins.b));
        if ins.op == Opcode::PrintError {
            self.backend.print_error(message, tag);
        } else {
            self.backend.print_debug(message, tag);
        }
    }
}

/// `len` bytes of the string at `offset`, or all of it if `len` overshoots.
fn text(memory: &Memory, offset: u32, len: u32) -> &str {
    let s = memory.str_at(offset);
    s.get(..len as usize).unwrap_or(s)
}

fn query<B: Backend>(backend: &mut B, memory: &Memory, ins: Instruction) -> bool {
    let s = |offset| memory.str_at(offset);
    let than = i64::from(ins.b_signed());
    let after = i64::from(ins.c_signed());
    match ins.op {
        Opcode::IsMethod => backend.is_method(text(memory, ins.a, ins.b)),
        Opcode::IsScheme => backend.is_scheme(text(memory, ins.a, ins.b)),

        Opcode::ContainsDomain => backend.contains_domain(text(memory, ins.a, ins.b)),
        Opcode::EqualDomain => backend.equal_domain(text(memory, ins.a, ins.b)),
        Opcode::NotEqualDomain => backend.not_equal_domain(text(memory, ins.a, ins.b)),
        Opcode::StartsWithDomain => {
            backend.starts_with_domain(text(memory, ins.a, ins.b), ins.c)
        }
        Opcode::ContainsPath => backend.contains_path(text(memory, ins.a, ins.b)),
        Opcode::EqualPath => backend.equal_path(text(memory, ins.a, ins.b)),
        Opcode::NotEqualPath => backend.not_equal_path(text(memory, ins.a, ins.b)),
        Opcode::StartsWithPath => backend.starts_with_path(text(memory, ins.a, ins.b), ins.c),

        Opcode::ContainsQueryParameter => backend.contains_query_parameter(s(ins.a), s(ins.b)),
        Opcode::EqualQueryParameter => backend.equal_query_parameter(s(ins.a), s(ins.b)),
        Opcode::ExistsQueryParameter => backend.exists_query_parameter(s(ins.a)),
        Opcode::GreaterThanQueryParameter => backend.greater_than_query_parameter(s(ins.a), than),
        Opcode::GreaterThanAfterQueryParameter => {
            backend.greater_than_after_query_parameter(s(ins.a), s(ins.b), after)
        }
        Opcode::LessThanQueryParameter => backend.less_than_query_parameter(s(ins.a), than),
        Opcode::LessThanAfterQueryParameter => {
            backend.less_than_after_query_parameter(s(ins.a), s(ins.b), after)
        }
        Opcode::NotEqualQueryParameter => backend.not_equal_query_parameter(s(ins.a), s(ins.b)),
        Opcode::StartsWithQueryParameter => {
            backend.starts_with_query_parameter(s(ins.a), s(ins.b), ins.c)
        }

        Opcode::ContainsHeader => backend.contains_header(s(ins.a), s(ins.b)),
        Opcode::EqualHeader => backend.equal_header(s(ins.a), s(ins.b)),
        Opcode::ExistsHeader => backend.exists_header(s(ins.a)),
        Opcode::GreaterThanHeader => backend.greater_than_header(s(ins.a), than),
        Opcode::GreaterThanAfterHeader => {
            backend.greater_than_after_header(s(ins.a), s(ins.b), after)
        }
        Opcode::LessThanHeader => backend.less_than_header(s(ins.a), than),
        Opcode::LessThanAfterHeader => backend.less_than_after_header(s(ins.a), s(ins.b), after),
        Opcode::NotEqualHeader => backend.not_equal_header(s(ins.a), s(ins.b)),
        Opcode::StartsWithHeader => backend.starts_with_header(s(ins.a), s(ins.b), ins.c),

        Opcode::ContainsCookie => backend.contains_cookie(s(ins.a), s(ins.b)),
        Opcode::EqualCookie => backend.equal_cookie(s(ins.a), s(ins.b)),
        Opcode::ExistsCookie => backend.exists_cookie(s(ins.a)),
        Opcode::GreaterThanCookie => backend.greater_than_cookie(s(ins.a), than),
        Opcode::GreaterThanAfterCookie => {
            backend.greater_than_after_cookie(s(ins.a), s(ins.b), after)
        }
        Opcode::LessThanCookie => backend.less_than_cookie(s(ins.a), than),
        Opcode::LessThanAfterCookie => backend.less_than_after_cookie(s(ins.a), s(ins.b), after),
        Opcode::NotEqualCookie => backend.not_equal_cookie(s(ins.a), s(ins.b)),
        Opcode::StartsWithCookie => backend.starts_with_cookie(s(ins.a), s(ins.b), ins.c),

        op => unreachable!("{op} is not a predicate"),
    }
}
