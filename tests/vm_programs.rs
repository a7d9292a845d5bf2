use reqfilter::{
    Code, ConsoleBackend, ExecutionMode, Instruction, Memory, NoopBackend, Opcode, Program, Vm,
};

fn code(ins: &[(Opcode, u32, u32, u32)]) -> Code {
    ins.iter()
        .map(|&(op, a, b, c)| Instruction::new(op, a, b, c))
        .collect()
}

fn bare(op: Opcode) -> (Opcode, u32, u32, u32) {
    (op, 0, 0, 0)
}

type Captured = ConsoleBackend<NoopBackend, Vec<u8>, Vec<u8>>;

fn captured() -> Captured {
    ConsoleBackend::new(NoopBackend, Vec::new(), Vec::new())
}

fn lines(bytes: &[u8]) -> Vec<&str> {
    std::str::from_utf8(bytes).unwrap().lines().collect()
}

const NONE: u32 = ExecutionMode::None as u32;
const AND: u32 = ExecutionMode::And as u32;
const OR: u32 = ExecutionMode::Or as u32;

#[test]
fn true_then_halt() {
    let code = code(&[bare(Opcode::True), bare(Opcode::Halt)]);
    let memory = Memory::new();
    let mut vm = Vm::from_parts(NoopBackend, &code, &memory);
    assert!(vm.run(0));
    assert_eq!(vm.cache().get(0), Some(true));
}

#[test]
fn false_then_halt() {
    let code = code(&[bare(Opcode::False), bare(Opcode::Halt)]);
    let memory = Memory::new();
    let mut vm = Vm::from_parts(NoopBackend, &code, &memory);
    assert!(!vm.run(0));
    assert_eq!(vm.cache().get(0), Some(false));
}

#[test]
fn not_negates_the_next_result_only() {
    let code = code(&[bare(Opcode::Not), bare(Opcode::True), bare(Opcode::Halt)]);
    let memory = Memory::new();
    let mut vm = Vm::from_parts(NoopBackend, &code, &memory);
    assert!(!vm.run(0));
    // The cache keeps the raw outcome; the pending Not is applied on reuse.
    assert_eq!(vm.cache().get(1), Some(true));
    assert!(!vm.run(0));
}

#[test]
fn not_inside_and_mode() {
    let code = code(&[
        bare(Opcode::And),
        bare(Opcode::Not),
        bare(Opcode::False),
        bare(Opcode::Halt),
    ]);
    let memory = Memory::new();
    let mut vm = Vm::from_parts(NoopBackend, &code, &memory);
    assert!(vm.run(0));
    assert_eq!(vm.cache().get(2), Some(false));
}

#[test]
fn or_mode_stops_at_first_true() {
    let code = code(&[
        bare(Opcode::Or),
        bare(Opcode::False),
        bare(Opcode::True),
        bare(Opcode::True),
        bare(Opcode::Halt),
    ]);
    let memory = Memory::new();
    let mut vm = Vm::from_parts(NoopBackend, &code, &memory);
    assert!(vm.run(0));
    assert_eq!(vm.pc(), 3);
    assert_eq!(vm.cache().get(1), Some(false));
    assert_eq!(vm.cache().get(2), Some(true));
    assert_eq!(vm.cache().get(3), None);
}

#[test]
fn and_mode_stops_at_first_false() {
    let code = code(&[
        bare(Opcode::And),
        bare(Opcode::True),
        bare(Opcode::False),
        bare(Opcode::True),
        bare(Opcode::Halt),
    ]);
    let memory = Memory::new();
    let mut vm = Vm::from_parts(NoopBackend, &code, &memory);
    assert!(!vm.run(0));
    assert_eq!(vm.pc(), 3);
    assert_eq!(vm.cache().get(3), None);
}

#[test]
fn bounded_block_folds_its_last_result() {
    let code = code(&[
        (Opcode::Execute, NONE, 3, 1),
        bare(Opcode::Halt),
        bare(Opcode::True),
        bare(Opcode::False),
        bare(Opcode::True),
        bare(Opcode::Halt),
    ]);
    let memory = Memory::new();
    let mut vm = Vm::from_parts(NoopBackend, &code, &memory);
    assert!(!vm.run(0));
    assert_eq!(vm.pc(), 2);
    assert_eq!(vm.cache().valid().collect::<Vec<_>>(), [(0, false), (3, false)]);

    assert!(!vm.run(0));
    assert_eq!(vm.pc(), 2);
}

#[test]
fn bounded_block_true() {
    let code = code(&[
        (Opcode::Execute, NONE, 3, 1),
        bare(Opcode::Halt),
        bare(Opcode::False),
        bare(Opcode::True),
        bare(Opcode::False),
        bare(Opcode::Halt),
    ]);
    let memory = Memory::new();
    let mut vm = Vm::from_parts(NoopBackend, &code, &memory);
    assert!(vm.run(0));
    assert_eq!(vm.pc(), 2);
    assert_eq!(vm.cache().get(0), Some(true));
    assert_eq!(vm.cache().get(3), Some(true));
}

#[test]
fn redirect_to_print() {
    let code = code(&[
        (Opcode::ExecuteSingle, 2, 0, 0),
        bare(Opcode::Halt),
        (Opcode::PrintError, 1, 0, 0),
    ]);
    let memory = Memory::from_bytes(&b"\0Hello World!"[..]);
    let mut vm = Vm::from_parts(captured(), &code, &memory);
    assert!(vm.run(0));
    assert_eq!(vm.pc(), 2);

    let (_, output, error) = vm.into_backend().into_parts();
    assert!(output.is_empty());
    assert_eq!(lines(&error), ["Hello World!"]);
}

#[test]
fn print_guards_follow_the_result() {
    let memory = Memory::from_bytes(&b"\0foo\0bar\0baz"[..]);
    let foo = memory.offset_of("foo").unwrap();
    let bar = memory.offset_of("bar").unwrap();
    let code = code(&[
        bare(Opcode::False),
        (Opcode::PrintError, foo, 0, AND),
        (Opcode::PrintError, foo, 0, OR),
        bare(Opcode::Flip),
        (Opcode::PrintError, bar, 0, AND),
        (Opcode::PrintError, bar, 0, OR),
        bare(Opcode::Halt),
    ]);
    let mut vm = Vm::from_parts(captured(), &code, &memory);
    assert!(vm.run(0));
    assert_eq!(vm.pc(), 7);
    assert_eq!(vm.cache().valid().collect::<Vec<_>>(), [(0, false), (3, true)]);

    let (_, _, error) = vm.into_backend().into_parts();
    assert_eq!(lines(&error), ["foo", "bar"]);
}

#[test]
fn shared_block_resumes_each_caller() {
    let code = code(&[
        bare(Opcode::Halt),
        // entry A
        bare(Opcode::Or),
        (Opcode::Execute, NONE, 8, 0),
        bare(Opcode::True),
        bare(Opcode::Halt),
        // entry B
        bare(Opcode::And),
        (Opcode::Execute, NONE, 8, 0),
        bare(Opcode::Halt),
        // shared block
        bare(Opcode::False),
        bare(Opcode::Return),
    ]);
    let memory = Memory::new();
    let mut vm = Vm::from_parts(NoopBackend, &code, &memory);

    assert!(vm.run(1));
    assert_eq!(vm.pc(), 4);
    assert_eq!(vm.cache().get(2), Some(false));

    // And mode is restored after the block, so the false fold short-circuits.
    assert!(!vm.run(5));
    assert_eq!(vm.pc(), 7);
    assert_eq!(vm.cache().get(6), Some(false));

    // An exhausted caller budget is restored too.
    let mut fresh = Vm::from_parts(NoopBackend, &code, &memory);
    assert!(!fresh.run_with_budget(5, 2));
    assert_eq!(fresh.pc(), 7);
}

#[test]
fn second_run_never_requeries_the_backend() {
    let mut asm = reqfilter::Assembler::new();
    asm.push_halt();
    let block = asm.code_size();
    asm.push_exists_header(Some("host")).unwrap();
    asm.push_contains_path(Some("/api"), 4).unwrap();
    asm.push_return();
    let entry = asm.code_size();
    asm.push_or();
    asm.push_execute(ExecutionMode::And, block, 0).unwrap();
    asm.push_is_method(Some("GET"), 3).unwrap();
    asm.push_halt();
    let program = asm.into_program();

    let mut vm = Vm::new(captured(), &program);
    let first = vm.run(entry);
    let asked = lines(vm.backend().output()).len();
    assert_eq!(asked, 2);

    let second = vm.run(entry);
    assert_eq!(first, second);
    assert_eq!(lines(vm.backend().output()).len(), asked);
}

#[test]
fn named_entries_run_by_name() {
    let mut tree = reqfilter::Tree::named("deny");
    tree.add_op("false", &[]);
    let program = Program::compile(&reqfilter::Forest::new().with(tree)).unwrap();
    let mut vm = Vm::new(NoopBackend, &program);
    assert_eq!(vm.run_named("deny"), Some(false));
    assert_eq!(vm.run_named("allow"), None);
}
