//! Human-readable listing of compiled bytecode.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::types::{Code, ExecutionMode, Instruction, Memory, Opcode, Operands};

/// Bytes occupied by one instruction in the flat word layout.
const INSTRUCTION_BYTES: u32 = 16;

/// Render `code` with its operands, decoded modes, the strings its memory
/// operands point at, and a marker before every block that some `Execute`
/// or `ExecuteSingle` jumps to.
///
/// ```text
///      0 0x000000 Halt                          0x00000000 0x00000000 0x00000000
///
///  -- Entry 1 --
///      1 0x000010 ExistsHeader                  0x00000001 0x00000000 0x00000000
///     -> "host"
/// ```
#[must_use]
pub fn disassemble(code: &Code, memory: &Memory) -> String {
    let entries = entry_points(code);
    let mut out = String::new();

    for (slot, ins) in (0_u32..).zip(code.iter()) {
        if let Some(n) = entries.get(&slot) {
            let _ = write!(out, "\n -- Entry {n} --\n");
        }
        let _ = write!(
            out,
            "{slot:>6} {:#08x} {:<30}{:#010x} {:#010x} {:#010x}",
            slot * INSTRUCTION_BYTES,
            ins.op.name(),
            ins.a,
            ins.b,
            ins.c,
        );

        let comments = comments(ins, &entries);
        if !comments.is_empty() {
            let _ = write!(out, " // {}", comments.join(", "));
        }
        out.push('\n');

        for offset in strings(ins) {
            if offset != 0 {
                let _ = writeln!(out, "    -> {:?}", memory.str_at(offset));
            }
        }
    }
    out
}

/// Jump targets numbered in order of first reference.
fn entry_points(code: &Code) -> BTreeMap<u32, usize> {
    let mut entries = BTreeMap::new();
    for ins in code {
        if let Some(target) = target(ins) {
            let next = entries.len() + 1;
            entries.entry(target).or_insert(next);
        }
    }
    entries
}

fn target(ins: &Instruction) -> Option<u32> {
    match ins.op {
        Opcode::Execute => Some(ins.b),
        Opcode::ExecuteSingle => Some(ins.a),
        _ => None,
    }
}

fn comments(ins: &Instruction, entries: &BTreeMap<u32, usize>) -> Vec<String> {
    let mut comments = Vec::new();
    match ins.op.operands() {
        Operands::Call => {
            match ExecutionMode::from_u32(ins.a) {
                Some(mode) => comments.push(mode.to_string()),
                None => comments.push(format!("invalid mode {}", ins.a)),
            }
            if ins.c > 0 {
                comments.push(format!("budget {}", ins.c));
            }
        }
        Operands::Print => match ExecutionMode::from_u32(ins.c) {
            Some(ExecutionMode::And) => comments.push("when true".to_owned()),
            Some(ExecutionMode::Or) => comments.push("when false".to_owned()),
            _ => {}
        },
        Operands::Text if ins.op.name().starts_with("StartsWith") && ins.c > 0 => {
            comments.push(format!("at {}", ins.c));
        }
        Operands::NameValue if ins.c > 0 => comments.push(format!("at {}", ins.c)),
        Operands::Threshold => comments.push(format!("than {}", ins.b_signed())),
        Operands::MarkerThreshold => comments.push(format!("than {}", ins.c_signed())),
        _ => {}
    }
    if let Some(n) = target(ins).and_then(|t| entries.get(&t)) {
        comments.push(format!("entry {n}"));
    }
    comments
}

/// Memory offsets referenced by `ins`, in operand order.
fn strings(ins: &Instruction) -> Vec<u32> {
    match ins.op.operands() {
        Operands::Label | Operands::Text | Operands::Name | Operands::Threshold => vec![ins.a],
        Operands::Print | Operands::NameValue | Operands::MarkerThreshold => vec![ins.a, ins.b],
        Operands::Nullary | Operands::Call | Operands::Jump => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::Assembler;

    #[test]
    fn lists_every_slot_with_strings() {
        let mut asm = Assembler::new();
        asm.push_halt();
        asm.push_contains_header(Some("accept"), "json").unwrap();
        asm.push_greater_than_cookie(Some("age"), -3).unwrap();
        asm.push_return();
        let (code, memory, _) = asm.into_parts();

        let text = disassemble(&code, &memory);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("     0 0x000000 Halt"));
        assert!(lines[1].contains("ContainsHeader"));
        assert!(lines[1].contains("0x00000001"));
        assert_eq!(lines[2], "    -> \"accept\"");
        assert_eq!(lines[3], "    -> \"json\"");
        assert!(lines[4].starts_with("     2 0x000020 GreaterThanCookie"));
        assert!(lines[4].ends_with("// than -3"));
        assert_eq!(lines[5], "    -> \"age\"");
        assert!(lines[6].contains("Return"));
    }

    #[test]
    fn marks_block_entries() {
        let mut asm = Assembler::new();
        asm.push_halt();
        let block = asm.push_true();
        asm.push_return();
        asm.push_execute(ExecutionMode::Or, block, 0).unwrap();
        let (code, memory, _) = asm.into_parts();

        let text = disassemble(&code, &memory);
        let call = text.lines().find(|l| l.contains("Execute")).unwrap();
        assert!(call.ends_with("// Or, entry 1"));
        let marker = text.find(" -- Entry 1 --").unwrap();
        assert!(marker > text.find("Halt").unwrap());
        assert!(marker < text.find("True").unwrap());
    }

    #[test]
    fn print_guards_are_annotated() {
        let mut asm = Assembler::new();
        asm.push_print_error(Some("denied"), Some("acl"), ExecutionMode::Or)
            .unwrap();
        let (code, memory, _) = asm.into_parts();
        let text = disassemble(&code, &memory);
        assert!(text.contains("// when false"));
        assert!(text.contains("-> \"denied\""));
        assert!(text.contains("-> \"acl\""));
    }
}
