use std::ops::Index;

use super::opcode::Opcode;

/// One fixed-width bytecode instruction: an opcode and three operand words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub op: Opcode,
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl Instruction {
    #[must_use]
    pub const fn new(op: Opcode, a: u32, b: u32, c: u32) -> Self {
        Self { op, a, b, c }
    }

    /// Operand `b` reinterpreted as the signed threshold of a numeric predicate.
    #[must_use]
    pub fn b_signed(&self) -> i32 {
        self.b as i32
    }

    /// Operand `c` reinterpreted as the signed threshold of an "after" predicate.
    #[must_use]
    pub fn c_signed(&self) -> i32 {
        self.c as i32
    }
}

impl From<Opcode> for Instruction {
    fn from(op: Opcode) -> Self {
        Self::new(op, 0, 0, 0)
    }
}

/// Flat, immutable instruction sequence addressed by slot index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Code(Vec<Instruction>);

impl Code {
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self(instructions)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, slot: u32) -> Option<&Instruction> {
        self.0.get(slot as usize)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Instruction] {
        &self.0
    }
}

impl From<Vec<Instruction>> for Code {
    fn from(instructions: Vec<Instruction>) -> Self {
        Self(instructions)
    }
}

impl FromIterator<Instruction> for Code {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Index<u32> for Code {
    type Output = Instruction;

    fn index(&self, slot: u32) -> &Instruction {
        &self.0[slot as usize]
    }
}

impl<'a> IntoIterator for &'a Code {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_operands_round_trip_through_u32() {
        let ins = Instruction::new(Opcode::LessThanAfterHeader, 1, 2, (-15_i32) as u32);
        assert_eq!(ins.c_signed(), -15);
        let ins = Instruction::new(Opcode::GreaterThanCookie, 1, (-1_i32) as u32, 0);
        assert_eq!(ins.b_signed(), -1);
    }

    #[test]
    fn code_indexing() {
        let code: Code = [Opcode::True, Opcode::Halt]
            .into_iter()
            .map(Instruction::from)
            .collect();
        assert_eq!(code.len(), 2);
        assert_eq!(code[1].op, Opcode::Halt);
        assert!(code.get(2).is_none());
    }
}
