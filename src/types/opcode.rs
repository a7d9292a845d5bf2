use std::fmt;

/// Instruction tags understood by the [`Vm`](crate::Vm).
///
/// Discriminants are stable: they are the values stored in serialized
/// programs. `0` is deliberately unassigned so a zeroed word never decodes
/// as a valid instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Skip = 1,
    Execute,
    ExecuteSingle,
    Return,
    Halt,
    None,
    And,
    Or,
    Not,
    Flip,
    False,
    True,
    PrintError,
    PrintDebug,
    IsMethod,
    IsScheme,
    ContainsDomain,
    EqualDomain,
    NotEqualDomain,
    StartsWithDomain,
    ContainsPath,
    EqualPath,
    NotEqualPath,
    StartsWithPath,
    ContainsQueryParameter,
    EqualQueryParameter,
    ExistsQueryParameter,
    GreaterThanQueryParameter,
    GreaterThanAfterQueryParameter,
    LessThanQueryParameter,
    LessThanAfterQueryParameter,
    NotEqualQueryParameter,
    StartsWithQueryParameter,
    ContainsHeader,
    EqualHeader,
    ExistsHeader,
    GreaterThanHeader,
    GreaterThanAfterHeader,
    LessThanHeader,
    LessThanAfterHeader,
    NotEqualHeader,
    StartsWithHeader,
    ContainsCookie,
    EqualCookie,
    ExistsCookie,
    GreaterThanCookie,
    GreaterThanAfterCookie,
    LessThanCookie,
    LessThanAfterCookie,
    NotEqualCookie,
    StartsWithCookie,
}

/// How the three operand words of an instruction are interpreted.
///
/// Drives the disassembler and bytecode validation; the VM itself decodes
/// operands directly in its dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// No operands.
    Nullary,
    /// `a` = optional label string.
    Label,
    /// `a` = execution mode, `b` = target slot, `c` = budget.
    Call,
    /// `a` = target slot.
    Jump,
    /// `a` = message, `b` = optional tag, `c` = guard mode.
    Print,
    /// `a` = value, `b` = length in bytes, `c` = start offset (StartsWith only).
    Text,
    /// `a` = field name.
    Name,
    /// `a` = field name, `b` = value, `c` = start offset (StartsWith only).
    NameValue,
    /// `a` = field name, `b` = signed threshold.
    Threshold,
    /// `a` = field name, `b` = marker, `c` = signed threshold.
    MarkerThreshold,
}

impl Opcode {
    pub const ALL: [Opcode; 51] = [
        Opcode::Skip,
        Opcode::Execute,
        Opcode::ExecuteSingle,
        Opcode::Return,
        Opcode::Halt,
        Opcode::None,
        Opcode::And,
        Opcode::Or,
        Opcode::Not,
        Opcode::Flip,
        Opcode::False,
        Opcode::True,
        Opcode::PrintError,
        Opcode::PrintDebug,
        Opcode::IsMethod,
        Opcode::IsScheme,
        Opcode::ContainsDomain,
        Opcode::EqualDomain,
        Opcode::NotEqualDomain,
        Opcode::StartsWithDomain,
        Opcode::ContainsPath,
        Opcode::EqualPath,
        Opcode::NotEqualPath,
        Opcode::StartsWithPath,
        Opcode::ContainsQueryParameter,
        Opcode::EqualQueryParameter,
        Opcode::ExistsQueryParameter,
        Opcode::GreaterThanQueryParameter,
        Opcode::GreaterThanAfterQueryParameter,
        Opcode::LessThanQueryParameter,
        Opcode::LessThanAfterQueryParameter,
        Opcode::NotEqualQueryParameter,
        Opcode::StartsWithQueryParameter,
        Opcode::ContainsHeader,
        Opcode::EqualHeader,
        Opcode::ExistsHeader,
        Opcode::GreaterThanHeader,
        Opcode::GreaterThanAfterHeader,
        Opcode::LessThanHeader,
        Opcode::LessThanAfterHeader,
        Opcode::NotEqualHeader,
        Opcode::StartsWithHeader,
        Opcode::ContainsCookie,
        Opcode::EqualCookie,
        Opcode::ExistsCookie,
        Opcode::GreaterThanCookie,
        Opcode::GreaterThanAfterCookie,
        Opcode::LessThanCookie,
        Opcode::LessThanAfterCookie,
        Opcode::NotEqualCookie,
        Opcode::StartsWithCookie,
    ];

    /// Decode a raw opcode word. Returns `None` outside the valid range.
    #[must_use]
    pub fn from_u32(raw: u32) -> Option<Self> {
        let index = usize::try_from(raw.checked_sub(1)?).ok()?;
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Skip => "Skip",
            Opcode::Execute => "Execute",
            Opcode::ExecuteSingle => "ExecuteSingle",
            Opcode::Return => "Return",
            Opcode::Halt => "Halt",
            Opcode::None => "None",
            Opcode::And => "And",
            Opcode::Or => "Or",
            Opcode::Not => "Not",
            Opcode::Flip => "Flip",
            Opcode::False => "False",
            Opcode::True => "True",
            Opcode::PrintError => "PrintError",
            Opcode::PrintDebug => "PrintDebug",
            Opcode::IsMethod => "IsMethod",
            Opcode::IsScheme => "IsScheme",
            Opcode::ContainsDomain => "ContainsDomain",
            Opcode::EqualDomain => "EqualDomain",
            Opcode::NotEqualDomain => "NotEqualDomain",
            Opcode::StartsWithDomain => "StartsWithDomain",
            Opcode::ContainsPath => "ContainsPath",
            Opcode::EqualPath => "EqualPath",
            Opcode::NotEqualPath => "NotEqualPath",
            Opcode::StartsWithPath => "StartsWithPath",
            Opcode::ContainsQueryParameter => "ContainsQueryParameter",
            Opcode::EqualQueryParameter => "EqualQueryParameter",
            Opcode::ExistsQueryParameter => "ExistsQueryParameter",
            Opcode::GreaterThanQueryParameter => "GreaterThanQueryParameter",
            Opcode::GreaterThanAfterQueryParameter => "GreaterThanAfterQueryParameter",
            Opcode::LessThanQueryParameter => "LessThanQueryParameter",
            Opcode::LessThanAfterQueryParameter => "LessThanAfterQueryParameter",
            Opcode::NotEqualQueryParameter => "NotEqualQueryParameter",
            Opcode::StartsWithQueryParameter => "StartsWithQueryParameter",
            Opcode::ContainsHeader => "ContainsHeader",
            Opcode::EqualHeader => "EqualHeader",
            Opcode::ExistsHeader => "ExistsHeader",
            Opcode::GreaterThanHeader => "GreaterThanHeader",
            Opcode::GreaterThanAfterHeader => "GreaterThanAfterHeader",
            Opcode::LessThanHeader => "LessThanHeader",
            Opcode::LessThanAfterHeader => "LessThanAfterHeader",
            Opcode::NotEqualHeader => "NotEqualHeader",
            Opcode::StartsWithHeader => "StartsWithHeader",
            Opcode::ContainsCookie => "ContainsCookie",
            Opcode::EqualCookie => "EqualCookie",
            Opcode::ExistsCookie => "ExistsCookie",
            Opcode::GreaterThanCookie => "GreaterThanCookie",
            Opcode::GreaterThanAfterCookie => "GreaterThanAfterCookie",
            Opcode::LessThanCookie => "LessThanCookie",
            Opcode::LessThanAfterCookie => "LessThanAfterCookie",
            Opcode::NotEqualCookie => "NotEqualCookie",
            Opcode::StartsWithCookie => "StartsWithCookie",
        }
    }

    #[must_use]
    pub fn operands(self) -> Operands {
        use Opcode::*;
        match self {
            Return | Halt | None | And | Or | Not | Flip | False | True => Operands::Nullary,
            Skip => Operands::Label,
            Execute => Operands::Call,
            ExecuteSingle => Operands::Jump,
            PrintError | PrintDebug => Operands::Print,
            IsMethod | IsScheme | ContainsDomain | EqualDomain | NotEqualDomain
            | StartsWithDomain | ContainsPath | EqualPath | NotEqualPath | StartsWithPath => {
                Operands::Text
            }
            ExistsQueryParameter | ExistsHeader | ExistsCookie => Operands::Name,
            ContainsQueryParameter | EqualQueryParameter | NotEqualQueryParameter
            | StartsWithQueryParameter | ContainsHeader | EqualHeader | NotEqualHeader
            | StartsWithHeader | ContainsCookie | EqualCookie | NotEqualCookie
            | StartsWithCookie => Operands::NameValue,
            GreaterThanQueryParameter | LessThanQueryParameter | GreaterThanHeader
            | LessThanHeader | GreaterThanCookie | LessThanCookie => Operands::Threshold,
            GreaterThanAfterQueryParameter | LessThanAfterQueryParameter
            | GreaterThanAfterHeader | LessThanAfterHeader | GreaterThanAfterCookie
            | LessThanAfterCookie => Operands::MarkerThreshold,
        }
    }

    /// Whether executing this opcode sets the Result register and
    /// therefore records a memoized value for its slot.
    #[must_use]
    pub fn produces_result(self) -> bool {
        match self.operands() {
            Operands::Nullary => matches!(self, Opcode::Flip | Opcode::False | Opcode::True),
            Operands::Label | Operands::Jump | Operands::Print => false,
            _ => true,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Short-circuit discipline of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ExecutionMode {
    /// Every instruction runs.
    None = 1,
    /// Stop at the first false result.
    And = 2,
    /// Stop at the first true result.
    Or = 3,
}

impl ExecutionMode {
    #[must_use]
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(ExecutionMode::None),
            2 => Some(ExecutionMode::And),
            3 => Some(ExecutionMode::Or),
            _ => Option::None,
        }
    }

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether an instruction may run given the current Result.
    #[must_use]
    pub fn admits(self, result: bool) -> bool {
        match self {
            ExecutionMode::None => true,
            ExecutionMode::And => result,
            ExecutionMode::Or => !result,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionMode::None => "None",
            ExecutionMode::And => "And",
            ExecutionMode::Or => "Or",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_are_dense() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(op.as_u32() as usize, i + 1, "{op}");
            assert_eq!(Opcode::from_u32(op.as_u32()), Some(*op));
        }
    }

    #[test]
    fn out_of_range_words_are_rejected() {
        assert_eq!(Opcode::from_u32(0), None);
        assert_eq!(Opcode::from_u32(52), None);
        assert_eq!(Opcode::from_u32(u32::MAX), None);
    }

    #[test]
    fn result_producing_opcodes() {
        assert!(Opcode::True.produces_result());
        assert!(Opcode::Flip.produces_result());
        assert!(Opcode::Execute.produces_result());
        assert!(Opcode::ContainsHeader.produces_result());
        assert!(Opcode::GreaterThanAfterCookie.produces_result());
        assert!(!Opcode::Not.produces_result());
        assert!(!Opcode::PrintError.produces_result());
        assert!(!Opcode::ExecuteSingle.produces_result());
        assert!(!Opcode::Skip.produces_result());
    }

    #[test]
    fn mode_admission() {
        assert!(ExecutionMode::None.admits(false));
        assert!(ExecutionMode::And.admits(true));
        assert!(!ExecutionMode::And.admits(false));
        assert!(ExecutionMode::Or.admits(false));
        assert!(!ExecutionMode::Or.admits(true));
        assert_eq!(ExecutionMode::from_u32(0), None);
        assert_eq!(ExecutionMode::from_u32(2), Some(ExecutionMode::And));
    }
}
