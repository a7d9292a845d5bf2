use thiserror::Error;

/// Rejected argument to an [`Assembler`](crate::Assembler) emission call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("invalid argument {position}: {reason}")]
    InvalidArgument { position: u8, reason: &'static str },
}

impl AssembleError {
    pub(crate) fn null(position: u8) -> Self {
        AssembleError::InvalidArgument {
            position,
            reason: "missing string",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("unknown predicate '{name}'")]
    UnknownPredicate { name: String },

    #[error("predicate '{name}' takes {expected} parameter(s), got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("predicate '{name}' expects an integer, got '{value}'")]
    InvalidNumber { name: String, value: String },

    #[error("print mode must be true or false, got '{value}'")]
    InvalidPrintMode { value: String },

    #[error("{kind} node has no child block")]
    MissingChild { kind: &'static str },

    #[error("blocks nested {depth} deep exceed the limit of {limit}")]
    NestingTooDeep { depth: usize, limit: usize },

    #[error("predicate '{name}': {source}")]
    Assemble {
        name: String,
        #[source]
        source: AssembleError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_message() {
        assert_eq!(
            AssembleError::null(1).to_string(),
            "invalid argument 1: missing string"
        );
    }

    #[test]
    fn unknown_predicate_message() {
        let err = CompileError::UnknownPredicate {
            name: "isTeapot".into(),
        };
        assert_eq!(err.to_string(), "unknown predicate 'isTeapot'");
    }

    #[test]
    fn arity_message() {
        let err = CompileError::Arity {
            name: "containsHeader".into(),
            expected: "2".into(),
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "predicate 'containsHeader' takes 2 parameter(s), got 1"
        );
    }

    #[test]
    fn invalid_number_message() {
        let err = CompileError::InvalidNumber {
            name: "lessThanHeader".into(),
            value: "ten".into(),
        };
        assert_eq!(
            err.to_string(),
            "predicate 'lessThanHeader' expects an integer, got 'ten'"
        );
    }

    #[test]
    fn print_mode_message() {
        let err = CompileError::InvalidPrintMode {
            value: "maybe".into(),
        };
        assert_eq!(err.to_string(), "print mode must be true or false, got 'maybe'");
    }

    #[test]
    fn missing_child_message() {
        let err = CompileError::MissingChild { kind: "Or" };
        assert_eq!(err.to_string(), "Or node has no child block");
    }

    #[test]
    fn nesting_message() {
        let err = CompileError::NestingTooDeep { depth: 20, limit: 16 };
        assert_eq!(
            err.to_string(),
            "blocks nested 20 deep exceed the limit of 16"
        );
    }

    #[test]
    fn assemble_message_names_predicate() {
        let err = CompileError::Assemble {
            name: "isMethod".into(),
            source: AssembleError::InvalidArgument {
                position: 2,
                reason: "length exceeds string",
            },
        };
        assert_eq!(
            err.to_string(),
            "predicate 'isMethod': invalid argument 2: length exceeds string"
        );
    }
}
