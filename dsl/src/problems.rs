//! The catalog of problems that the compiler can report.
//!
//! Each problem has a stable user-facing code, a message describing the
//! category, and a kind that determines how the compilation driver treats
//! it. The codes should remain stable between releases to facilitate
//! consistent documentation.

/// How a problem was detected, per the compiler's error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemKind {
    /// A malformed token.
    Lexical,
    /// An unexpected token; recovery is handled by the parser's sync loops.
    Syntax,
    /// A well-formed program that violates the language rules.
    Semantic,
    /// A violated compiler invariant. Indicates a compiler bug, not a
    /// user error.
    Internal,
}

/// A type of problem that the compiler detects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Problem {
    // Lexical
    InvalidToken,
    NumberTooLarge,
    UnterminatedComment,

    // Syntax
    UnexpectedToken,

    // Semantic
    UndefinedSymbol,
    MultipleDefinition,
    TypeMismatch,
    NotInteger,
    NotBoolean,
    NotAnArray,
    NotARecord,
    NoSuchField,
    IndexOutOfRange,
    ConstantExpected,
    IllegalAssignment,
    NotAValue,
    AddressError,
    ForwardCall,
    LevelAccess,
    DivisionByZero,
    StructuredValueParameter,
    TooManyArguments,
    TooFewArguments,
    ArgumentTypeMismatch,
    NameMismatch,
    ExpressionTooComplex,
    NotImplemented,

    // Internal
    RegisterImbalance,
    BadJumpPatch,
}

impl Problem {
    /// The stable user-facing code for the problem.
    pub fn code(&self) -> &'static str {
        match self {
            Problem::InvalidToken => "E0001",
            Problem::NumberTooLarge => "E0002",
            Problem::UnterminatedComment => "E0003",
            Problem::UnexpectedToken => "E0101",
            Problem::UndefinedSymbol => "E0201",
            Problem::MultipleDefinition => "E0202",
            Problem::TypeMismatch => "E0203",
            Problem::NotInteger => "E0204",
            Problem::NotBoolean => "E0205",
            Problem::NotAnArray => "E0206",
            Problem::NotARecord => "E0207",
            Problem::NoSuchField => "E0208",
            Problem::IndexOutOfRange => "E0209",
            Problem::ConstantExpected => "E0210",
            Problem::IllegalAssignment => "E0211",
            Problem::NotAValue => "E0212",
            Problem::AddressError => "E0213",
            Problem::ForwardCall => "E0214",
            Problem::LevelAccess => "E0215",
            Problem::DivisionByZero => "E0216",
            Problem::StructuredValueParameter => "E0217",
            Problem::TooManyArguments => "E0218",
            Problem::TooFewArguments => "E0219",
            Problem::ArgumentTypeMismatch => "E0220",
            Problem::NameMismatch => "E0221",
            Problem::ExpressionTooComplex => "E0222",
            Problem::NotImplemented => "E0299",
            Problem::RegisterImbalance => "E0901",
            Problem::BadJumpPatch => "E0902",
        }
    }

    /// A message describing the type of problem.
    pub fn message(&self) -> &'static str {
        match self {
            Problem::InvalidToken => "Invalid token",
            Problem::NumberTooLarge => "Number too large for integer",
            Problem::UnterminatedComment => "Comment is not terminated",
            Problem::UnexpectedToken => "Unexpected token",
            Problem::UndefinedSymbol => "Undefined identifier",
            Problem::MultipleDefinition => "Identifier defined multiple times",
            Problem::TypeMismatch => "Incompatible types",
            Problem::NotInteger => "Expression is not an integer",
            Problem::NotBoolean => "Expression is not a boolean",
            Problem::NotAnArray => "Indexed expression is not an array",
            Problem::NotARecord => "Selected expression is not a record",
            Problem::NoSuchField => "Record has no such field",
            Problem::IndexOutOfRange => "Array index out of range",
            Problem::ConstantExpected => "Expression is not constant",
            Problem::IllegalAssignment => "Illegal assignment target",
            Problem::NotAValue => "Identifier does not denote a value",
            Problem::AddressError => "Expression has no address",
            Problem::ForwardCall => "Forward call not allowed",
            Problem::LevelAccess => "Access across procedure nesting levels",
            Problem::DivisionByZero => "Division by constant zero",
            Problem::StructuredValueParameter => "No structured value parameters",
            Problem::TooManyArguments => "Too many arguments",
            Problem::TooFewArguments => "Too few arguments",
            Problem::ArgumentTypeMismatch => "Argument type does not match parameter",
            Problem::NameMismatch => "Name does not match declaration",
            Problem::ExpressionTooComplex => "Expression needs too many registers",
            Problem::NotImplemented => "Not implemented",
            Problem::RegisterImbalance => "Register stack out of sync",
            Problem::BadJumpPatch => "Jump patch applied to a non-jump instruction",
        }
    }

    /// The kind of the problem in the compiler's error taxonomy.
    pub fn kind(&self) -> ProblemKind {
        match self {
            Problem::InvalidToken | Problem::NumberTooLarge | Problem::UnterminatedComment => {
                ProblemKind::Lexical
            }
            Problem::UnexpectedToken => ProblemKind::Syntax,
            Problem::RegisterImbalance | Problem::BadJumpPatch => ProblemKind::Internal,
            _ => ProblemKind::Semantic,
        }
    }
}
