use miette::Diagnostic;
use relcheck_sql::SchemaError;
use thiserror::Error;

/// Failures raised while lowering the relational IR into SMT constraints.
///
/// Lowering runs on IR that the encoder already validated, so most variants
/// here indicate either an internal inconsistency (an attribute with no
/// defining expression, a dangling slot) or an integrity constraint the
/// bounded encoding cannot express.
#[derive(Debug, Error, Diagnostic)]
pub enum LowerError {
    #[error("Unknown attribute '{0}' during constraint lowering")]
    #[diagnostic(code(relcheck::lower::unknown_attribute))]
    UnknownAttribute(String),

    #[error("Integrity constraint rejected: {0}")]
    #[diagnostic(code(relcheck::lower::bad_constraint))]
    BadConstraint(String),

    #[error("No lowering rule for {0}")]
    #[diagnostic(code(relcheck::lower::not_implemented))]
    NotImplemented(String),

    #[error("Internal lowering invariant violated: {0}")]
    #[diagnostic(code(relcheck::lower::internal))]
    Internal(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),
}
