use miette::Diagnostic;
use relcheck_sql::SchemaError;
use thiserror::Error;

/// Failures raised while encoding a parsed query into the relational IR.
///
/// `OuterReference` is an internal resolution signal: a column resolved only
/// in an enclosing scope. The subquery instantiation path catches it and
/// re-encodes per outer tuple slot; if it escapes from a position where that
/// is impossible it is escalated to `Correlated`.
#[derive(Debug, Error, Diagnostic)]
pub enum EncodeError {
    #[error("Unknown table '{0}'")]
    #[diagnostic(code(relcheck::encode::unknown_table))]
    UnknownTable(String),

    #[error("Unknown column '{0}'")]
    #[diagnostic(code(relcheck::encode::unknown_column))]
    UnknownColumn(String),

    #[error("Column '{0}' is only visible in an enclosing scope")]
    #[diagnostic(code(relcheck::encode::outer_reference))]
    OuterReference(String),

    #[error("Correlated subquery is not supported in this position: {0}")]
    #[diagnostic(code(relcheck::encode::correlated))]
    Correlated(String),

    #[error("Syntax error: {0}")]
    #[diagnostic(code(relcheck::encode::syntax))]
    Syntax(String),

    #[error("Not supported: {0}")]
    #[diagnostic(code(relcheck::encode::not_supported))]
    NotSupported(String),

    #[error("No encoding rule for {0}")]
    #[diagnostic(code(relcheck::encode::not_implemented))]
    NotImplemented(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            EncodeError::UnknownColumn("EMP.salary".into()).to_string(),
            "Unknown column 'EMP.salary'"
        );
        assert_eq!(
            EncodeError::NotSupported("STDDEV_POP".into()).to_string(),
            "Not supported: STDDEV_POP"
        );
        assert_eq!(
            EncodeError::Syntax("ORDER BY position 4 out of range".into()).to_string(),
            "Syntax error: ORDER BY position 4 out of range"
        );
    }

    #[test]
    fn schema_errors_pass_through() {
        let err: EncodeError = SchemaError::UnknownTable("EMP".into()).into();
        assert_eq!(err.to_string(), "Unknown table 'EMP'");
    }
}
