use miette::Diagnostic;
use thiserror::Error;

/// Schema- and constraint-level failures raised before any encoding starts.
#[derive(Debug, Error, Diagnostic)]
pub enum SchemaError {
    #[error("Unknown table '{0}'")]
    #[diagnostic(code(relcheck::schema::unknown_table))]
    UnknownTable(String),

    #[error("Unknown column '{0}'")]
    #[diagnostic(code(relcheck::schema::unknown_column))]
    UnknownColumn(String),

    #[error("Malformed column reference '{0}'")]
    #[diagnostic(
        code(relcheck::schema::bad_column_ref),
        help("integrity constraints reference columns as TABLE__COLUMN")
    )]
    BadColumnRef(String),

    #[error("Malformed integrity constraint: {0}")]
    #[diagnostic(code(relcheck::schema::bad_constraint))]
    BadConstraint(String),

    #[error("Malformed date literal '{0}'")]
    #[diagnostic(code(relcheck::schema::bad_date), help("dates use YYYY-MM-DD"))]
    BadDate(String),
}

/// The external parser rejected the SQL text.
#[derive(Debug, Error, Diagnostic)]
#[error("Parser rejected the input: {message}")]
#[diagnostic(code(relcheck::parse::syntax))]
pub struct ParseFailure {
    pub message: String,
}

impl ParseFailure {
    pub fn new(message: impl Into<String>) -> Self {
        ParseFailure {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            SchemaError::UnknownTable("EMP".into()).to_string(),
            "Unknown table 'EMP'"
        );
        assert_eq!(
            SchemaError::BadColumnRef("EMPage".into()).to_string(),
            "Malformed column reference 'EMPage'"
        );
        assert_eq!(
            ParseFailure::new("unexpected token").to_string(),
            "Parser rejected the input: unexpected token"
        );
    }
}
