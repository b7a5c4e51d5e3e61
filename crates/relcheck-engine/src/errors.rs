use miette::Diagnostic;
use thiserror::Error;

use relcheck_ir::EncodeError;
use relcheck_smt::LowerError;

use crate::result::VerifyState;

/// Anything that stops a verification run before it reaches a verdict.
#[derive(Debug, Error, Diagnostic)]
pub enum VerifyError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lower(#[from] LowerError),

    #[error("Solver failure: {0}")]
    #[diagnostic(code(relcheck::verify::solver))]
    Solver(String),
}

impl VerifyError {
    /// Map the failure onto its terminal report state.
    pub fn state(&self) -> VerifyState {
        match self {
            VerifyError::Encode(e) => match e {
                EncodeError::UnknownTable(_)
                | EncodeError::UnknownColumn(_)
                | EncodeError::OuterReference(_)
                | EncodeError::Syntax(_)
                | EncodeError::Schema(_) => VerifyState::SynErr,
                EncodeError::Correlated(_) | EncodeError::NotSupported(_) => {
                    VerifyState::NotSupErr
                }
                EncodeError::NotImplemented(_) => VerifyState::NotImplErr,
            },
            VerifyError::Lower(e) => match e {
                LowerError::NotImplemented(_) => VerifyState::NotImplErr,
                LowerError::BadConstraint(_) | LowerError::Schema(_) => VerifyState::SynErr,
                LowerError::UnknownAttribute(_) | LowerError::Internal(_) => {
                    VerifyState::OtherErr
                }
            },
            VerifyError::Solver(_) => VerifyState::OtherErr,
        }
    }
}
