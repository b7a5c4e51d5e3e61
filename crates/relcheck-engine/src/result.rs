use serde::Serialize;

use crate::counterexample::Counterexample;

/// Terminal classification of one verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerifyState {
    #[serde(rename = "EQUIV")]
    Equiv,
    #[serde(rename = "NON_EQUIV")]
    NonEquiv,
    #[serde(rename = "UNKNOWN")]
    Unknown,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "SYN_ERR")]
    SynErr,
    #[serde(rename = "NOT_IMPL_ERR")]
    NotImplErr,
    #[serde(rename = "NOT_SUP_ERR")]
    NotSupErr,
    #[serde(rename = "OOM")]
    Oom,
    #[serde(rename = "OTHER_ERR")]
    OtherErr,
}

impl VerifyState {
    /// Whether the run produced a definite answer about the query pair.
    pub fn is_conclusive(&self) -> bool {
        matches!(self, VerifyState::Equiv | VerifyState::NonEquiv)
    }
}

/// Outcome of checking one query pair.
///
/// `code` summarizes the answer for drivers that only care about the
/// three-way split: 1 for equivalent, 0 for not equivalent (and for every
/// inconclusive or failed run), -1 when the two outputs have different
/// column counts and the question itself is ill-posed.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub state: VerifyState,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterexample: Option<Counterexample>,
}

impl Verdict {
    pub fn equivalent() -> Self {
        Verdict {
            state: VerifyState::Equiv,
            code: 1,
            detail: None,
            counterexample: None,
        }
    }

    pub fn not_equivalent(witness: Counterexample) -> Self {
        Verdict {
            state: VerifyState::NonEquiv,
            code: 0,
            detail: None,
            counterexample: Some(witness),
        }
    }

    /// The two outputs cannot be compared at all.
    pub fn incomparable(left_columns: usize, right_columns: usize) -> Self {
        Verdict {
            state: VerifyState::NonEquiv,
            code: -1,
            detail: Some(format!(
                "outputs have {left_columns} and {right_columns} columns"
            )),
            counterexample: None,
        }
    }

    /// Classify a solver "unknown" answer by its reported reason.
    pub fn undecided(reason: String) -> Self {
        let lowered = reason.to_ascii_lowercase();
        let state = if lowered.contains("timeout") || lowered.contains("canceled") {
            VerifyState::Timeout
        } else if lowered.contains("memout") || lowered.contains("memory") {
            VerifyState::Oom
        } else {
            VerifyState::Unknown
        };
        Verdict {
            state,
            code: 0,
            detail: Some(reason),
            counterexample: None,
        }
    }

    pub fn error(state: VerifyState, detail: String) -> Self {
        Verdict {
            state,
            code: 0,
            detail: Some(detail),
            counterexample: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_serialize_under_their_wire_names() {
        let json = serde_json::to_value(VerifyState::NonEquiv).unwrap();
        assert_eq!(json, serde_json::json!("NON_EQUIV"));
        let json = serde_json::to_value(VerifyState::NotImplErr).unwrap();
        assert_eq!(json, serde_json::json!("NOT_IMPL_ERR"));
    }

    #[test]
    fn unknown_reasons_are_classified() {
        assert_eq!(
            Verdict::undecided("timeout".to_string()).state,
            VerifyState::Timeout
        );
        assert_eq!(
            Verdict::undecided("smt tactic failed: canceled".to_string()).state,
            VerifyState::Timeout
        );
        assert_eq!(
            Verdict::undecided("max. memory exceeded".to_string()).state,
            VerifyState::Oom
        );
        assert_eq!(
            Verdict::undecided("incomplete theory".to_string()).state,
            VerifyState::Unknown
        );
    }

    #[test]
    fn incomparable_uses_the_sentinel_code() {
        let v = Verdict::incomparable(2, 3);
        assert_eq!(v.code, -1);
        assert_eq!(v.state, VerifyState::NonEquiv);
        assert!(v.counterexample.is_none());
    }

    #[test]
    fn only_the_two_answers_are_conclusive() {
        assert!(VerifyState::Equiv.is_conclusive());
        assert!(VerifyState::NonEquiv.is_conclusive());
        assert!(!VerifyState::Unknown.is_conclusive());
        assert!(!VerifyState::SynErr.is_conclusive());
    }
}
