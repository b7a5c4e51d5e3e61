//! Bounded SQL equivalence verification engine.
//!
//! This crate orchestrates the pipeline end to end: both queries of a pair
//! are lowered into one shared arena (so their encodings range over the same
//! database), the bounded relational semantics and the declared integrity
//! constraints are asserted, and the negated equivalence conclusion is handed
//! to the solver. UNSAT means the queries agree on every database within the
//! bounds; SAT is decoded into a concrete witness database plus both queries'
//! row-by-row outputs.

pub mod counterexample;
pub mod errors;
pub mod result;
pub mod session;
pub mod verifier;

pub use counterexample::{CellValue, Counterexample, QueryOutput, TableDump};
pub use errors::VerifyError;
pub use result::{Verdict, VerifyState};
pub use session::{Checkpoint, Session};
pub use verifier::{check_equivalence, Verifier};
