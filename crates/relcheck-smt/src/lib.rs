//! First-order constraint lowering and solver integration.
//!
//! This crate walks the bounded relational IR bottom-up and emits
//! quantifier-free integer/boolean constraints defining every tuple slot's
//! existence and attribute values, plus the schema facts and integrity
//! constraints of the declared database. Terms are solver-agnostic; the Z3
//! backend translates them on assertion.

pub mod backends;
pub mod encode;
pub mod errors;
pub mod interner;
pub mod solver;
pub mod sorts;
pub mod terms;

pub use encode::{del_var, null_var, val_var, Encoder, EquivEncoding};
pub use errors::LowerError;
pub use interner::StringInterner;
pub use solver::{Model, ModelValue, SatResult, SmtSolver};
pub use sorts::SmtSort;
pub use terms::SmtTerm;
