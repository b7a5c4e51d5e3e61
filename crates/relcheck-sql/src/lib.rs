//! SQL-side contracts for relcheck.
//!
//! This crate defines the typed AST handed over by the external SQL parser,
//! the bounded schema object, the integrity-constraint DSL, and the value
//! coercions (date/string encodings) shared by the encoder and the
//! counterexample extractor. It never parses SQL text itself.

pub mod ast;
pub mod constraints;
pub mod errors;
pub mod schema;

pub use ast::{Dialect, Query, SqlParser};
pub use constraints::IntegrityConstraint;
pub use errors::{ParseFailure, SchemaError};
pub use schema::{ColumnType, Schema, TableSchema};
