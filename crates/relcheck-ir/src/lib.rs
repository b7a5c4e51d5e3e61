//! Bounded relational IR and AST-to-IR lowering.
//!
//! This crate defines the arena-allocated relational algebra IR (tables
//! built from a fixed number of tuple slots), the scalar expression IR with
//! three-valued NULL tracking and CASE linearization, the name-resolution
//! scope chain, and the clause-ordered encoder that turns a parsed SQL query
//! into one IR table per query.

pub mod attribute;
pub mod errors;
pub mod expr;
pub mod lowering;
pub mod scope;
pub mod table;

pub use attribute::{AttrId, Attribute};
pub use errors::EncodeError;
pub use lowering::lower;
pub use expr::{AggCall, ArithOp, CaseArm, CmpOp, Expr, Instances};
pub use table::{
    Arena, GroupNode, JoinKind, JoinNode, JoinSide, PadGroup, SlotId, SortKey, SortNode,
    SortStage, TableId, TableNode, TableOp,
};
