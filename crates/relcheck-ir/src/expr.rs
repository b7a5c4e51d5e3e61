//! Scalar expression IR.
//!
//! Expressions are lowered from the AST with three-valued NULL semantics in
//! mind: the SMT visitor evaluates every node to a (value, is-null) pair, and
//! predicates additionally to a (is-true, is-null) pair. CASE expressions are
//! stored *linearized*: a flat list of mutually exclusive (condition, value)
//! arms including the synthesized else arm, so downstream filters never
//! reason about nested conditionals.

use relcheck_sql::ast::{AggFunc, Literal};

use crate::attribute::AttrId;
use crate::table::{SlotId, TableId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Subquery instantiation sites.
///
/// An uncorrelated subquery is encoded once and shared; a correlated one is
/// re-instantiated with fresh arena nodes for every tuple slot of the
/// enclosing table, and the visitor selects the instance by the slot index
/// it is currently evaluating.
#[derive(Debug, Clone, PartialEq)]
pub enum Instances {
    Shared(TableId),
    PerSlot(Vec<TableId>),
}

impl Instances {
    pub fn for_slot_idx(&self, idx: usize) -> TableId {
        match self {
            Instances::Shared(t) => *t,
            Instances::PerSlot(ts) => ts[idx],
        }
    }

    pub fn all(&self) -> Vec<TableId> {
        match self {
            Instances::Shared(t) => vec![*t],
            Instances::PerSlot(ts) => ts.clone(),
        }
    }
}

/// One linearized CASE arm.
///
/// Arms are evaluated first-match: the arm that fires is the earliest whose
/// condition is *definitely* true (true and not NULL), which makes the arms
/// mutually exclusive without baking negations of earlier conditions into
/// each arm. An UNKNOWN condition falls through to the next arm, matching
/// SQL's CASE semantics under three-valued logic.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    pub when: Expr,
    pub then: Expr,
}

/// An aggregate folded by the group-by reduce phase.
///
/// `arg`/`filter` are evaluated per member slot of the map-input window;
/// `attr` is the output attribute carrying the folded value.
#[derive(Debug, Clone, PartialEq)]
pub struct AggCall {
    pub func: AggFunc,
    /// `None` encodes `COUNT(*)`.
    pub arg: Option<Expr>,
    pub distinct: bool,
    pub filter: Option<Expr>,
    pub attr: AttrId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to an attribute of the slot under evaluation.
    Column(AttrId),
    /// Captured reference to a concrete slot of an enclosing query.
    Outer { slot: SlotId, attr: AttrId },
    Lit(Literal),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cmp {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    /// Linearized CASE; the last arm is the synthesized else branch.
    Case(Vec<CaseArm>),
    Exists {
        instances: Instances,
        negated: bool,
    },
    InSub {
        needle: Box<Expr>,
        instances: Instances,
        negated: bool,
    },
    ScalarSub {
        instances: Instances,
    },
}

impl Expr {
    pub fn lit_null() -> Self {
        Expr::Lit(Literal::Null)
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::And(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn cmp(op: CmpOp, left: Expr, right: Expr) -> Self {
        Expr::Cmp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Linearize a CASE expression into `n + 1` flat first-match arms.
///
/// The synthesized final arm carries an always-true condition and yields the
/// else expression (NULL when absent), so every CASE is total. Conditions
/// arrive already lowered; for the `CASE x WHEN v` form the caller lowers
/// `x = v` conditions.
pub fn linearize_case(branches: Vec<(Expr, Expr)>, else_expr: Option<Expr>) -> Vec<CaseArm> {
    let mut arms = Vec::with_capacity(branches.len() + 1);
    for (when, then) in branches {
        arms.push(CaseArm { when, then });
    }
    arms.push(CaseArm {
        when: Expr::Lit(Literal::Bool(true)),
        then: else_expr.unwrap_or_else(Expr::lit_null),
    });
    arms
}
