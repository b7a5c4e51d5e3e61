//! Typed AST for parsed SQL queries.
//!
//! The parser is an external collaborator: it turns SQL text into this
//! structure (`parse(text, dialect) -> Query`) and relcheck consumes it
//! without ever re-reading the raw text. The types derive `Serialize`/
//! `Deserialize` so an out-of-process parser can hand the nested structure
//! over as JSON.

use serde::{Deserialize, Serialize};

use crate::errors::ParseFailure;

/// SQL dialect tag attached to a parse request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    All,
    MySql,
    MariaDb,
    Psql,
    PostgreSql,
    Oracle,
}

/// Contract for the external SQL parser.
pub trait SqlParser {
    fn parse(&self, sql: &str, dialect: Dialect) -> Result<Query, ParseFailure>;
}

/// A complete query: optional WITH bindings, a set-expression body, and the
/// outermost ORDER BY / LIMIT / OFFSET.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub with: Vec<CteBinding>,
    pub body: SetExpr,
    #[serde(default)]
    pub order_by: Vec<OrderKey>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl Query {
    /// A bare SELECT with no WITH/ORDER BY/LIMIT wrapping.
    pub fn select(select: Select) -> Self {
        Query {
            with: Vec::new(),
            body: SetExpr::Select(Box::new(select)),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Whether the outermost clause is an ORDER BY (list semantics marker).
    pub fn has_outer_order_by(&self) -> bool {
        !self.order_by.is_empty()
    }
}

/// One `name AS (query)` binding in a WITH clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CteBinding {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    pub query: Query,
}

/// Body of a query: a plain SELECT or a set operation over two bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetExpr {
    Select(Box<Select>),
    SetOp {
        op: SetOp,
        all: bool,
        left: Box<SetExpr>,
        right: Box<SetExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

/// A single SELECT block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    #[serde(default)]
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    #[serde(default)]
    pub from: Option<TableRef>,
    #[serde(default)]
    pub selection: Option<ScalarExpr>,
    #[serde(default)]
    pub group_by: Vec<ScalarExpr>,
    #[serde(default)]
    pub having: Option<ScalarExpr>,
}

impl Select {
    pub fn new(items: Vec<SelectItem>, from: Option<TableRef>) -> Self {
        Select {
            distinct: false,
            items,
            from,
            selection: None,
            group_by: Vec::new(),
            having: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `t.*`
    QualifiedWildcard(String),
    /// An expression with an optional `AS` alias.
    Expr {
        expr: ScalarExpr,
        #[serde(default)]
        alias: Option<String>,
    },
}

impl SelectItem {
    pub fn expr(expr: ScalarExpr) -> Self {
        SelectItem::Expr { expr, alias: None }
    }

    pub fn aliased(expr: ScalarExpr, alias: impl Into<String>) -> Self {
        SelectItem::Expr {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// A FROM-clause item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableRef {
    /// A base table or WITH binding, optionally aliased.
    Named {
        name: String,
        #[serde(default)]
        alias: Option<String>,
    },
    /// A parenthesized subquery with a declared alias and optional column list.
    Subquery {
        query: Box<Query>,
        alias: String,
        #[serde(default)]
        columns: Vec<String>,
    },
    Join(Box<Join>),
}

impl TableRef {
    pub fn named(name: impl Into<String>) -> Self {
        TableRef::Named {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        TableRef::Named {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub left: TableRef,
    pub right: TableRef,
    pub op: JoinOp,
    pub constraint: JoinConstraint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinOp {
    /// Plain cartesian product (comma join or CROSS JOIN).
    Cross,
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinConstraint {
    /// No ON/USING clause (cross joins only).
    None,
    Natural,
    On(ScalarExpr),
    Using(Vec<String>),
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub expr: ScalarExpr,
    #[serde(default = "default_asc")]
    pub asc: bool,
}

fn default_asc() -> bool {
    true
}

impl OrderKey {
    pub fn asc(expr: ScalarExpr) -> Self {
        OrderKey { expr, asc: true }
    }

    pub fn desc(expr: ScalarExpr) -> Self {
        OrderKey { expr, asc: false }
    }
}

/// Scalar (row-level) expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarExpr {
    Column {
        #[serde(default)]
        table: Option<String>,
        name: String,
    },
    Literal(Literal),
    Unary {
        op: UnaryOp,
        expr: Box<ScalarExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<ScalarExpr>,
        right: Box<ScalarExpr>,
    },
    IsNull {
        expr: Box<ScalarExpr>,
        #[serde(default)]
        negated: bool,
    },
    Between {
        expr: Box<ScalarExpr>,
        low: Box<ScalarExpr>,
        high: Box<ScalarExpr>,
        #[serde(default)]
        negated: bool,
    },
    InList {
        expr: Box<ScalarExpr>,
        list: Vec<ScalarExpr>,
        #[serde(default)]
        negated: bool,
    },
    InSubquery {
        expr: Box<ScalarExpr>,
        query: Box<Query>,
        #[serde(default)]
        negated: bool,
    },
    Exists {
        query: Box<Query>,
        #[serde(default)]
        negated: bool,
    },
    Subquery(Box<Query>),
    Case {
        /// `CASE x WHEN ...` operand; `None` for the searched form.
        #[serde(default)]
        operand: Option<Box<ScalarExpr>>,
        branches: Vec<CaseBranch>,
        #[serde(default)]
        else_expr: Option<Box<ScalarExpr>>,
    },
    Aggregate {
        func: AggFunc,
        /// `None` encodes `COUNT(*)`.
        #[serde(default)]
        arg: Option<Box<ScalarExpr>>,
        #[serde(default)]
        distinct: bool,
        /// `FILTER (WHERE ...)` clause.
        #[serde(default)]
        filter: Option<Box<ScalarExpr>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranch {
    pub when: ScalarExpr,
    pub then: ScalarExpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Whether this operator yields a boolean (three-valued) result.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// Recognized but deliberately unencodable; raises NotSupported.
    StddevPop,
    StddevSamp,
    VarPop,
    VarSamp,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::StddevPop => "STDDEV_POP",
            AggFunc::StddevSamp => "STDDEV_SAMP",
            AggFunc::VarPop => "VAR_POP",
            AggFunc::VarSamp => "VAR_SAMP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Literal {
    Int(i64),
    Bool(bool),
    /// String literal; modeled through the session interner.
    Str(String),
    /// ISO `YYYY-MM-DD` date literal; modeled as a day number.
    Date(String),
    Null,
}

/// Convenience constructors used pervasively by tests and drivers.
impl ScalarExpr {
    pub fn column(name: impl Into<String>) -> Self {
        ScalarExpr::Column {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        ScalarExpr::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn int(n: i64) -> Self {
        ScalarExpr::Literal(Literal::Int(n))
    }

    pub fn null() -> Self {
        ScalarExpr::Literal(Literal::Null)
    }

    pub fn binary(op: BinaryOp, left: ScalarExpr, right: ScalarExpr) -> Self {
        ScalarExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(self, other: ScalarExpr) -> Self {
        ScalarExpr::binary(BinaryOp::Eq, self, other)
    }

    pub fn ne(self, other: ScalarExpr) -> Self {
        ScalarExpr::binary(BinaryOp::Ne, self, other)
    }

    pub fn lt(self, other: ScalarExpr) -> Self {
        ScalarExpr::binary(BinaryOp::Lt, self, other)
    }

    pub fn le(self, other: ScalarExpr) -> Self {
        ScalarExpr::binary(BinaryOp::Le, self, other)
    }

    pub fn gt(self, other: ScalarExpr) -> Self {
        ScalarExpr::binary(BinaryOp::Gt, self, other)
    }

    pub fn ge(self, other: ScalarExpr) -> Self {
        ScalarExpr::binary(BinaryOp::Ge, self, other)
    }

    pub fn and(self, other: ScalarExpr) -> Self {
        ScalarExpr::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: ScalarExpr) -> Self {
        ScalarExpr::binary(BinaryOp::Or, self, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        ScalarExpr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    pub fn count_star() -> Self {
        ScalarExpr::Aggregate {
            func: AggFunc::Count,
            arg: None,
            distinct: false,
            filter: None,
        }
    }

    pub fn agg(func: AggFunc, arg: ScalarExpr) -> Self {
        ScalarExpr::Aggregate {
            func,
            arg: Some(Box::new(arg)),
            distinct: false,
            filter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_shortcuts_compose() {
        let e = ScalarExpr::column("age")
            .gt(ScalarExpr::int(25))
            .and(ScalarExpr::column("name").ne(ScalarExpr::null()));
        match e {
            ScalarExpr::Binary {
                op: BinaryOp::And, ..
            } => {}
            other => panic!("expected AND at the root, got {other:?}"),
        }
    }

    #[test]
    fn query_round_trips_through_json() {
        let q = Query::select(Select::new(
            vec![SelectItem::expr(ScalarExpr::column("name"))],
            Some(TableRef::named("EMP")),
        ));
        let json = serde_json::to_string(&q).unwrap();
        let back: Query = serde_json::from_str(&json).unwrap();
        assert_eq!(q, back);
    }

    #[test]
    fn outer_order_by_marks_list_semantics() {
        let mut q = Query::select(Select::new(
            vec![SelectItem::expr(ScalarExpr::column("a"))],
            Some(TableRef::named("T")),
        ));
        assert!(!q.has_outer_order_by());
        q.order_by.push(OrderKey::asc(ScalarExpr::column("a")));
        assert!(q.has_outer_order_by());
    }

    #[test]
    fn predicate_classification() {
        assert!(BinaryOp::Eq.is_predicate());
        assert!(BinaryOp::Or.is_predicate());
        assert!(!BinaryOp::Add.is_predicate());
        assert!(!BinaryOp::Div.is_predicate());
    }
}
