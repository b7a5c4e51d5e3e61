//! Scalar expression lowering.
//!
//! Every AST expression becomes an [`Expr`] tree with three-valued NULL
//! semantics deferred to the SMT layer. Aggregates are collected in a
//! separate pre-pass (so the group-by node can be built before the SELECT
//! list is lowered) and replaced by references to their output attributes
//! afterwards. Subqueries are probed uncorrelated first; a probe that trips
//! over an outer column is re-instantiated once per tuple slot of the
//! enclosing table with the enclosing scope pinned to that slot.

use relcheck_sql::ast::{AggFunc, BinaryOp, CaseBranch, Literal, Query, ScalarExpr, UnaryOp};
use relcheck_sql::ColumnType;

use crate::attribute::AttrId;
use crate::errors::EncodeError;
use crate::expr::{linearize_case, AggCall, ArithOp, CmpOp, Expr, Instances};
use crate::scope::{Resolved, Scope};
use crate::table::TableId;

use super::Lowerer;

/// Aggregate policy for the clause being lowered.
pub(crate) enum AggMode<'a> {
    /// Aggregates are illegal here; the payload names the clause.
    Forbid(&'static str),
    /// Aggregates were pre-collected; replace each by its output attribute.
    Replace(&'a [(AggKey, AggCall)]),
}

/// Structural identity of one aggregate call, used to fold repeated calls
/// (`COUNT(age)` in SELECT and HAVING) onto a single output attribute.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AggKey {
    pub func: AggFunc,
    pub arg: Option<ScalarExpr>,
    pub distinct: bool,
    pub filter: Option<ScalarExpr>,
}

/// Lowering environment for one clause.
pub(crate) struct ExprEnv<'a> {
    pub scope: &'a Scope<'a>,
    /// Table whose slots a correlated subquery is instantiated against;
    /// `None` in positions where correlation cannot be supported.
    pub current: Option<TableId>,
    pub aggs: AggMode<'a>,
    in_case_cond: bool,
}

impl<'a> ExprEnv<'a> {
    pub fn forbid(scope: &'a Scope<'a>, current: Option<TableId>, clause: &'static str) -> Self {
        ExprEnv {
            scope,
            current,
            aggs: AggMode::Forbid(clause),
            in_case_cond: false,
        }
    }

    pub fn replace(
        scope: &'a Scope<'a>,
        current: Option<TableId>,
        aggs: &'a [(AggKey, AggCall)],
    ) -> Self {
        ExprEnv {
            scope,
            current,
            aggs: AggMode::Replace(aggs),
            in_case_cond: false,
        }
    }
}

impl Lowerer<'_> {
    pub(crate) fn lower_scalar(
        &mut self,
        e: &ScalarExpr,
        env: &mut ExprEnv<'_>,
    ) -> Result<Expr, EncodeError> {
        match e {
            ScalarExpr::Column { table, name } => {
                match env.scope.resolve(table.as_deref(), name)? {
                    Resolved::Local(attr) => Ok(Expr::Column(attr)),
                    Resolved::Outer { slot, attr } => Ok(Expr::Outer { slot, attr }),
                }
            }
            ScalarExpr::Literal(lit) => Ok(Expr::Lit(lit.clone())),
            ScalarExpr::Unary { op, expr } => {
                let inner = self.lower_scalar(expr, env)?;
                Ok(match op {
                    UnaryOp::Neg => Expr::Neg(Box::new(inner)),
                    UnaryOp::Not => Expr::Not(Box::new(inner)),
                })
            }
            ScalarExpr::Binary { op, left, right } => {
                let l = self.lower_scalar(left, env)?;
                let r = self.lower_scalar(right, env)?;
                Ok(lower_binary(*op, l, r))
            }
            ScalarExpr::IsNull { expr, negated } => {
                let inner = self.lower_scalar(expr, env)?;
                Ok(Expr::IsNull {
                    expr: Box::new(inner),
                    negated: *negated,
                })
            }
            ScalarExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let x = self.lower_scalar(expr, env)?;
                let lo = self.lower_scalar(low, env)?;
                let hi = self.lower_scalar(high, env)?;
                let range = Expr::cmp(CmpOp::Ge, x.clone(), lo).and(Expr::cmp(CmpOp::Le, x, hi));
                Ok(if *negated { range.not() } else { range })
            }
            ScalarExpr::InList {
                expr,
                list,
                negated,
            } => {
                let x = self.lower_scalar(expr, env)?;
                let mut membership: Option<Expr> = None;
                for item in list {
                    let rhs = self.lower_scalar(item, env)?;
                    let hit = Expr::cmp(CmpOp::Eq, x.clone(), rhs);
                    membership = Some(match membership {
                        Some(acc) => Expr::Or(Box::new(acc), Box::new(hit)),
                        None => hit,
                    });
                }
                let membership = membership.unwrap_or(Expr::Lit(Literal::Bool(false)));
                Ok(if *negated { membership.not() } else { membership })
            }
            ScalarExpr::InSubquery {
                expr,
                query,
                negated,
            } => {
                let needle = self.lower_scalar(expr, env)?;
                let instances = self.lower_subquery(query, env)?;
                self.check_single_column(&instances, "IN")?;
                Ok(Expr::InSub {
                    needle: Box::new(needle),
                    instances,
                    negated: *negated,
                })
            }
            ScalarExpr::Exists { query, negated } => {
                let instances = self.lower_subquery(query, env)?;
                Ok(Expr::Exists {
                    instances,
                    negated: *negated,
                })
            }
            ScalarExpr::Subquery(query) => {
                let instances = self.lower_subquery(query, env)?;
                self.check_single_column(&instances, "a scalar subquery")?;
                Ok(Expr::ScalarSub { instances })
            }
            ScalarExpr::Case { .. } if env.in_case_cond => Err(EncodeError::NotSupported(
                "CASE expression nested inside a CASE condition".to_string(),
            )),
            ScalarExpr::Case {
                operand,
                branches,
                else_expr,
            } => self.lower_case(operand.as_deref(), branches, else_expr.as_deref(), env),
            ScalarExpr::Aggregate {
                func,
                arg,
                distinct,
                filter,
            } => match &env.aggs {
                AggMode::Forbid(clause) => Err(EncodeError::Syntax(format!(
                    "aggregate {} is not allowed in {clause}",
                    func.name()
                ))),
                AggMode::Replace(collected) => {
                    let key = AggKey {
                        func: *func,
                        arg: arg.as_deref().cloned(),
                        distinct: *distinct,
                        filter: filter.as_deref().cloned(),
                    };
                    collected
                        .iter()
                        .find(|(k, _)| *k == key)
                        .map(|(_, call)| Expr::Column(call.attr))
                        .ok_or_else(|| {
                            EncodeError::NotImplemented(format!(
                                "aggregate {} escaped collection",
                                func.name()
                            ))
                        })
                }
            },
        }
    }

    fn lower_case(
        &mut self,
        operand: Option<&ScalarExpr>,
        branches: &[CaseBranch],
        else_expr: Option<&ScalarExpr>,
        env: &mut ExprEnv<'_>,
    ) -> Result<Expr, EncodeError> {
        let mut pairs = Vec::with_capacity(branches.len());
        for branch in branches {
            // `CASE x WHEN v` compares the operand against each branch value.
            let cond_ast = match operand {
                Some(op) => op.clone().eq(branch.when.clone()),
                None => branch.when.clone(),
            };
            env.in_case_cond = true;
            let when = self.lower_scalar(&cond_ast, env);
            env.in_case_cond = false;
            let then = self.lower_scalar(&branch.then, env)?;
            pairs.push((when?, then));
        }
        let els = match else_expr {
            Some(e) => Some(self.lower_scalar(e, env)?),
            None => None,
        };
        Ok(Expr::Case(linearize_case(pairs, els)))
    }

    /// Probe the subquery uncorrelated; on an outer-column hit, instantiate
    /// it once per tuple slot of the enclosing table. A probe that fails
    /// leaves unreferenced arena nodes behind; the SMT layer only lowers
    /// nodes reachable from the final roots, so they are inert.
    fn lower_subquery(
        &mut self,
        query: &Query,
        env: &mut ExprEnv<'_>,
    ) -> Result<Instances, EncodeError> {
        match self.lower_query(query, Some(env.scope)) {
            Ok(tid) => Ok(Instances::Shared(tid)),
            Err(EncodeError::OuterReference(column)) => {
                let Some(current) = env.current else {
                    return Err(EncodeError::Correlated(format!(
                        "outer column '{column}' referenced where no row context exists"
                    )));
                };
                let slots = self.arena.table(current).slots.clone();
                let mut tids = Vec::with_capacity(slots.len());
                for slot in slots {
                    let mut pinned = env.scope.clone();
                    pinned.pin(slot);
                    tids.push(self.lower_query(query, Some(&pinned))?);
                }
                Ok(Instances::PerSlot(tids))
            }
            Err(e) => Err(e),
        }
    }

    fn check_single_column(
        &self,
        instances: &Instances,
        position: &str,
    ) -> Result<(), EncodeError> {
        let Some(&tid) = instances.all().first() else {
            return Ok(());
        };
        let n = self.arena.table(tid).attrs.len();
        if n != 1 {
            return Err(EncodeError::Syntax(format!(
                "subquery used with {position} must produce exactly one column, got {n}"
            )));
        }
        Ok(())
    }

    /// Pre-pass collecting every aggregate call in `e` (not descending into
    /// subqueries, whose aggregates belong to their own query level).
    /// Argument and FILTER expressions are lowered here, against the
    /// grouping *input* table.
    pub(crate) fn collect_aggs(
        &mut self,
        e: &ScalarExpr,
        scope: &Scope<'_>,
        input: TableId,
        out: &mut Vec<(AggKey, AggCall)>,
    ) -> Result<(), EncodeError> {
        match e {
            ScalarExpr::Aggregate {
                func,
                arg,
                distinct,
                filter,
            } => {
                if matches!(
                    func,
                    AggFunc::StddevPop | AggFunc::StddevSamp | AggFunc::VarPop | AggFunc::VarSamp
                ) {
                    return Err(EncodeError::NotSupported(func.name().to_string()));
                }
                let key = AggKey {
                    func: *func,
                    arg: arg.as_deref().cloned(),
                    distinct: *distinct,
                    filter: filter.as_deref().cloned(),
                };
                if out.iter().any(|(k, _)| *k == key) {
                    return Ok(());
                }
                let mut env = ExprEnv::forbid(scope, Some(input), "an aggregate argument");
                let lowered_arg = match arg.as_deref() {
                    Some(a) => Some(self.lower_scalar(a, &mut env)?),
                    None => None,
                };
                let lowered_filter = match filter.as_deref() {
                    Some(f) => Some(self.lower_scalar(f, &mut env)?),
                    None => None,
                };
                let attr = self.arena.fresh_attr_id();
                out.push((
                    key,
                    AggCall {
                        func: *func,
                        arg: lowered_arg,
                        distinct: *distinct,
                        filter: lowered_filter,
                        attr,
                    },
                ));
                Ok(())
            }
            ScalarExpr::Unary { expr, .. } | ScalarExpr::IsNull { expr, .. } => {
                self.collect_aggs(expr, scope, input, out)
            }
            ScalarExpr::Binary { left, right, .. } => {
                self.collect_aggs(left, scope, input, out)?;
                self.collect_aggs(right, scope, input, out)
            }
            ScalarExpr::Between {
                expr, low, high, ..
            } => {
                self.collect_aggs(expr, scope, input, out)?;
                self.collect_aggs(low, scope, input, out)?;
                self.collect_aggs(high, scope, input, out)
            }
            ScalarExpr::InList { expr, list, .. } => {
                self.collect_aggs(expr, scope, input, out)?;
                for item in list {
                    self.collect_aggs(item, scope, input, out)?;
                }
                Ok(())
            }
            ScalarExpr::InSubquery { expr, .. } => self.collect_aggs(expr, scope, input, out),
            ScalarExpr::Case {
                operand,
                branches,
                else_expr,
            } => {
                if let Some(op) = operand {
                    self.collect_aggs(op, scope, input, out)?;
                }
                for b in branches {
                    self.collect_aggs(&b.when, scope, input, out)?;
                    self.collect_aggs(&b.then, scope, input, out)?;
                }
                if let Some(e) = else_expr {
                    self.collect_aggs(e, scope, input, out)?;
                }
                Ok(())
            }
            ScalarExpr::Column { .. }
            | ScalarExpr::Literal(_)
            | ScalarExpr::Exists { .. }
            | ScalarExpr::Subquery(_) => Ok(()),
        }
    }

    /// Static type of a lowered expression, used to type projection output
    /// attributes and sort keys.
    pub(crate) fn expr_type(&self, e: &Expr) -> ColumnType {
        match e {
            Expr::Column(id) | Expr::Outer { attr: id, .. } => self.attr_ty(*id),
            Expr::Lit(Literal::Bool(_)) => ColumnType::Boolean,
            Expr::Lit(Literal::Str(_)) => ColumnType::Varchar,
            Expr::Lit(Literal::Date(_)) => ColumnType::Date,
            Expr::Lit(Literal::Int(_)) | Expr::Lit(Literal::Null) => ColumnType::Int,
            Expr::Neg(_) | Expr::Arith { .. } => ColumnType::Int,
            Expr::Not(_)
            | Expr::Cmp { .. }
            | Expr::And(..)
            | Expr::Or(..)
            | Expr::IsNull { .. }
            | Expr::Exists { .. }
            | Expr::InSub { .. } => ColumnType::Boolean,
            Expr::Case(arms) => arms
                .first()
                .map(|a| self.expr_type(&a.then))
                .unwrap_or(ColumnType::Int),
            Expr::ScalarSub { instances } => instances
                .all()
                .first()
                .and_then(|&tid| self.arena.table(tid).attrs.first().map(|a| a.ty))
                .unwrap_or(ColumnType::Int),
        }
    }

    fn attr_ty(&self, id: AttrId) -> ColumnType {
        self.arena.attr_type(id).unwrap_or(ColumnType::Int)
    }
}

fn lower_binary(op: BinaryOp, l: Expr, r: Expr) -> Expr {
    let arith = |op, l, r| Expr::Arith {
        op,
        left: Box::new(l),
        right: Box::new(r),
    };
    match op {
        BinaryOp::Add => arith(ArithOp::Add, l, r),
        BinaryOp::Sub => arith(ArithOp::Sub, l, r),
        BinaryOp::Mul => arith(ArithOp::Mul, l, r),
        BinaryOp::Div => arith(ArithOp::Div, l, r),
        BinaryOp::Eq => Expr::cmp(CmpOp::Eq, l, r),
        BinaryOp::Ne => Expr::cmp(CmpOp::Ne, l, r),
        BinaryOp::Lt => Expr::cmp(CmpOp::Lt, l, r),
        BinaryOp::Le => Expr::cmp(CmpOp::Le, l, r),
        BinaryOp::Gt => Expr::cmp(CmpOp::Gt, l, r),
        BinaryOp::Ge => Expr::cmp(CmpOp::Ge, l, r),
        BinaryOp::And => Expr::And(Box::new(l), Box::new(r)),
        BinaryOp::Or => Expr::Or(Box::new(l), Box::new(r)),
    }
}
