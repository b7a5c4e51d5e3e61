//! Scalar expression evaluation under three-valued logic.
//!
//! Every expression evaluates to a [`Val`]: an integer value term and a
//! boolean null term. Predicates evaluate to a [`Truth`]: the pair `(t, n)`
//! where the predicate is TRUE iff `t && !n`, FALSE iff `!t && !n`, and
//! UNKNOWN iff `n`. The two forms convert freely: an integer is truthy when
//! non-zero, a truth value widens to 1/0.

use relcheck_ir::{ArithOp, AttrId, CaseArm, CmpOp, Expr, Instances, TableId, TableOp};
use relcheck_sql::ast::Literal;
use relcheck_sql::schema::date_to_days;

use super::{and2, and_all, or2, or_any, null_var, val_var, Encoder};
use crate::errors::LowerError;
use crate::terms::SmtTerm;

/// The row (or row pair, for join conditions) an expression is being
/// evaluated against.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RowCtx {
    Single {
        table: TableId,
        idx: usize,
    },
    /// Join condition context: columns resolve against whichever side owns
    /// them.
    Pair {
        left: (TableId, usize),
        right: (TableId, usize),
    },
}

impl RowCtx {
    /// Index selecting the per-slot instance of a correlated subquery.
    /// Correlation is rejected inside join conditions, so the pair context
    /// only ever sees shared instances.
    fn slot_idx(&self) -> usize {
        match self {
            RowCtx::Single { idx, .. } => *idx,
            RowCtx::Pair { .. } => 0,
        }
    }
}

/// An evaluated scalar: integer value plus null flag.
#[derive(Debug, Clone)]
pub(crate) struct Val {
    pub v: SmtTerm,
    pub n: SmtTerm,
}

impl Val {
    pub fn null() -> Self {
        Val {
            v: SmtTerm::int(0),
            n: SmtTerm::bool(true),
        }
    }

    fn to_truth(self) -> Truth {
        Truth {
            t: self.v.eq(SmtTerm::int(0)).not(),
            n: self.n,
        }
    }
}

/// An evaluated predicate under three-valued logic.
#[derive(Debug, Clone)]
pub(crate) struct Truth {
    pub t: SmtTerm,
    pub n: SmtTerm,
}

impl Truth {
    /// The predicate holds: definitely true, not unknown.
    pub fn holds(self) -> SmtTerm {
        and2(self.t, self.n.not())
    }

    fn definitely_true(&self) -> SmtTerm {
        and2(self.t.clone(), self.n.clone().not())
    }

    fn definitely_false(&self) -> SmtTerm {
        and2(self.t.clone().not(), self.n.clone().not())
    }

    fn to_val(self) -> Val {
        Val {
            v: SmtTerm::ite(self.t, SmtTerm::int(1), SmtTerm::int(0)),
            n: self.n,
        }
    }
}

/// Null-aware cell equality: both NULL, or both non-NULL and equal. This is
/// the grouping/DISTINCT/set-operation notion of "the same value", distinct
/// from the comparison predicate `=` which goes UNKNOWN on NULL.
pub(crate) fn null_eq(l: &Val, r: &Val) -> SmtTerm {
    or2(
        and2(l.n.clone(), r.n.clone()),
        and_all(vec![
            l.n.clone().not(),
            r.n.clone().not(),
            l.v.clone().eq(r.v.clone()),
        ]),
    )
}

impl<'a> Encoder<'a> {
    /// Resolve a column reference against the row context, chasing view
    /// nodes and attribute derivations down to a materialized cell.
    pub(crate) fn column(&mut self, attr: AttrId, ctx: RowCtx) -> Result<Val, LowerError> {
        let (table, idx) = match ctx {
            RowCtx::Pair { left, right } => {
                if self.node_has_attr(left.0, attr) {
                    left
                } else {
                    right
                }
            }
            RowCtx::Single { table, idx } => (table, idx),
        };
        let node = self.arena.table(table);
        let Some(a) = node.attrs.iter().find(|a| a.id == attr) else {
            // Not bound on this node: a captured reference through a view
            // chain or a hidden sort key. Re-derive from its definition.
            let fallback = self
                .attr_fallback(attr)
                .ok_or_else(|| LowerError::UnknownAttribute(attr.to_string()))?;
            let Some(expr) = fallback.expr else {
                return Err(LowerError::UnknownAttribute(fallback.name));
            };
            return self.eval(&expr, RowCtx::Single { table, idx });
        };
        match &node.op {
            TableOp::Alias { input } | TableOp::Rename { input } => {
                let inner = RowCtx::Single { table: *input, idx };
                match &a.expr {
                    Some(expr) => self.eval(expr, inner),
                    None => self.column(attr, inner),
                }
            }
            TableOp::Slice { input } => {
                let slot = node.slots[idx];
                let pos = self
                    .arena
                    .table(*input)
                    .slots
                    .iter()
                    .position(|&s| s == slot)
                    .ok_or_else(|| {
                        LowerError::Internal(format!("slice slot {slot} missing from its input"))
                    })?;
                self.column(attr, RowCtx::Single { table: *input, idx: pos })
            }
            // A sort that emitted no comparators shares its input's slots.
            TableOp::Sort(sort) if sort.stages.is_empty() => {
                self.column(attr, RowCtx::Single { table: sort.input, idx })
            }
            _ => {
                let slot = node.slots[idx];
                Ok(Val {
                    v: SmtTerm::var(val_var(slot, attr)),
                    n: SmtTerm::var(null_var(slot, attr)),
                })
            }
        }
    }

    /// Evaluate an expression to a value.
    pub(crate) fn eval(&mut self, expr: &Expr, ctx: RowCtx) -> Result<Val, LowerError> {
        match expr {
            Expr::Column(attr) => self.column(*attr, ctx),
            Expr::Outer { slot, attr } => {
                let (table, idx) = *self.slot_owner.get(slot).ok_or_else(|| {
                    LowerError::Internal(format!("outer slot {slot} has no materialized owner"))
                })?;
                self.column(*attr, RowCtx::Single { table, idx })
            }
            Expr::Lit(lit) => self.literal(lit),
            Expr::Neg(e) => {
                let v = self.eval(e, ctx)?;
                Ok(Val {
                    v: SmtTerm::int(0).sub(v.v),
                    n: v.n,
                })
            }
            Expr::Arith { op, left, right } => {
                let l = self.eval(left, ctx)?;
                let r = self.eval(right, ctx)?;
                match op {
                    ArithOp::Add => Ok(Val {
                        v: l.v.add(r.v),
                        n: or2(l.n, r.n),
                    }),
                    ArithOp::Sub => Ok(Val {
                        v: l.v.sub(r.v),
                        n: or2(l.n, r.n),
                    }),
                    ArithOp::Mul => Ok(Val {
                        v: l.v.mul(r.v),
                        n: or2(l.n, r.n),
                    }),
                    // Division by zero yields NULL rather than an error, the
                    // usual lenient-dialect reading.
                    ArithOp::Div => {
                        let by_zero = r.v.clone().eq(SmtTerm::int(0));
                        Ok(Val {
                            v: l.v.div(r.v),
                            n: SmtTerm::or(vec![l.n, r.n, by_zero]),
                        })
                    }
                }
            }
            Expr::Case(arms) => self.eval_case(arms, ctx),
            Expr::ScalarSub { instances } => self.eval_scalar_sub(instances, ctx),
            _ => Ok(self.eval_pred(expr, ctx)?.to_val()),
        }
    }

    /// Evaluate an expression as a predicate.
    pub(crate) fn eval_pred(&mut self, expr: &Expr, ctx: RowCtx) -> Result<Truth, LowerError> {
        match expr {
            Expr::Lit(Literal::Bool(b)) => Ok(Truth {
                t: SmtTerm::bool(*b),
                n: SmtTerm::bool(false),
            }),
            Expr::Lit(Literal::Null) => Ok(Truth {
                t: SmtTerm::bool(false),
                n: SmtTerm::bool(true),
            }),
            Expr::Not(e) => {
                let p = self.eval_pred(e, ctx)?;
                Ok(Truth {
                    t: p.t.not(),
                    n: p.n,
                })
            }
            Expr::And(a, b) => {
                let pa = self.eval_pred(a, ctx)?;
                let pb = self.eval_pred(b, ctx)?;
                let t = and2(pa.definitely_true(), pb.definitely_true());
                let any_false = or2(pa.definitely_false(), pb.definitely_false());
                Ok(Truth {
                    n: and2(any_false.not(), t.clone().not()),
                    t,
                })
            }
            Expr::Or(a, b) => {
                let pa = self.eval_pred(a, ctx)?;
                let pb = self.eval_pred(b, ctx)?;
                let t = or2(pa.definitely_true(), pb.definitely_true());
                let both_false = and2(pa.definitely_false(), pb.definitely_false());
                Ok(Truth {
                    n: and2(both_false.not(), t.clone().not()),
                    t,
                })
            }
            Expr::Cmp { op, left, right } => {
                let l = self.eval(left, ctx)?;
                let r = self.eval(right, ctx)?;
                let t = match op {
                    CmpOp::Eq => l.v.eq(r.v),
                    CmpOp::Ne => l.v.eq(r.v).not(),
                    CmpOp::Lt => l.v.lt(r.v),
                    CmpOp::Le => l.v.le(r.v),
                    CmpOp::Gt => l.v.gt(r.v),
                    CmpOp::Ge => l.v.ge(r.v),
                };
                Ok(Truth {
                    t,
                    n: or2(l.n, r.n),
                })
            }
            Expr::IsNull { expr, negated } => {
                let v = self.eval(expr, ctx)?;
                let t = if *negated { v.n.not() } else { v.n };
                Ok(Truth {
                    t,
                    n: SmtTerm::bool(false),
                })
            }
            Expr::Exists { instances, negated } => {
                let inst = instances.for_slot_idx(ctx.slot_idx());
                self.encode_table(inst)?;
                let rows = self.arena.table(inst).slots.len();
                let any = or_any((0..rows).map(|j| self.row_alive(inst, j)).collect());
                let t = if *negated { any.not() } else { any };
                Ok(Truth {
                    t,
                    n: SmtTerm::bool(false),
                })
            }
            Expr::InSub {
                needle,
                instances,
                negated,
            } => {
                let nv = self.eval(needle, ctx)?;
                let inst = instances.for_slot_idx(ctx.slot_idx());
                self.encode_table(inst)?;
                let node = self.arena.table(inst);
                let col = node
                    .attrs
                    .first()
                    .ok_or_else(|| {
                        LowerError::Internal("IN subquery with no output column".to_string())
                    })?
                    .id;
                let rows = node.slots.len();
                let mut matched = Vec::with_capacity(rows);
                let mut null_cands = Vec::with_capacity(rows);
                for j in 0..rows {
                    let alive = self.row_alive(inst, j);
                    let cv = self.column(col, RowCtx::Single { table: inst, idx: j })?;
                    matched.push(and_all(vec![
                        alive.clone(),
                        nv.n.clone().not(),
                        cv.n.clone().not(),
                        nv.v.clone().eq(cv.v),
                    ]));
                    null_cands.push(and2(alive, or2(nv.n.clone(), cv.n)));
                }
                // UNKNOWN when nothing matched but a NULL on either side
                // could have.
                let t = or_any(matched);
                let n = and2(t.clone().not(), or_any(null_cands));
                let t = if *negated { t.not() } else { t };
                Ok(Truth { t, n })
            }
            _ => Ok(self.eval(expr, ctx)?.to_truth()),
        }
    }

    fn literal(&mut self, lit: &Literal) -> Result<Val, LowerError> {
        let v = match lit {
            Literal::Int(n) => SmtTerm::int(*n),
            Literal::Bool(b) => SmtTerm::int(i64::from(*b)),
            Literal::Str(s) => SmtTerm::int(self.interner.intern(s)),
            Literal::Date(d) => SmtTerm::int(date_to_days(d)?),
            Literal::Null => return Ok(Val::null()),
        };
        Ok(Val {
            v,
            n: SmtTerm::bool(false),
        })
    }

    /// First-match CASE: the arm that fires is the earliest whose condition
    /// is definitely true; UNKNOWN conditions fall through. The final arm is
    /// unconditional by construction.
    fn eval_case(&mut self, arms: &[CaseArm], ctx: RowCtx) -> Result<Val, LowerError> {
        let Some((last, rest)) = arms.split_last() else {
            return Err(LowerError::Internal("CASE with no arms".to_string()));
        };
        let mut acc = self.eval(&last.then, ctx)?;
        for arm in rest.iter().rev() {
            let fire = self.eval_pred(&arm.when, ctx)?.holds();
            let then = self.eval(&arm.then, ctx)?;
            acc = Val {
                v: SmtTerm::ite(fire.clone(), then.v, acc.v),
                n: SmtTerm::ite(fire, then.n, acc.n),
            };
        }
        Ok(acc)
    }

    /// Scalar subquery: the first surviving row's single column, NULL when
    /// the result is empty.
    fn eval_scalar_sub(&mut self, instances: &Instances, ctx: RowCtx) -> Result<Val, LowerError> {
        let inst = instances.for_slot_idx(ctx.slot_idx());
        self.encode_table(inst)?;
        let node = self.arena.table(inst);
        let col = node
            .attrs
            .first()
            .ok_or_else(|| {
                LowerError::Internal("scalar subquery with no output column".to_string())
            })?
            .id;
        let rows = node.slots.len();
        let mut acc = Val::null();
        for j in (0..rows).rev() {
            let alive = self.row_alive(inst, j);
            let cv = self.column(col, RowCtx::Single { table: inst, idx: j })?;
            acc = Val {
                v: SmtTerm::ite(alive.clone(), cv.v, acc.v),
                n: SmtTerm::ite(alive, cv.n, acc.n),
            };
        }
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relcheck_sql::schema::TableSchema;
    use relcheck_sql::{ColumnType, Schema};

    use crate::interner::StringInterner;

    fn fixture() -> (relcheck_ir::Arena, Schema, TableId, AttrId) {
        let schema = Schema::new().table(
            "EMP",
            TableSchema::new(1)
                .column("id", ColumnType::Int)
                .column("age", ColumnType::Int),
        );
        let mut arena = relcheck_ir::Arena::new();
        let emp = arena.base("EMP", schema.lookup("EMP").unwrap());
        let age = arena.table(emp).attrs[1].id;
        (arena, schema, emp, age)
    }

    #[test]
    fn columns_read_materialized_cells() {
        let (arena, schema, emp, age) = fixture();
        let mut interner = StringInterner::new();
        let mut enc = Encoder::new(&arena, &schema, &mut interner);
        enc.encode_table(emp).unwrap();
        let slot = arena.table(emp).slots[0];
        let val = enc
            .column(age, RowCtx::Single { table: emp, idx: 0 })
            .unwrap();
        assert_eq!(val.v, SmtTerm::var(val_var(slot, age)));
        assert_eq!(val.n, SmtTerm::var(null_var(slot, age)));
    }

    #[test]
    fn alias_columns_chase_the_derivation() {
        let (mut arena, schema, emp, age) = fixture();
        let aliased = arena.alias(emp, "E", &[]).unwrap();
        let e_age = arena.table(aliased).attrs[1].id;
        let mut interner = StringInterner::new();
        let mut enc = Encoder::new(&arena, &schema, &mut interner);
        enc.encode_table(aliased).unwrap();
        let slot = arena.table(emp).slots[0];
        let val = enc
            .column(e_age, RowCtx::Single { table: aliased, idx: 0 })
            .unwrap();
        assert_eq!(val.v, SmtTerm::var(val_var(slot, age)));
    }

    #[test]
    fn string_literals_go_through_the_interner() {
        let (arena, schema, emp, _) = fixture();
        let mut interner = StringInterner::new();
        let mut enc = Encoder::new(&arena, &schema, &mut interner);
        enc.encode_table(emp).unwrap();
        let ctx = RowCtx::Single { table: emp, idx: 0 };
        let a = enc.eval(&Expr::Lit(Literal::Str("x".into())), ctx).unwrap();
        let b = enc.eval(&Expr::Lit(Literal::Str("y".into())), ctx).unwrap();
        let a2 = enc.eval(&Expr::Lit(Literal::Str("x".into())), ctx).unwrap();
        assert_eq!(a.v, SmtTerm::int(1));
        assert_eq!(b.v, SmtTerm::int(2));
        assert_eq!(a2.v, a.v);
    }

    #[test]
    fn null_literal_comparison_is_unknown() {
        let (arena, schema, emp, age) = fixture();
        let mut interner = StringInterner::new();
        let mut enc = Encoder::new(&arena, &schema, &mut interner);
        enc.encode_table(emp).unwrap();
        let cmp = Expr::cmp(CmpOp::Eq, Expr::Column(age), Expr::lit_null());
        let truth = enc
            .eval_pred(&cmp, RowCtx::Single { table: emp, idx: 0 })
            .unwrap();
        // The null side forces the whole comparison's null term true.
        match truth.n {
            SmtTerm::Or(parts) => assert!(parts.contains(&SmtTerm::bool(true))),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn division_by_zero_is_null() {
        let (arena, schema, emp, _) = fixture();
        let mut interner = StringInterner::new();
        let mut enc = Encoder::new(&arena, &schema, &mut interner);
        enc.encode_table(emp).unwrap();
        let div = Expr::Arith {
            op: ArithOp::Div,
            left: Box::new(Expr::Lit(Literal::Int(4))),
            right: Box::new(Expr::Lit(Literal::Int(0))),
        };
        let v = enc
            .eval(&div, RowCtx::Single { table: emp, idx: 0 })
            .unwrap();
        match v.n {
            SmtTerm::Or(parts) => {
                assert!(parts.contains(&SmtTerm::int(0).eq(SmtTerm::int(0))))
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn is_null_never_goes_unknown() {
        let (arena, schema, emp, age) = fixture();
        let mut interner = StringInterner::new();
        let mut enc = Encoder::new(&arena, &schema, &mut interner);
        enc.encode_table(emp).unwrap();
        let pred = Expr::IsNull {
            expr: Box::new(Expr::Column(age)),
            negated: false,
        };
        let truth = enc
            .eval_pred(&pred, RowCtx::Single { table: emp, idx: 0 })
            .unwrap();
        assert_eq!(truth.n, SmtTerm::bool(false));
        let slot = arena.table(emp).slots[0];
        assert_eq!(truth.t, SmtTerm::var(null_var(slot, age)));
    }
}
