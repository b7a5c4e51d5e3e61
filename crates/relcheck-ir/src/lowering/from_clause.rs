//! FROM-clause and join lowering.
//!
//! Named references resolve WITH bindings before base tables. Joins are
//! classified structurally: a non-cross join without an ON/USING/NATURAL
//! constraint has no sound encoding and is rejected rather than guessed at.
//! USING and NATURAL joins hide the duplicated key attribute of the right
//! side, remembering its qualified name as a secondary lookup alias on the
//! surviving left attribute.

use relcheck_sql::ast::{Join, JoinConstraint, JoinOp, Literal, TableRef};

use crate::attribute::{AttrId, Attribute};
use crate::errors::EncodeError;
use crate::expr::{CmpOp, Expr};
use crate::scope::Scope;
use crate::table::{JoinKind, TableId};

use super::exprs::ExprEnv;
use super::Lowerer;

impl Lowerer<'_> {
    pub(crate) fn lower_from(
        &mut self,
        table_ref: &TableRef,
        scope: &Scope<'_>,
    ) -> Result<TableId, EncodeError> {
        match table_ref {
            TableRef::Named { name, alias } => {
                let src = match scope.cte(name) {
                    Some(tid) => tid,
                    None => {
                        let table_schema = self.schema.lookup(name)?;
                        self.arena.base(name, table_schema)
                    }
                };
                match alias {
                    Some(a) => self.arena.alias(src, a, &[]),
                    None => Ok(src),
                }
            }
            TableRef::Subquery {
                query,
                alias,
                columns,
            } => {
                // LATERAL is not modeled, so a FROM subquery must close over
                // nothing outside itself.
                let tid = match self.lower_query(query, Some(scope)) {
                    Err(EncodeError::OuterReference(column)) => {
                        return Err(EncodeError::Correlated(format!(
                            "FROM subquery references outer column '{column}'"
                        )))
                    }
                    other => other?,
                };
                self.arena.alias(tid, alias, columns)
            }
            TableRef::Join(join) => self.lower_join(join, scope),
        }
    }

    fn lower_join(&mut self, join: &Join, scope: &Scope<'_>) -> Result<TableId, EncodeError> {
        let left = self.lower_from(&join.left, scope)?;
        let right = self.lower_from(&join.right, scope)?;
        let kind = match join.op {
            JoinOp::Cross => JoinKind::Cross,
            JoinOp::Inner => JoinKind::Inner,
            JoinOp::Left => JoinKind::LeftOuter,
            JoinOp::Right => JoinKind::RightOuter,
            JoinOp::Full => JoinKind::FullOuter,
        };

        match &join.constraint {
            JoinConstraint::None => {
                if !matches!(join.op, JoinOp::Cross) {
                    return Err(EncodeError::NotImplemented(format!(
                        "{:?} join without an ON/USING/NATURAL constraint",
                        join.op
                    )));
                }
                Ok(self.arena.join(left, right, JoinKind::Cross, None, &[], &[]))
            }
            JoinConstraint::On(cond) => {
                let mut on_scope = scope.clone();
                let mut attrs = self.arena.table(left).attrs.clone();
                attrs.extend(self.arena.table(right).attrs.iter().cloned());
                on_scope.bind(attrs);
                let mut env = ExprEnv::forbid(&on_scope, None, "a join condition");
                let lowered = self.lower_scalar(cond, &mut env)?;
                Ok(self.arena.join(left, right, kind, Some(lowered), &[], &[]))
            }
            JoinConstraint::Using(columns) => {
                if columns.is_empty() {
                    return Err(EncodeError::Syntax(
                        "USING clause with no columns".to_string(),
                    ));
                }
                self.keyed_join(left, right, kind, columns)
            }
            JoinConstraint::Natural => {
                let columns = self.common_columns(left, right);
                if columns.is_empty() {
                    // No shared columns: NATURAL degenerates to a product
                    // where every pair matches.
                    let cond = Expr::Lit(Literal::Bool(true));
                    return Ok(self.arena.join(left, right, kind, Some(cond), &[], &[]));
                }
                self.keyed_join(left, right, kind, &columns)
            }
        }
    }

    /// Build a USING/NATURAL join: equate each named key across the two
    /// sides, hide the right copy, alias the left copy under the right
    /// copy's qualified name.
    fn keyed_join(
        &mut self,
        left: TableId,
        right: TableId,
        kind: JoinKind,
        columns: &[String],
    ) -> Result<TableId, EncodeError> {
        let mut cond: Option<Expr> = None;
        let mut hidden = Vec::with_capacity(columns.len());
        let mut alt_names = Vec::with_capacity(columns.len());
        for column in columns {
            let l = self.key_attr(left, column)?;
            let r = self.key_attr(right, column)?;
            let eq = Expr::cmp(CmpOp::Eq, Expr::Column(l.id), Expr::Column(r.id));
            cond = Some(match cond {
                Some(acc) => acc.and(eq),
                None => eq,
            });
            hidden.push(r.id);
            alt_names.push((l.id, r.name));
        }
        Ok(self
            .arena
            .join(left, right, kind, cond, &hidden, &alt_names))
    }

    /// Resolve a join-key column on one side; the key must be unambiguous
    /// within that side.
    fn key_attr(&self, side: TableId, column: &str) -> Result<KeyAttr, EncodeError> {
        let mut hits = self
            .arena
            .table(side)
            .attrs
            .iter()
            .filter(|a| a.matches(None, column));
        let Some(first) = hits.next() else {
            return Err(EncodeError::UnknownColumn(column.to_string()));
        };
        if hits.next().is_some() {
            return Err(EncodeError::Syntax(format!(
                "join key '{column}' is ambiguous"
            )));
        }
        Ok(KeyAttr {
            id: first.id,
            name: first.name.clone(),
        })
    }

    /// Column names shared by both sides, in left-side order.
    fn common_columns(&self, left: TableId, right: TableId) -> Vec<String> {
        let right_names: Vec<&str> = self
            .arena
            .table(right)
            .attrs
            .iter()
            .map(Attribute::short_name)
            .collect();
        self.arena
            .table(left)
            .attrs
            .iter()
            .map(Attribute::short_name)
            .filter(|n| right_names.contains(n))
            .map(str::to_string)
            .collect()
    }
}

struct KeyAttr {
    id: AttrId,
    name: String,
}
