//! Clause-ordered AST-to-IR encoding.
//!
//! One query lowers to one arena table, built in SQL evaluation order:
//! WITH bindings, FROM/JOIN, WHERE, GROUP BY (with aggregates collected from
//! the SELECT list, HAVING, and ORDER BY), HAVING, then the ORDER BY /
//! DISTINCT / projection / LIMIT tail. For a non-DISTINCT SELECT the sort
//! runs before the projection so ORDER BY may reference columns the
//! projection drops; with DISTINCT the sort runs after deduplication and may
//! only use the projected output.

mod exprs;
mod from_clause;

use tracing::debug;

use relcheck_sql::ast::{Literal, OrderKey, Query, ScalarExpr, Select, SelectItem, SetExpr, SetOp};
use relcheck_sql::schema::Schema;
use relcheck_sql::ColumnType;

use crate::attribute::Attribute;
use crate::errors::EncodeError;
use crate::expr::{AggCall, Expr};
use crate::scope::Scope;
use crate::table::{Arena, TableId};

use exprs::{AggKey, ExprEnv};

/// Lower one parsed query into an arena table.
///
/// The arena is shared across both queries of a verification so that base
/// tables (and their tuple slots) are common to the two encodings.
pub fn lower(arena: &mut Arena, schema: &Schema, query: &Query) -> Result<TableId, EncodeError> {
    let mut lowerer = Lowerer { arena, schema };
    let table = match lowerer.lower_query(query, None) {
        Err(EncodeError::OuterReference(column)) => {
            return Err(EncodeError::UnknownColumn(column))
        }
        other => other?,
    };
    debug!(%table, "lowered query");
    Ok(table)
}

pub(crate) struct Lowerer<'a> {
    pub arena: &'a mut Arena,
    pub schema: &'a Schema,
}

impl Lowerer<'_> {
    pub(crate) fn lower_query(
        &mut self,
        query: &Query,
        outer: Option<&Scope<'_>>,
    ) -> Result<TableId, EncodeError> {
        let mut scope = match outer {
            Some(o) => Scope::nested(o),
            None => Scope::root(),
        };
        for cte in &query.with {
            let tid = self.lower_query(&cte.query, Some(&scope))?;
            let named = self.arena.alias(tid, &cte.name, &cte.columns)?;
            scope.ctes.insert(cte.name.clone(), named);
        }
        match &query.body {
            SetExpr::Select(select) => self.lower_select(
                select,
                &scope,
                &query.order_by,
                query.limit,
                query.offset,
            ),
            body @ SetExpr::SetOp { .. } => {
                let tid = self.lower_setexpr(body, &scope)?;
                self.finish_ordered(tid, &query.order_by, query.limit, query.offset)
            }
        }
    }

    fn lower_setexpr(&mut self, body: &SetExpr, scope: &Scope<'_>) -> Result<TableId, EncodeError> {
        match body {
            SetExpr::Select(select) => self.lower_select(select, scope, &[], None, None),
            SetExpr::SetOp {
                op,
                all,
                left,
                right,
            } => {
                let l = self.lower_setexpr(left, scope)?;
                let r = self.lower_setexpr(right, scope)?;
                let (nl, nr) = (
                    self.arena.table(l).attrs.len(),
                    self.arena.table(r).attrs.len(),
                );
                if nl != nr {
                    return Err(EncodeError::Syntax(format!(
                        "set operation arms produce {nl} and {nr} columns"
                    )));
                }
                Ok(match (*op, *all) {
                    (SetOp::Union, true) => self.arena.union_all(l, r),
                    (SetOp::Union, false) => {
                        let u = self.arena.union_all(l, r);
                        self.arena.distinct(u)
                    }
                    (SetOp::Intersect, true) => self.arena.intersect_all(l, r),
                    (SetOp::Intersect, false) => {
                        let i = self.arena.intersect_all(l, r);
                        self.arena.distinct(i)
                    }
                    (SetOp::Except, true) => self.arena.except_all(l, r),
                    // EXCEPT keeps each distinct left row not present in the
                    // right side at all, so deduplicate before subtracting.
                    (SetOp::Except, false) => {
                        let d = self.arena.distinct(l);
                        self.arena.except_all(d, r)
                    }
                })
            }
        }
    }

    fn lower_select(
        &mut self,
        select: &Select,
        scope: &Scope<'_>,
        order_by: &[OrderKey],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<TableId, EncodeError> {
        let Some(from) = &select.from else {
            return Err(EncodeError::NotSupported(
                "SELECT without a FROM clause".to_string(),
            ));
        };
        let from_tid = self.lower_from(from, scope)?;
        let mut sel_scope = scope.clone();
        sel_scope.bind(self.arena.table(from_tid).attrs.clone());

        let mut cur = from_tid;
        if let Some(pred) = &select.selection {
            let p = {
                let mut env = ExprEnv::forbid(&sel_scope, Some(cur), "WHERE");
                self.lower_scalar(pred, &mut env)?
            };
            cur = self.arena.filter(cur, p);
        }

        // Aggregates fold over the filtered input; collect them before the
        // group node is built.
        let mut aggs: Vec<(AggKey, AggCall)> = Vec::new();
        for item in &select.items {
            if let SelectItem::Expr { expr, .. } = item {
                self.collect_aggs(expr, &sel_scope, cur, &mut aggs)?;
            }
        }
        if let Some(having) = &select.having {
            self.collect_aggs(having, &sel_scope, cur, &mut aggs)?;
        }
        if !select.group_by.is_empty() || !aggs.is_empty() {
            for key in order_by {
                self.collect_aggs(&key.expr, &sel_scope, cur, &mut aggs)?;
            }
        }

        let mut keys = Vec::with_capacity(select.group_by.len());
        for key in &select.group_by {
            let target = positional_target(key, &select.items, "GROUP BY")?;
            let mut env = ExprEnv::forbid(&sel_scope, Some(cur), "GROUP BY");
            keys.push(self.lower_scalar(target, &mut env)?);
        }

        let grouped = !keys.is_empty() || !aggs.is_empty();
        if grouped {
            let calls: Vec<AggCall> = aggs.iter().map(|(_, call)| call.clone()).collect();
            cur = self.arena.group(cur, keys, calls);
        }
        if let Some(having) = &select.having {
            let p = {
                let mut env = ExprEnv::replace(&sel_scope, Some(cur), &aggs);
                self.lower_scalar(having, &mut env)?
            };
            cur = self.arena.filter(cur, p);
        }

        let items = self.lower_items(select, &sel_scope, cur, &aggs)?;

        let needs_slice = limit.is_some() || offset.unwrap_or(0) > 0;
        if !select.distinct {
            if !order_by.is_empty() {
                let sort_keys =
                    self.order_keys(order_by, select, &sel_scope, cur, &aggs, grouped)?;
                cur = self.arena.sort(cur, sort_keys);
            }
            cur = self.arena.project(cur, items);
            if needs_slice {
                if order_by.is_empty() {
                    cur = self.arena.sort(cur, Vec::new());
                }
                cur = self.arena.slice(cur, offset.unwrap_or(0), limit);
            }
            Ok(cur)
        } else {
            cur = self.arena.project(cur, items);
            cur = self.arena.distinct(cur);
            self.finish_ordered(cur, order_by, limit, offset)
        }
    }

    /// Lower the SELECT list into projection items, expanding wildcards
    /// from the in-scope attributes.
    fn lower_items(
        &mut self,
        select: &Select,
        sel_scope: &Scope<'_>,
        cur: TableId,
        aggs: &[(AggKey, AggCall)],
    ) -> Result<Vec<(String, ColumnType, Expr)>, EncodeError> {
        let mut items = Vec::new();
        for (idx, item) in select.items.iter().enumerate() {
            match item {
                SelectItem::Wildcard => {
                    for a in sel_scope.attrs() {
                        items.push((a.short_name().to_string(), a.ty, Expr::Column(a.id)));
                    }
                }
                SelectItem::QualifiedWildcard(qualifier) => {
                    let mut matched = false;
                    for a in sel_scope.attrs() {
                        if attr_in_table(a, qualifier) {
                            matched = true;
                            items.push((a.short_name().to_string(), a.ty, Expr::Column(a.id)));
                        }
                    }
                    if !matched {
                        return Err(EncodeError::UnknownTable(qualifier.clone()));
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    let lowered = {
                        let mut env = ExprEnv::replace(sel_scope, Some(cur), aggs);
                        self.lower_scalar(expr, &mut env)?
                    };
                    let name = alias.clone().unwrap_or_else(|| item_name(expr, idx));
                    let ty = self.expr_type(&lowered);
                    items.push((name, ty, lowered));
                }
            }
        }
        Ok(items)
    }

    /// ORDER BY keys for the pre-projection sort of a non-DISTINCT SELECT.
    fn order_keys(
        &mut self,
        order_by: &[OrderKey],
        select: &Select,
        sel_scope: &Scope<'_>,
        cur: TableId,
        aggs: &[(AggKey, AggCall)],
        grouped: bool,
    ) -> Result<Vec<(Expr, bool, ColumnType)>, EncodeError> {
        let mut out = Vec::with_capacity(order_by.len());
        for key in order_by {
            let target = positional_target(&key.expr, &select.items, "ORDER BY")?;
            let lowered = {
                let mut env = if grouped {
                    ExprEnv::replace(sel_scope, Some(cur), aggs)
                } else {
                    ExprEnv::forbid(sel_scope, Some(cur), "ORDER BY")
                };
                self.lower_scalar(target, &mut env)?
            };
            let ty = self.expr_type(&lowered);
            out.push((lowered, key.asc, ty));
        }
        Ok(out)
    }

    /// Apply an outermost ORDER BY / LIMIT / OFFSET against a finished
    /// table (a set operation or a DISTINCT projection), resolving keys
    /// against its output attributes only.
    fn finish_ordered(
        &mut self,
        tid: TableId,
        order_by: &[OrderKey],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<TableId, EncodeError> {
        let mut cur = tid;
        if !order_by.is_empty() {
            let attrs = self.arena.table(cur).attrs.clone();
            let mut out_scope = Scope::root();
            out_scope.bind(attrs.clone());
            let mut keys = Vec::with_capacity(order_by.len());
            for key in order_by {
                let lowered = if let ScalarExpr::Literal(Literal::Int(n)) = &key.expr {
                    let idx = positional(*n, attrs.len(), "ORDER BY")?;
                    Expr::Column(attrs[idx].id)
                } else {
                    let mut env = ExprEnv::forbid(&out_scope, None, "this ORDER BY");
                    self.lower_scalar(&key.expr, &mut env)?
                };
                let ty = self.expr_type(&lowered);
                keys.push((lowered, key.asc, ty));
            }
            cur = self.arena.sort(cur, keys);
        }
        let needs_slice = limit.is_some() || offset.unwrap_or(0) > 0;
        if needs_slice {
            if order_by.is_empty() {
                cur = self.arena.sort(cur, Vec::new());
            }
            cur = self.arena.slice(cur, offset.unwrap_or(0), limit);
        }
        Ok(cur)
    }
}

/// Resolve 1-based positional sugar and alias references in GROUP BY /
/// ORDER BY keys down to the SELECT item they designate.
fn positional_target<'q>(
    key: &'q ScalarExpr,
    items: &'q [SelectItem],
    clause: &'static str,
) -> Result<&'q ScalarExpr, EncodeError> {
    if let ScalarExpr::Literal(Literal::Int(n)) = key {
        let idx = positional(*n, items.len(), clause)?;
        return match &items[idx] {
            SelectItem::Expr { expr, .. } => Ok(expr),
            _ => Err(EncodeError::Syntax(format!(
                "{clause} position {n} refers to a wildcard item"
            ))),
        };
    }
    if let ScalarExpr::Column { table: None, name } = key {
        for item in items {
            if let SelectItem::Expr {
                expr,
                alias: Some(alias),
            } = item
            {
                if alias == name {
                    return Ok(expr);
                }
            }
        }
    }
    Ok(key)
}

fn positional(n: i64, len: usize, clause: &'static str) -> Result<usize, EncodeError> {
    if n < 1 || n as usize > len {
        return Err(EncodeError::Syntax(format!(
            "{clause} position {n} is out of range for {len} select items"
        )));
    }
    Ok(n as usize - 1)
}

fn attr_in_table(attr: &Attribute, qualifier: &str) -> bool {
    let qualifies = |full: &str| {
        full.rsplit_once('.')
            .is_some_and(|(table, _)| table == qualifier)
    };
    qualifies(&attr.name) || attr.alt_name.as_deref().is_some_and(qualifies)
}

fn item_name(expr: &ScalarExpr, idx: usize) -> String {
    match expr {
        ScalarExpr::Column { name, .. } => name.clone(),
        ScalarExpr::Aggregate { func, .. } => func.name().to_string(),
        _ => format!("col{}", idx + 1),
    }
}
