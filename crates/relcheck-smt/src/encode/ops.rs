//! Per-operator constraint emission.
//!
//! Each materialized operator defines its output slots' DELETED flags and
//! attribute cells from its input tables. Cardinality-changing operators
//! (filter, distinct, group, set ops) keep the worst-case slot count and
//! kill the surplus through DELETED; order-changing operators (sort) thread
//! the rows through a comparator network of fresh slots.

use relcheck_ir::{
    AttrId, Attribute, Expr, GroupNode, JoinNode, JoinSide, SlotId, SortNode, TableId, TableNode,
};
use relcheck_sql::ast::AggFunc;

use super::exprs::{null_eq, RowCtx, Val};
use super::{and2, and_all, del_var, gid_var, null_var, or_any, or2, pair_var, val_var, Encoder};
use crate::errors::LowerError;
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// One position of the running sort window: either still an untouched input
/// row or the output of an earlier comparator.
#[derive(Debug, Clone, Copy)]
enum SortRow {
    Input(usize),
    Stage(SlotId),
}

impl<'a> Encoder<'a> {
    pub(crate) fn encode_base(&mut self, node: &TableNode) -> Result<(), LowerError> {
        for (idx, &slot) in node.slots.iter().enumerate() {
            self.slot_owner.entry(slot).or_insert((node.id, idx));
            self.encoding.declare_model(del_var(slot), SmtSort::Bool);
            // Base rows exist by construction; absence is modeled upstream
            // by the operators, never by the database itself.
            self.encoding.assert(SmtTerm::var(del_var(slot)).not());
            for attr in &node.attrs {
                self.encoding
                    .declare_model(val_var(slot, attr.id), SmtSort::Int);
                self.encoding
                    .declare_model(null_var(slot, attr.id), SmtSort::Bool);
                let (lo, hi) = attr.ty.domain();
                let mut bounds = Vec::new();
                if let Some(lo) = lo {
                    bounds.push(SmtTerm::var(val_var(slot, attr.id)).ge(SmtTerm::int(lo)));
                }
                if let Some(hi) = hi {
                    bounds.push(SmtTerm::var(val_var(slot, attr.id)).le(SmtTerm::int(hi)));
                }
                if !bounds.is_empty() {
                    self.encoding.assert(
                        SmtTerm::var(null_var(slot, attr.id))
                            .not()
                            .implies(and_all(bounds)),
                    );
                }
            }
        }
        Ok(())
    }

    pub(crate) fn encode_filter(
        &mut self,
        node: &TableNode,
        input: TableId,
        pred: &Expr,
    ) -> Result<(), LowerError> {
        self.encode_table(input)?;
        self.materialize(node);
        for (idx, &slot) in node.slots.iter().enumerate() {
            let ctx = RowCtx::Single { table: input, idx };
            let keep = and2(self.row_alive(input, idx), self.eval_pred(pred, ctx)?.holds());
            self.define_deleted(slot, keep);
            for attr in &node.attrs {
                let val = self.column(attr.id, ctx)?;
                self.define_cell(slot, attr.id, val);
            }
        }
        Ok(())
    }

    pub(crate) fn encode_project(
        &mut self,
        node: &TableNode,
        input: TableId,
    ) -> Result<(), LowerError> {
        self.encode_table(input)?;
        self.materialize(node);
        for (idx, &slot) in node.slots.iter().enumerate() {
            let src = self.arena.table(input).slots[idx];
            self.copy_deleted(slot, src);
            let ctx = RowCtx::Single { table: input, idx };
            for attr in &node.attrs {
                let expr = attr.expr.as_ref().ok_or_else(|| {
                    LowerError::Internal(format!(
                        "projection attribute '{}' has no derivation",
                        attr.name
                    ))
                })?;
                let val = self.eval(expr, ctx)?;
                self.define_cell(slot, attr.id, val);
            }
        }
        Ok(())
    }

    pub(crate) fn encode_distinct(
        &mut self,
        node: &TableNode,
        input: TableId,
    ) -> Result<(), LowerError> {
        self.encode_table(input)?;
        self.materialize(node);
        let attr_ids: Vec<AttrId> = node.attrs.iter().map(|a| a.id).collect();
        for (k, &slot) in node.slots.iter().enumerate() {
            let ctx = RowCtx::Single { table: input, idx: k };
            for attr in &node.attrs {
                let val = self.column(attr.id, ctx)?;
                self.define_cell(slot, attr.id, val);
            }
            // A row survives iff it is the first surviving occurrence of its
            // value among the input rows.
            let mut dup = Vec::with_capacity(k);
            for j in 0..k {
                let eq = self.rows_equal_on((input, j), (input, k), &attr_ids, &attr_ids)?;
                dup.push(and2(self.row_alive(input, j), eq));
            }
            let keep = and2(self.row_alive(input, k), or_any(dup).not());
            self.define_deleted(slot, keep);
        }
        Ok(())
    }

    pub(crate) fn encode_join(
        &mut self,
        node: &TableNode,
        join: &JoinNode,
    ) -> Result<(), LowerError> {
        self.encode_table(join.left)?;
        self.encode_table(join.right)?;
        self.materialize(node);
        let nl = self.arena.table(join.left).slots.len();
        let nr = self.arena.table(join.right).slots.len();

        for i in 0..nl {
            for j in 0..nr {
                let slot = node.slots[i * nr + j];
                let ctx = RowCtx::Pair {
                    left: (join.left, i),
                    right: (join.right, j),
                };
                let cond = match &join.cond {
                    Some(c) => self.eval_pred(c, ctx)?.holds(),
                    None => SmtTerm::bool(true),
                };
                let alive = and_all(vec![
                    self.row_alive(join.left, i),
                    self.row_alive(join.right, j),
                    cond,
                ]);
                self.define_deleted(slot, alive);
                for attr in &node.attrs {
                    let val = self.column(attr.id, ctx)?;
                    self.define_cell(slot, attr.id, val);
                }
            }
        }

        // NULL-padded companion rows: a pad survives exactly when its source
        // row does and every joined tuple it feeds is dead.
        for pad in &join.pads {
            let src_table = match pad.side {
                JoinSide::Left => join.left,
                JoinSide::Right => join.right,
            };
            let src_idx = self
                .arena
                .table(src_table)
                .slots
                .iter()
                .position(|&s| s == pad.source)
                .ok_or_else(|| {
                    LowerError::Internal(format!("pad source {} not in its table", pad.source))
                })?;
            let mut alive = vec![SmtTerm::var(del_var(pad.source)).not()];
            for &c in &pad.companions {
                alive.push(SmtTerm::var(del_var(c)));
            }
            self.define_deleted(pad.pad, and_all(alive));
            let ctx = RowCtx::Single {
                table: src_table,
                idx: src_idx,
            };
            for attr in &node.attrs {
                let merged_key = match pad.side {
                    // A merged USING/natural key lives on the left node; an
                    // unmatched right row reads it from its hidden right
                    // counterpart.
                    JoinSide::Right => join
                        .merged
                        .iter()
                        .find(|(kept, _)| *kept == attr.id)
                        .map(|&(_, hidden)| hidden),
                    JoinSide::Left => None,
                };
                if self.node_has_attr(src_table, attr.id) {
                    let val = self.column(attr.id, ctx)?;
                    self.define_cell(pad.pad, attr.id, val);
                } else if let Some(hidden) = merged_key {
                    let val = self.column(hidden, ctx)?;
                    self.define_cell(pad.pad, attr.id, val);
                } else {
                    // Opposite side of the pad: NULL, value unconstrained.
                    self.encoding
                        .assert(SmtTerm::var(null_var(pad.pad, attr.id)));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn encode_group(
        &mut self,
        node: &TableNode,
        group: &GroupNode,
    ) -> Result<(), LowerError> {
        self.encode_table(group.input)?;
        self.materialize(node);
        let n_in = self.arena.table(group.input).slots.len();
        let agg_attrs: Vec<AttrId> = group.aggs.iter().map(|a| a.attr).collect();

        if group.keys.is_empty() {
            // Scalar aggregation: one output row, always present, whose key
            // columns mirror the first surviving input row.
            let slot = node.slots[0];
            self.encoding.assert(SmtTerm::var(del_var(slot)).not());
            for attr in &node.attrs {
                if agg_attrs.contains(&attr.id) {
                    continue;
                }
                let mut acc = Val::null();
                for j in (0..n_in).rev() {
                    let alive = self.row_alive(group.input, j);
                    let cv = self.column(attr.id, RowCtx::Single { table: group.input, idx: j })?;
                    acc = Val {
                        v: SmtTerm::ite(alive.clone(), cv.v, acc.v),
                        n: SmtTerm::ite(alive, cv.n, acc.n),
                    };
                }
                self.define_cell(slot, attr.id, acc);
            }
            let members: Vec<SmtTerm> =
                (0..n_in).map(|j| self.row_alive(group.input, j)).collect();
            for agg in &group.aggs {
                self.encode_agg(slot, group.input, agg, &members)?;
            }
            return Ok(());
        }

        // Map phase: tag each input row with the index of the first
        // surviving row carrying the same key values.
        for j in 0..n_in {
            let name = gid_var(node.id, j);
            self.encoding.declare(name.clone(), SmtSort::Int);
            let mut acc = SmtTerm::int(j as i64);
            for i in (0..j).rev() {
                let same = self.keys_equal(group, i, j)?;
                let cond = and2(self.row_alive(group.input, i), same);
                acc = SmtTerm::ite(cond, SmtTerm::int(i as i64), acc);
            }
            self.encoding.assert(SmtTerm::var(name).eq(acc));
        }

        // Reduce phase: slot k carries the group whose representative is
        // input row k; non-representative slots die.
        for (k, &slot) in node.slots.iter().enumerate() {
            let representative = and2(
                self.row_alive(group.input, k),
                SmtTerm::var(gid_var(node.id, k)).eq(SmtTerm::int(k as i64)),
            );
            self.define_deleted(slot, representative);
            let ctx = RowCtx::Single {
                table: group.input,
                idx: k,
            };
            for attr in &node.attrs {
                if agg_attrs.contains(&attr.id) {
                    continue;
                }
                let val = self.column(attr.id, ctx)?;
                self.define_cell(slot, attr.id, val);
            }
            let members: Vec<SmtTerm> = (0..n_in)
                .map(|j| {
                    and2(
                        self.row_alive(group.input, j),
                        SmtTerm::var(gid_var(node.id, j)).eq(SmtTerm::int(k as i64)),
                    )
                })
                .collect();
            for agg in &group.aggs {
                self.encode_agg(slot, group.input, agg, &members)?;
            }
        }
        Ok(())
    }

    /// Fold one aggregate over the member rows of a group, defining the
    /// output slot's aggregate cell.
    fn encode_agg(
        &mut self,
        slot: SlotId,
        input: TableId,
        agg: &relcheck_ir::AggCall,
        members: &[SmtTerm],
    ) -> Result<(), LowerError> {
        let n_in = members.len();
        let mut includes = Vec::with_capacity(n_in);
        let mut args: Vec<Option<Val>> = Vec::with_capacity(n_in);
        for (j, member) in members.iter().enumerate() {
            let ctx = RowCtx::Single { table: input, idx: j };
            let mut inc = vec![member.clone()];
            if let Some(filter) = &agg.filter {
                inc.push(self.eval_pred(filter, ctx)?.holds());
            }
            let arg = match &agg.arg {
                Some(e) => {
                    let v = self.eval(e, ctx)?;
                    // NULL arguments never contribute.
                    inc.push(v.n.clone().not());
                    Some(v)
                }
                None => None,
            };
            includes.push(and_all(inc));
            args.push(arg);
        }

        if agg.distinct && agg.arg.is_some() {
            // Keep only the first contributing row of each argument value.
            let base = includes.clone();
            for j in 0..n_in {
                let mut fresh = vec![base[j].clone()];
                for j2 in 0..j {
                    let (Some(a), Some(b)) = (&args[j2], &args[j]) else {
                        continue;
                    };
                    let same = a.v.clone().eq(b.v.clone());
                    fresh.push(and2(base[j2].clone(), same).not());
                }
                includes[j] = and_all(fresh);
            }
        }

        let any = or_any(includes.clone());
        let out_v = SmtTerm::var(val_var(slot, agg.attr));
        let out_n = SmtTerm::var(null_var(slot, agg.attr));
        let arg_val = |j: usize| -> Result<SmtTerm, LowerError> {
            args[j]
                .as_ref()
                .map(|a| a.v.clone())
                .ok_or_else(|| {
                    LowerError::Internal(format!("{} requires an argument", agg.func.name()))
                })
        };

        match agg.func {
            AggFunc::Count => {
                let mut sum = SmtTerm::int(0);
                for inc in &includes {
                    sum = sum.add(SmtTerm::ite(inc.clone(), SmtTerm::int(1), SmtTerm::int(0)));
                }
                self.encoding.assert(out_v.eq(sum));
                self.encoding.assert(out_n.not());
            }
            AggFunc::Sum | AggFunc::Avg => {
                let mut sum = SmtTerm::int(0);
                let mut count = SmtTerm::int(0);
                for (j, inc) in includes.iter().enumerate() {
                    sum = sum.add(SmtTerm::ite(inc.clone(), arg_val(j)?, SmtTerm::int(0)));
                    count =
                        count.add(SmtTerm::ite(inc.clone(), SmtTerm::int(1), SmtTerm::int(0)));
                }
                let folded = if matches!(agg.func, AggFunc::Sum) {
                    sum
                } else {
                    sum.div(count)
                };
                self.encoding.assert(out_v.eq(folded));
                self.encoding.assert(out_n.eq(any.not()));
            }
            AggFunc::Min | AggFunc::Max => {
                // Bounded extremum: dominated by every contributor and
                // attained by at least one.
                let mut attained = Vec::with_capacity(n_in);
                for (j, inc) in includes.iter().enumerate() {
                    let bound = if matches!(agg.func, AggFunc::Min) {
                        out_v.clone().le(arg_val(j)?)
                    } else {
                        out_v.clone().ge(arg_val(j)?)
                    };
                    self.encoding.assert(inc.clone().implies(bound));
                    attained.push(and2(inc.clone(), out_v.clone().eq(arg_val(j)?)));
                }
                self.encoding
                    .assert(any.clone().implies(or_any(attained)));
                self.encoding.assert(out_n.eq(any.not()));
            }
            other => {
                return Err(LowerError::NotImplemented(format!(
                    "aggregate {}",
                    other.name()
                )))
            }
        }
        Ok(())
    }

    pub(crate) fn encode_sort(
        &mut self,
        node: &TableNode,
        sort: &SortNode,
    ) -> Result<(), LowerError> {
        self.encode_table(sort.input)?;
        if sort.stages.is_empty() {
            return Ok(());
        }
        let n = self.arena.table(sort.input).slots.len();
        let n_out = node.attrs.len();
        let fields: Vec<Attribute> = node
            .attrs
            .iter()
            .cloned()
            .chain(sort.key_attrs.iter().cloned())
            .collect();

        let mut cur: Vec<SortRow> = (0..n).map(SortRow::Input).collect();
        for stage in &sort.stages {
            let a = cur[stage.pos];
            let b = cur[stage.pos + 1];
            let (da, va) = self.sort_row_cells(sort, node, a, &fields)?;
            let (db, vb) = self.sort_row_cells(sort, node, b, &fields)?;

            let swap = if stage.keyed {
                // Survivors only; the compaction pass already pushed the
                // dead rows past them.
                let mut after = SmtTerm::bool(false);
                for (ki, key) in sort.keys.iter().enumerate().rev() {
                    let fi = n_out + ki;
                    let gt = key_after(&va[fi], &vb[fi], key.asc);
                    let eq = null_eq(&va[fi], &vb[fi]);
                    after = or2(gt, and2(eq, after));
                }
                and_all(vec![da.clone().not(), db.clone().not(), after])
            } else {
                and2(da.clone(), db.clone().not())
            };

            self.declare_sort_slot(stage.hi, &fields);
            self.declare_sort_slot(stage.lo, &fields);
            self.encoding.assert(
                SmtTerm::var(del_var(stage.hi))
                    .eq(SmtTerm::ite(swap.clone(), db.clone(), da.clone())),
            );
            self.encoding
                .assert(SmtTerm::var(del_var(stage.lo)).eq(SmtTerm::ite(swap.clone(), da, db)));
            for (fi, f) in fields.iter().enumerate() {
                let (av, bv) = (&va[fi], &vb[fi]);
                self.encoding.assert(SmtTerm::var(val_var(stage.hi, f.id)).eq(SmtTerm::ite(
                    swap.clone(),
                    bv.v.clone(),
                    av.v.clone(),
                )));
                self.encoding.assert(SmtTerm::var(null_var(stage.hi, f.id)).eq(
                    SmtTerm::ite(swap.clone(), bv.n.clone(), av.n.clone()),
                ));
                self.encoding.assert(SmtTerm::var(val_var(stage.lo, f.id)).eq(SmtTerm::ite(
                    swap.clone(),
                    av.v.clone(),
                    bv.v.clone(),
                )));
                self.encoding.assert(SmtTerm::var(null_var(stage.lo, f.id)).eq(
                    SmtTerm::ite(swap.clone(), av.n.clone(), bv.n.clone()),
                ));
            }
            cur[stage.pos] = SortRow::Stage(stage.hi);
            cur[stage.pos + 1] = SortRow::Stage(stage.lo);
        }

        for (idx, &slot) in node.slots.iter().enumerate() {
            self.slot_owner.entry(slot).or_insert((node.id, idx));
        }
        Ok(())
    }

    fn declare_sort_slot(&mut self, slot: SlotId, fields: &[Attribute]) {
        self.encoding.declare(del_var(slot), SmtSort::Bool);
        for f in fields {
            self.encoding.declare(val_var(slot, f.id), SmtSort::Int);
            self.encoding.declare(null_var(slot, f.id), SmtSort::Bool);
        }
    }

    fn sort_row_cells(
        &mut self,
        sort: &SortNode,
        node: &TableNode,
        row: SortRow,
        fields: &[Attribute],
    ) -> Result<(SmtTerm, Vec<Val>), LowerError> {
        match row {
            SortRow::Input(idx) => {
                let ctx = RowCtx::Single {
                    table: sort.input,
                    idx,
                };
                let deleted = SmtTerm::var(del_var(self.arena.table(sort.input).slots[idx]));
                let n_out = node.attrs.len();
                let mut vals = Vec::with_capacity(fields.len());
                for (fi, f) in fields.iter().enumerate() {
                    let v = if fi < n_out {
                        self.column(f.id, ctx)?
                    } else {
                        let expr = f.expr.as_ref().ok_or_else(|| {
                            LowerError::Internal(format!("sort key '{}' has no derivation", f.name))
                        })?;
                        self.eval(expr, ctx)?
                    };
                    vals.push(v);
                }
                Ok((deleted, vals))
            }
            SortRow::Stage(slot) => {
                let deleted = SmtTerm::var(del_var(slot));
                let vals = fields
                    .iter()
                    .map(|f| Val {
                        v: SmtTerm::var(val_var(slot, f.id)),
                        n: SmtTerm::var(null_var(slot, f.id)),
                    })
                    .collect();
                Ok((deleted, vals))
            }
        }
    }

    pub(crate) fn encode_union_all(
        &mut self,
        node: &TableNode,
        left: TableId,
        right: TableId,
    ) -> Result<(), LowerError> {
        self.encode_table(left)?;
        self.encode_table(right)?;
        self.materialize(node);
        let nl = self.arena.table(left).slots.len();
        let r_ids: Vec<AttrId> = self.arena.table(right).attrs.iter().map(|a| a.id).collect();

        for (out_idx, &slot) in node.slots.iter().enumerate() {
            let (src, src_idx) = if out_idx < nl {
                (left, out_idx)
            } else {
                (right, out_idx - nl)
            };
            self.copy_deleted(slot, self.arena.table(src).slots[src_idx]);
            let ctx = RowCtx::Single {
                table: src,
                idx: src_idx,
            };
            for (p, attr) in node.attrs.iter().enumerate() {
                // Column correspondence across the operands is positional.
                let src_attr = if out_idx < nl { attr.id } else { r_ids[p] };
                let val = self.column(src_attr, ctx)?;
                self.define_cell(slot, attr.id, val);
            }
        }
        Ok(())
    }

    pub(crate) fn encode_intersect_all(
        &mut self,
        node: &TableNode,
        left: TableId,
        right: TableId,
    ) -> Result<(), LowerError> {
        self.encode_table(left)?;
        self.encode_table(right)?;
        self.materialize(node);
        let pairs = self.encode_pairing(node, left, right)?;
        for (k, &slot) in node.slots.iter().enumerate() {
            self.define_deleted(slot, or_any(pairs[k].clone()));
            let ctx = RowCtx::Single { table: left, idx: k };
            for attr in &node.attrs {
                let val = self.column(attr.id, ctx)?;
                self.define_cell(slot, attr.id, val);
            }
        }
        Ok(())
    }

    pub(crate) fn encode_except_all(
        &mut self,
        node: &TableNode,
        left: TableId,
        right: TableId,
    ) -> Result<(), LowerError> {
        self.encode_table(left)?;
        self.encode_table(right)?;
        self.materialize(node);
        let pairs = self.encode_pairing(node, left, right)?;
        for (k, &slot) in node.slots.iter().enumerate() {
            let keep = and2(self.row_alive(left, k), or_any(pairs[k].clone()).not());
            self.define_deleted(slot, keep);
            let ctx = RowCtx::Single { table: left, idx: k };
            for attr in &node.attrs {
                let val = self.column(attr.id, ctx)?;
                self.define_cell(slot, attr.id, val);
            }
        }
        Ok(())
    }

    /// Greedy bipartite pairing of equal rows, row-major: left row `k`
    /// claims the first unclaimed equal right row. Per equal-value class
    /// this matches `min(m, n)` rows, the bag multiplicity INTERSECT ALL
    /// keeps and EXCEPT ALL removes.
    fn encode_pairing(
        &mut self,
        node: &TableNode,
        left: TableId,
        right: TableId,
    ) -> Result<Vec<Vec<SmtTerm>>, LowerError> {
        let nl = self.arena.table(left).slots.len();
        let nr = self.arena.table(right).slots.len();
        let l_ids: Vec<AttrId> = self.arena.table(left).attrs.iter().map(|a| a.id).collect();
        let r_ids: Vec<AttrId> = self.arena.table(right).attrs.iter().map(|a| a.id).collect();
        let pvars: Vec<Vec<SmtTerm>> = (0..nl)
            .map(|k| {
                (0..nr)
                    .map(|j| SmtTerm::var(pair_var(node.id, k, j)))
                    .collect()
            })
            .collect();
        for k in 0..nl {
            for j in 0..nr {
                self.encoding.declare(pair_var(node.id, k, j), SmtSort::Bool);
                let eligible = and_all(vec![
                    self.row_alive(left, k),
                    self.row_alive(right, j),
                    self.rows_equal_on((left, k), (right, j), &l_ids, &r_ids)?,
                ]);
                let earlier_right = or_any(pvars[k][..j].to_vec());
                let earlier_left = or_any((0..k).map(|k2| pvars[k2][j].clone()).collect());
                self.encoding.assert(pvars[k][j].clone().eq(and_all(vec![
                    eligible,
                    earlier_right.not(),
                    earlier_left.not(),
                ])));
            }
        }
        Ok(pvars)
    }

    /// Null-aware positional row equality between two tables' rows.
    fn rows_equal_on(
        &mut self,
        left: (TableId, usize),
        right: (TableId, usize),
        left_attrs: &[AttrId],
        right_attrs: &[AttrId],
    ) -> Result<SmtTerm, LowerError> {
        let mut eqs = Vec::with_capacity(left_attrs.len());
        for (&la, &ra) in left_attrs.iter().zip(right_attrs) {
            let lv = self.column(la, RowCtx::Single { table: left.0, idx: left.1 })?;
            let rv = self.column(ra, RowCtx::Single { table: right.0, idx: right.1 })?;
            eqs.push(null_eq(&lv, &rv));
        }
        Ok(and_all(eqs))
    }

    fn keys_equal(&mut self, group: &GroupNode, i: usize, j: usize) -> Result<SmtTerm, LowerError> {
        let mut eqs = Vec::with_capacity(group.keys.len());
        for key in &group.keys {
            let a = self.eval(key, RowCtx::Single { table: group.input, idx: i })?;
            let b = self.eval(key, RowCtx::Single { table: group.input, idx: j })?;
            eqs.push(null_eq(&a, &b));
        }
        Ok(and_all(eqs))
    }

    fn copy_deleted(&mut self, out: SlotId, src: SlotId) {
        self.encoding
            .assert(SmtTerm::var(del_var(out)).eq(SmtTerm::var(del_var(src))));
    }
}

/// Strict "a sorts after b" on one key. Ascending keys sort NULL lowest,
/// descending keys sort NULL last.
fn key_after(a: &Val, b: &Val, asc: bool) -> SmtTerm {
    if asc {
        and2(
            a.n.clone().not(),
            or2(b.n.clone(), a.v.clone().gt(b.v.clone())),
        )
    } else {
        or2(
            and2(a.n.clone(), b.n.clone().not()),
            and_all(vec![
                a.n.clone().not(),
                b.n.clone().not(),
                a.v.clone().lt(b.v.clone()),
            ]),
        )
    }
}
