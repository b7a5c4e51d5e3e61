//! Arena-allocated relational IR.
//!
//! Tables, tuple slots, and attributes are addressed by integer ids. A table
//! is an ordered, fixed-length sequence of tuple slots sharing one attribute
//! list; operators that logically drop rows (filter, distinct, group, set
//! ops) still allocate the worst-case number of slots and mark absent rows
//! through their DELETED predicate during SMT lowering. "Detaching" a
//! subtree for a correlated call site means allocating fresh arena nodes,
//! never deep-copying an object graph.

use std::collections::HashMap;

use relcheck_sql::schema::TableSchema;
use relcheck_sql::ColumnType;

use crate::attribute::{AttrId, Attribute};
use crate::expr::{AggCall, Expr};

/// Index of a table node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

/// Globally unique tuple-slot identity. The SMT lowering derives every
/// solver symbol name from this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Cross,
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

/// Mutex bookkeeping for one NULL-padded companion tuple of an outer join:
/// the padded slot and the joined tuples it is mutually exclusive with. The
/// padded slot survives exactly when its source row survives and every
/// companion is dead.
#[derive(Debug, Clone)]
pub struct PadGroup {
    pub pad: SlotId,
    pub source: SlotId,
    pub side: JoinSide,
    pub companions: Vec<SlotId>,
}

#[derive(Debug, Clone)]
pub struct JoinNode {
    pub left: TableId,
    pub right: TableId,
    pub kind: JoinKind,
    /// ON/USING/natural-overlap condition; `None` for plain products.
    pub cond: Option<Expr>,
    pub pads: Vec<PadGroup>,
    /// USING/natural key merges: (surviving left attribute, hidden right
    /// counterpart). An unmatched right row surfaces its own key value
    /// through the merged column, never NULL.
    pub merged: Vec<(AttrId, AttrId)>,
}

/// Two-phase GROUP BY: the map phase tags each input slot with a group id,
/// the reduce phase emits one candidate output slot per input slot index.
#[derive(Debug, Clone)]
pub struct GroupNode {
    pub input: TableId,
    /// Grouping keys, evaluated per member slot. Empty for scalar
    /// aggregation (aggregates without GROUP BY), which always produces
    /// exactly one output row.
    pub keys: Vec<Expr>,
    pub aggs: Vec<AggCall>,
}

#[derive(Debug, Clone, Copy)]
pub struct SortKey {
    /// Derived attribute carrying the key value through the network.
    pub attr: AttrId,
    pub asc: bool,
}

/// One adjacent comparator of the sort network: compares positions
/// `pos`/`pos + 1` of the running row and emits two fresh slots.
#[derive(Debug, Clone, Copy)]
pub struct SortStage {
    pub pos: usize,
    /// False during the deleted-compaction pass, true during the keyed pass.
    pub keyed: bool,
    pub hi: SlotId,
    pub lo: SlotId,
}

/// Bubble-sort comparator network over the bounded slot window.
///
/// Pass 1 relocates deleted slots to the tail (stable); pass 2 orders the
/// survivors by the keys, NULL sorting lowest for ascending keys. A node
/// with no keys runs only the compaction pass, which is what LIMIT/OFFSET
/// without ORDER BY needs before slicing.
#[derive(Debug, Clone)]
pub struct SortNode {
    pub input: TableId,
    pub keys: Vec<SortKey>,
    /// Derived attributes (one per key) whose values ride along with every
    /// swap; hidden from the output attribute list.
    pub key_attrs: Vec<Attribute>,
    pub stages: Vec<SortStage>,
}

/// The closed catalog of relational operators.
#[derive(Debug, Clone)]
pub enum TableOp {
    /// A declared base table; its slots exist by construction.
    Base { table: String },
    /// Zero slots.
    Empty,
    /// AS-alias: shares the input's slots, remaps attribute identities to a
    /// new table-qualified name (fresh ids deriving from the originals).
    Alias { input: TableId },
    /// Pure rename ("fake projection"): shares slots and attribute ids,
    /// changes display names only.
    Rename { input: TableId },
    Filter { input: TableId, pred: Expr },
    Join(JoinNode),
    /// Attribute list carries the projected expressions.
    Project { input: TableId },
    Distinct { input: TableId },
    Group(GroupNode),
    Sort(SortNode),
    /// LIMIT/OFFSET over a compacted input: a sub-range view of the input's
    /// slots, no constraints of its own.
    Slice { input: TableId },
    UnionAll { left: TableId, right: TableId },
    IntersectAll { left: TableId, right: TableId },
    ExceptAll { left: TableId, right: TableId },
}

/// One table node: operator, slots, attributes, and a display name kept for
/// provenance and counterexample rendering only.
#[derive(Debug, Clone)]
pub struct TableNode {
    pub id: TableId,
    pub name: String,
    pub op: TableOp,
    pub slots: Vec<SlotId>,
    pub attrs: Vec<Attribute>,
}

/// Arena of IR nodes for one verification session. Base tables are cached by
/// name so that every occurrence of a table in either query shares the same
/// tuple slots.
#[derive(Debug, Default)]
pub struct Arena {
    tables: Vec<TableNode>,
    next_slot: u32,
    next_attr: u32,
    base_cache: HashMap<String, TableId>,
    attr_types: HashMap<AttrId, ColumnType>,
}

impl Arena {
    pub fn new() -> Self {
        Arena::default()
    }

    pub fn table(&self, id: TableId) -> &TableNode {
        &self.tables[id.0 as usize]
    }

    /// Declared type of any attribute ever registered on a table node.
    pub fn attr_type(&self, id: AttrId) -> Option<ColumnType> {
        self.attr_types.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableNode> {
        self.tables.iter()
    }

    pub fn base_tables(&self) -> impl Iterator<Item = &TableNode> {
        self.tables
            .iter()
            .filter(|t| matches!(t.op, TableOp::Base { .. }))
    }

    pub fn fresh_attr_id(&mut self) -> AttrId {
        let id = AttrId(self.next_attr);
        self.next_attr += 1;
        id
    }

    fn alloc_slot(&mut self) -> SlotId {
        let id = SlotId(self.next_slot);
        self.next_slot += 1;
        id
    }

    fn alloc_slots(&mut self, n: usize) -> Vec<SlotId> {
        (0..n).map(|_| self.alloc_slot()).collect()
    }

    fn push(
        &mut self,
        name: String,
        op: TableOp,
        slots: Vec<SlotId>,
        attrs: Vec<Attribute>,
    ) -> TableId {
        let id = TableId(self.tables.len() as u32);
        for a in &attrs {
            self.attr_types.insert(a.id, a.ty);
        }
        self.tables.push(TableNode {
            id,
            name,
            op,
            slots,
            attrs,
        });
        id
    }

    /// Base table with `bound` slots, cached by name.
    pub fn base(&mut self, name: &str, schema: &TableSchema) -> TableId {
        if let Some(&id) = self.base_cache.get(name) {
            return id;
        }
        let slots = self.alloc_slots(schema.bound);
        let attrs = schema
            .columns
            .iter()
            .map(|(col, &ty)| {
                let id = self.fresh_attr_id();
                Attribute::column(id, format!("{name}.{col}"), ty)
            })
            .collect();
        let id = self.push(
            name.to_string(),
            TableOp::Base {
                table: name.to_string(),
            },
            slots,
            attrs,
        );
        self.base_cache.insert(name.to_string(), id);
        id
    }

    pub fn empty(&mut self, attrs: Vec<Attribute>) -> TableId {
        self.push("empty".to_string(), TableOp::Empty, Vec::new(), attrs)
    }

    /// AS-alias over `input`: same slots, fresh attribute identities whose
    /// derivations point at the originals. `columns`, when non-empty,
    /// renames positionally and must match the source attribute count.
    pub fn alias(
        &mut self,
        input: TableId,
        alias: &str,
        columns: &[String],
    ) -> Result<TableId, crate::errors::EncodeError> {
        let node = self.table(input);
        if !columns.is_empty() && columns.len() != node.attrs.len() {
            return Err(crate::errors::EncodeError::Syntax(format!(
                "alias '{alias}' declares {} columns but the source has {}",
                columns.len(),
                node.attrs.len()
            )));
        }
        let slots = node.slots.clone();
        let source: Vec<(AttrId, ColumnType, String)> = node
            .attrs
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let short = columns
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| a.short_name().to_string());
                (a.id, a.ty, short)
            })
            .collect();
        let attrs = source
            .into_iter()
            .map(|(orig, ty, short)| {
                let id = self.fresh_attr_id();
                Attribute::derived(id, format!("{alias}.{short}"), ty, Expr::Column(orig))
            })
            .collect();
        Ok(self.push(
            alias.to_string(),
            TableOp::Alias { input },
            slots,
            attrs,
        ))
    }

    /// Pure rename: same slots and attribute ids, new display names.
    pub fn rename(&mut self, input: TableId, name: &str, attrs: Vec<Attribute>) -> TableId {
        let slots = self.table(input).slots.clone();
        self.push(name.to_string(), TableOp::Rename { input }, slots, attrs)
    }

    pub fn filter(&mut self, input: TableId, pred: Expr) -> TableId {
        let node = self.table(input);
        let attrs = node.attrs.clone();
        let n = node.slots.len();
        let slots = self.alloc_slots(n);
        self.push("filter".to_string(), TableOp::Filter { input, pred }, slots, attrs)
    }

    /// Join over the bounded cartesian product of the inputs' slots.
    ///
    /// Output slot layout: pair slots row-major (`|L| * |R|`), then the
    /// NULL-padded companion rows for left/full variants, then for
    /// right/full variants. `hidden` names right-side attributes excluded
    /// from the output (USING/natural key duplicates); `alt_names` installs
    /// their names as secondary aliases on the surviving left attribute.
    /// `hidden[i]` is the right-side duplicate of `alt_names[i].0`.
    pub fn join(
        &mut self,
        left: TableId,
        right: TableId,
        kind: JoinKind,
        cond: Option<Expr>,
        hidden: &[AttrId],
        alt_names: &[(AttrId, String)],
    ) -> TableId {
        let (l_slots, mut attrs) = {
            let l = self.table(left);
            (l.slots.clone(), l.attrs.clone())
        };
        let (r_slots, r_attrs) = {
            let r = self.table(right);
            (r.slots.clone(), r.attrs.clone())
        };
        for a in &mut attrs {
            if let Some((_, alt)) = alt_names.iter().find(|(id, _)| *id == a.id) {
                a.alt_name = Some(alt.clone());
            }
        }
        attrs.extend(r_attrs.into_iter().filter(|a| !hidden.contains(&a.id)));

        let nl = l_slots.len();
        let nr = r_slots.len();
        let mut slots = self.alloc_slots(nl * nr);
        let mut pads = Vec::new();

        if matches!(kind, JoinKind::LeftOuter | JoinKind::FullOuter) {
            for (i, &src) in l_slots.iter().enumerate() {
                let pad = self.alloc_slot();
                let companions = (0..nr).map(|j| slots[i * nr + j]).collect();
                pads.push(PadGroup {
                    pad,
                    source: src,
                    side: JoinSide::Left,
                    companions,
                });
                slots.push(pad);
            }
        }
        if matches!(kind, JoinKind::RightOuter | JoinKind::FullOuter) {
            for (j, &src) in r_slots.iter().enumerate() {
                let pad = self.alloc_slot();
                let companions = (0..nl).map(|i| slots[i * nr + j]).collect();
                pads.push(PadGroup {
                    pad,
                    source: src,
                    side: JoinSide::Right,
                    companions,
                });
                slots.push(pad);
            }
        }

        let merged = alt_names
            .iter()
            .map(|(kept, _)| *kept)
            .zip(hidden.iter().copied())
            .collect();
        self.push(
            "join".to_string(),
            TableOp::Join(JoinNode {
                left,
                right,
                kind,
                cond,
                pads,
                merged,
            }),
            slots,
            attrs,
        )
    }

    /// Projection; `items` are (display name, type, expression) triples.
    pub fn project(&mut self, input: TableId, items: Vec<(String, ColumnType, Expr)>) -> TableId {
        let n = self.table(input).slots.len();
        let slots = self.alloc_slots(n);
        let attrs = items
            .into_iter()
            .map(|(name, ty, expr)| {
                let id = self.fresh_attr_id();
                Attribute::derived(id, name, ty, expr)
            })
            .collect();
        self.push("project".to_string(), TableOp::Project { input }, slots, attrs)
    }

    pub fn distinct(&mut self, input: TableId) -> TableId {
        let node = self.table(input);
        let attrs = node.attrs.clone();
        let n = node.slots.len();
        let slots = self.alloc_slots(n);
        self.push("distinct".to_string(), TableOp::Distinct { input }, slots, attrs)
    }

    /// Two-phase group-by. Output attributes are the input attributes
    /// (representative-valued) followed by one attribute per aggregate.
    /// Scalar aggregation (no keys) allocates exactly one output slot.
    pub fn group(&mut self, input: TableId, keys: Vec<Expr>, aggs: Vec<AggCall>) -> TableId {
        let node = self.table(input);
        let mut attrs = node.attrs.clone();
        let n = if keys.is_empty() { 1 } else { node.slots.len() };
        for agg in &aggs {
            attrs.push(Attribute::column(
                agg.attr,
                agg.func.name().to_string(),
                ColumnType::Int,
            ));
        }
        let slots = self.alloc_slots(n);
        self.push(
            "group".to_string(),
            TableOp::Group(GroupNode { input, keys, aggs }),
            slots,
            attrs,
        )
    }

    /// Sort network; `keys` are (expression, ascending, type) triples
    /// evaluated over the input. With no keys only the compaction pass is
    /// emitted.
    pub fn sort(&mut self, input: TableId, keys: Vec<(Expr, bool, ColumnType)>) -> TableId {
        let node = self.table(input);
        let attrs = node.attrs.clone();
        let input_slots = node.slots.clone();
        let n = input_slots.len();

        let mut sort_keys = Vec::with_capacity(keys.len());
        let mut key_attrs = Vec::with_capacity(keys.len());
        for (k, (expr, asc, ty)) in keys.into_iter().enumerate() {
            let id = self.fresh_attr_id();
            self.attr_types.insert(id, ty);
            key_attrs.push(Attribute::derived(id, format!("sortkey{k}"), ty, expr));
            sort_keys.push(SortKey { attr: id, asc });
        }

        let mut stages = Vec::new();
        let mut cur = input_slots;
        let passes: &[bool] = if sort_keys.is_empty() {
            &[false]
        } else {
            &[false, true]
        };
        for &keyed in passes {
            for sweep in 0..n.saturating_sub(1) {
                for pos in 0..n - 1 - sweep {
                    let hi = self.alloc_slot();
                    let lo = self.alloc_slot();
                    stages.push(SortStage { pos, keyed, hi, lo });
                    cur[pos] = hi;
                    cur[pos + 1] = lo;
                }
            }
        }

        self.push(
            "sort".to_string(),
            TableOp::Sort(SortNode {
                input,
                keys: sort_keys,
                key_attrs,
                stages,
            }),
            cur,
            attrs,
        )
    }

    /// LIMIT/OFFSET view over a compacted input: slots are shared, so the
    /// node contributes no constraints of its own.
    pub fn slice(&mut self, input: TableId, offset: u64, limit: Option<u64>) -> TableId {
        let node = self.table(input);
        let attrs = node.attrs.clone();
        let n = node.slots.len();
        let start = (offset as usize).min(n);
        let end = match limit {
            Some(k) => (start + k as usize).min(n),
            None => n,
        };
        let slots = node.slots[start..end].to_vec();
        self.push("slice".to_string(), TableOp::Slice { input }, slots, attrs)
    }

    /// Bag union: fresh output slots copying the left rows then the right
    /// rows, with the left attribute identities.
    pub fn union_all(&mut self, left: TableId, right: TableId) -> TableId {
        let attrs = self.table(left).attrs.clone();
        let n = self.table(left).slots.len() + self.table(right).slots.len();
        let slots = self.alloc_slots(n);
        self.push(
            "union_all".to_string(),
            TableOp::UnionAll { left, right },
            slots,
            attrs,
        )
    }

    pub fn intersect_all(&mut self, left: TableId, right: TableId) -> TableId {
        let attrs = self.table(left).attrs.clone();
        let n = self.table(left).slots.len();
        let slots = self.alloc_slots(n);
        self.push(
            "intersect_all".to_string(),
            TableOp::IntersectAll { left, right },
            slots,
            attrs,
        )
    }

    pub fn except_all(&mut self, left: TableId, right: TableId) -> TableId {
        let attrs = self.table(left).attrs.clone();
        let n = self.table(left).slots.len();
        let slots = self.alloc_slots(n);
        self.push(
            "except_all".to_string(),
            TableOp::ExceptAll { left, right },
            slots,
            attrs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relcheck_sql::schema::TableSchema;

    fn emp_schema() -> TableSchema {
        TableSchema::new(2)
            .column("id", ColumnType::Int)
            .column("age", ColumnType::Int)
    }

    #[test]
    fn base_tables_are_cached_by_name() {
        let mut arena = Arena::new();
        let a = arena.base("EMP", &emp_schema());
        let b = arena.base("EMP", &emp_schema());
        assert_eq!(a, b);
        assert_eq!(arena.table(a).slots.len(), 2);
        assert_eq!(arena.table(a).attrs.len(), 2);
    }

    #[test]
    fn alias_shares_slots_and_remaps_identities() {
        let mut arena = Arena::new();
        let base = arena.base("EMP", &emp_schema());
        let aliased = arena.alias(base, "E", &[]).unwrap();
        assert_eq!(arena.table(aliased).slots, arena.table(base).slots);
        let orig = arena.table(base).attrs[0].id;
        let remapped = &arena.table(aliased).attrs[0];
        assert_ne!(remapped.id, orig);
        assert_eq!(remapped.name, "E.id");
        assert_eq!(remapped.expr, Some(Expr::Column(orig)));
    }

    #[test]
    fn alias_column_count_mismatch_is_syntax_error() {
        let mut arena = Arena::new();
        let base = arena.base("EMP", &emp_schema());
        let err = arena.alias(base, "E", &["only_one".to_string()]).unwrap_err();
        assert!(err.to_string().contains("declares 1 columns"));
    }

    #[test]
    fn left_outer_join_slot_layout_and_mutex_groups() {
        let mut arena = Arena::new();
        let l = arena.base("EMP", &emp_schema());
        let r = arena.base("DEPT", &TableSchema::new(3).column("id", ColumnType::Int));
        let j = arena.join(l, r, JoinKind::LeftOuter, None, &[], &[]);
        let node = arena.table(j);
        // 2*3 pairs + 2 left pads.
        assert_eq!(node.slots.len(), 8);
        let TableOp::Join(join) = &node.op else {
            panic!("expected join");
        };
        assert_eq!(join.pads.len(), 2);
        for (i, pad) in join.pads.iter().enumerate() {
            assert_eq!(pad.side, JoinSide::Left);
            assert_eq!(pad.companions.len(), 3);
            assert_eq!(pad.companions, node.slots[i * 3..i * 3 + 3].to_vec());
        }
    }

    #[test]
    fn full_outer_join_pads_both_sides() {
        let mut arena = Arena::new();
        let l = arena.base("A", &TableSchema::new(2).column("x", ColumnType::Int));
        let r = arena.base("B", &TableSchema::new(2).column("y", ColumnType::Int));
        let j = arena.join(l, r, JoinKind::FullOuter, None, &[], &[]);
        let node = arena.table(j);
        assert_eq!(node.slots.len(), 2 * 2 + 2 + 2);
        let TableOp::Join(join) = &node.op else {
            panic!("expected join");
        };
        assert_eq!(
            join.pads.iter().filter(|p| p.side == JoinSide::Left).count(),
            2
        );
        assert_eq!(
            join.pads.iter().filter(|p| p.side == JoinSide::Right).count(),
            2
        );
    }

    #[test]
    fn join_hides_using_duplicates_and_installs_alt_names() {
        let mut arena = Arena::new();
        let l = arena.base("EMP", &emp_schema());
        let r = arena.base("E2", &emp_schema());
        let l_id = arena.table(l).attrs[0].id;
        let r_id = arena.table(r).attrs[0].id;
        let j = arena.join(
            l,
            r,
            JoinKind::Inner,
            None,
            &[r_id],
            &[(l_id, "E2.id".to_string())],
        );
        let node = arena.table(j);
        // 2 left attrs + 1 right attr (the duplicate id hidden).
        assert_eq!(node.attrs.len(), 3);
        assert_eq!(node.attrs[0].alt_name.as_deref(), Some("E2.id"));
        let TableOp::Join(join) = &node.op else {
            panic!("expected join");
        };
        assert_eq!(join.merged, vec![(l_id, r_id)]);
    }

    #[test]
    fn sort_network_shape() {
        let mut arena = Arena::new();
        let base = arena.base("EMP", &TableSchema::new(3).column("age", ColumnType::Int));
        let age = arena.table(base).attrs[0].id;
        let sorted = arena.sort(base, vec![(Expr::Column(age), true, ColumnType::Int)]);
        let node = arena.table(sorted);
        let TableOp::Sort(sort) = &node.op else {
            panic!("expected sort");
        };
        // Two passes of a 3-wide bubble network: 2 * (2 + 1) comparators.
        assert_eq!(sort.stages.len(), 6);
        assert!(sort.stages[..3].iter().all(|s| !s.keyed));
        assert!(sort.stages[3..].iter().all(|s| s.keyed));
        assert_eq!(node.slots.len(), 3);
        // Final row is made of the freshest comparator outputs.
        let last = &sort.stages[5];
        assert_eq!(node.slots[last.pos], last.hi);
        assert_eq!(node.slots[last.pos + 1], last.lo);
    }

    #[test]
    fn compaction_only_sort_has_single_pass() {
        let mut arena = Arena::new();
        let base = arena.base("EMP", &emp_schema());
        let sorted = arena.sort(base, vec![]);
        let TableOp::Sort(sort) = &arena.table(sorted).op else {
            panic!("expected sort");
        };
        assert!(sort.stages.iter().all(|s| !s.keyed));
        assert_eq!(sort.stages.len(), 1);
    }

    #[test]
    fn slice_is_a_shared_slot_view() {
        let mut arena = Arena::new();
        let base = arena.base("EMP", &TableSchema::new(4).column("id", ColumnType::Int));
        let sorted = arena.sort(base, vec![]);
        let sliced = arena.slice(sorted, 1, Some(2));
        let sorted_slots = arena.table(sorted).slots.clone();
        assert_eq!(arena.table(sliced).slots, sorted_slots[1..3].to_vec());
    }

    #[test]
    fn slice_clamps_to_available_slots() {
        let mut arena = Arena::new();
        let base = arena.base("EMP", &emp_schema());
        let sliced = arena.slice(base, 5, Some(10));
        assert!(arena.table(sliced).slots.is_empty());
    }

    #[test]
    fn scalar_group_has_one_slot() {
        let mut arena = Arena::new();
        let base = arena.base("EMP", &emp_schema());
        let grouped = arena.group(base, vec![], vec![]);
        assert_eq!(arena.table(grouped).slots.len(), 1);
    }
}
