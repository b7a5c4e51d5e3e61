//! IR-to-SMT lowering.
//!
//! Every tuple slot of a materialized table contributes one boolean DELETED
//! flag plus one `(Int value, Bool null)` pair per attribute; the operator
//! of the table contributes assertions defining those variables from the
//! input tables' variables. View operators (alias, rename, slice) share
//! their input's slots and contribute nothing; reads through them chase the
//! attribute derivations instead.
//!
//! Variable naming is positional and stable: slot/attribute ids are global
//! across the arena, so `d17`, `v17_a4`, `n17_a4` identify one cell of one
//! tuple regardless of which table reads it. The counterexample extractor
//! relies on these names to pull base-table contents out of a model.

mod exprs;
mod facts;
mod ops;

use std::collections::{HashMap, HashSet};

use tracing::trace;

use relcheck_ir::{Arena, AttrId, Attribute, SlotId, TableId, TableOp};
use relcheck_sql::Schema;

use crate::errors::LowerError;
use crate::interner::StringInterner;
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

pub(crate) use exprs::{RowCtx, Val};

/// DELETED flag of a tuple slot.
pub fn del_var(slot: SlotId) -> String {
    format!("d{}", slot.0)
}

/// Value variable of one attribute cell.
pub fn val_var(slot: SlotId, attr: AttrId) -> String {
    format!("v{}_a{}", slot.0, attr.0)
}

/// NULL flag of one attribute cell.
pub fn null_var(slot: SlotId, attr: AttrId) -> String {
    format!("n{}_a{}", slot.0, attr.0)
}

/// Group id of input slot `j` feeding a group-by table.
fn gid_var(table: TableId, j: usize) -> String {
    format!("g{}_{}", table.0, j)
}

/// Pairing flag of INTERSECT/EXCEPT ALL: left row `k` claims right row `j`.
fn pair_var(table: TableId, k: usize, j: usize) -> String {
    format!("p{}_{}_{}", table.0, k, j)
}

pub(crate) fn and2(a: SmtTerm, b: SmtTerm) -> SmtTerm {
    SmtTerm::and(vec![a, b])
}

pub(crate) fn or2(a: SmtTerm, b: SmtTerm) -> SmtTerm {
    SmtTerm::or(vec![a, b])
}

pub(crate) fn and_all(terms: Vec<SmtTerm>) -> SmtTerm {
    if terms.is_empty() {
        SmtTerm::bool(true)
    } else {
        SmtTerm::and(terms)
    }
}

pub(crate) fn or_any(terms: Vec<SmtTerm>) -> SmtTerm {
    if terms.is_empty() {
        SmtTerm::bool(false)
    } else {
        SmtTerm::or(terms)
    }
}

/// Accumulated declarations and assertions of one verification problem.
///
/// `model_vars` lists the variables worth extracting from a SAT model: the
/// base-table cells plus any output markers the verifier registers.
#[derive(Debug, Default)]
pub struct EquivEncoding {
    pub declarations: Vec<(String, SmtSort)>,
    pub assertions: Vec<SmtTerm>,
    pub model_vars: Vec<(String, SmtSort)>,
    declared: HashSet<String>,
}

impl EquivEncoding {
    pub fn new() -> Self {
        EquivEncoding::default()
    }

    pub fn declare(&mut self, name: String, sort: SmtSort) {
        if self.declared.insert(name.clone()) {
            self.declarations.push((name, sort));
        }
    }

    /// Declare and register for model extraction.
    pub fn declare_model(&mut self, name: String, sort: SmtSort) {
        if self.declared.insert(name.clone()) {
            self.declarations.push((name.clone(), sort.clone()));
            self.model_vars.push((name, sort));
        }
    }

    pub fn assert(&mut self, term: SmtTerm) {
        self.assertions.push(term);
    }
}

/// Bottom-up encoder over one lowered arena.
///
/// `encode_table` is memoized; base tables shared by both queries (and by
/// subquery instances) are encoded once, which is what makes the two query
/// encodings range over the same database.
pub struct Encoder<'a> {
    pub(crate) arena: &'a Arena,
    pub(crate) schema: &'a Schema,
    pub(crate) interner: &'a mut StringInterner,
    pub(crate) encoding: EquivEncoding,
    encoded: HashSet<TableId>,
    /// Slot -> (materialized owner, position). Resolves captured outer-row
    /// references and pad sources without walking the tree.
    pub(crate) slot_owner: HashMap<SlotId, (TableId, usize)>,
    /// Every attribute ever bound on any node, for derivation fallback when
    /// a referenced attribute is not on the table under evaluation.
    attr_index: HashMap<AttrId, Attribute>,
}

impl<'a> Encoder<'a> {
    pub fn new(arena: &'a Arena, schema: &'a Schema, interner: &'a mut StringInterner) -> Self {
        let mut attr_index = HashMap::new();
        for node in arena.tables() {
            for attr in &node.attrs {
                attr_index.entry(attr.id).or_insert_with(|| attr.clone());
            }
            if let TableOp::Sort(sort) = &node.op {
                for attr in &sort.key_attrs {
                    attr_index.entry(attr.id).or_insert_with(|| attr.clone());
                }
            }
        }
        Encoder {
            arena,
            schema,
            interner,
            encoding: EquivEncoding::new(),
            encoded: HashSet::new(),
            slot_owner: HashMap::new(),
            attr_index,
        }
    }

    /// Emit the defining constraints of `id` and everything it reads from.
    pub fn encode_table(&mut self, id: TableId) -> Result<(), LowerError> {
        if !self.encoded.insert(id) {
            return Ok(());
        }
        let node = self.arena.table(id);
        trace!(%id, name = %node.name, slots = node.slots.len(), "encoding table node");
        match &node.op {
            TableOp::Base { .. } => self.encode_base(node),
            TableOp::Empty => Ok(()),
            TableOp::Alias { input } | TableOp::Rename { input } | TableOp::Slice { input } => {
                self.encode_table(*input)
            }
            TableOp::Filter { input, pred } => self.encode_filter(node, *input, pred),
            TableOp::Join(join) => self.encode_join(node, join),
            TableOp::Project { input } => self.encode_project(node, *input),
            TableOp::Distinct { input } => self.encode_distinct(node, *input),
            TableOp::Group(group) => self.encode_group(node, group),
            TableOp::Sort(sort) => self.encode_sort(node, sort),
            TableOp::UnionAll { left, right } => self.encode_union_all(node, *left, *right),
            TableOp::IntersectAll { left, right } => {
                self.encode_intersect_all(node, *left, *right)
            }
            TableOp::ExceptAll { left, right } => self.encode_except_all(node, *left, *right),
        }
    }

    /// Survivorship of row `idx` of `table`. Valid for any node whose slots
    /// are (transitively) materialized, which after `encode_table` is all of
    /// them.
    pub fn row_alive(&self, table: TableId, idx: usize) -> SmtTerm {
        let node = self.arena.table(table);
        SmtTerm::var(del_var(node.slots[idx])).not()
    }

    /// `(value, null)` terms of output column `col` of row `idx`.
    pub fn output_cell(
        &mut self,
        table: TableId,
        idx: usize,
        col: usize,
    ) -> Result<(SmtTerm, SmtTerm), LowerError> {
        let node = self.arena.table(table);
        let attr = node
            .attrs
            .get(col)
            .ok_or_else(|| {
                LowerError::Internal(format!("table {table} has no output column {col}"))
            })?
            .id;
        let val = self.column(attr, RowCtx::Single { table, idx })?;
        Ok((val.v, val.n))
    }

    pub fn encoding(&self) -> &EquivEncoding {
        &self.encoding
    }

    pub fn encoding_mut(&mut self) -> &mut EquivEncoding {
        &mut self.encoding
    }

    pub fn finish(self) -> EquivEncoding {
        self.encoding
    }

    pub(crate) fn node_has_attr(&self, table: TableId, attr: AttrId) -> bool {
        self.arena.table(table).attrs.iter().any(|a| a.id == attr)
    }

    pub(crate) fn attr_fallback(&self, attr: AttrId) -> Option<Attribute> {
        self.attr_index.get(&attr).cloned()
    }

    /// Declare the slot variables of a materialized node and claim slot
    /// ownership for outer-reference resolution.
    pub(crate) fn materialize(&mut self, node: &relcheck_ir::TableNode) {
        for (idx, &slot) in node.slots.iter().enumerate() {
            self.slot_owner.entry(slot).or_insert((node.id, idx));
            self.encoding.declare(del_var(slot), SmtSort::Bool);
            for attr in &node.attrs {
                self.encoding.declare(val_var(slot, attr.id), SmtSort::Int);
                self.encoding.declare(null_var(slot, attr.id), SmtSort::Bool);
            }
        }
    }

    pub(crate) fn define_deleted(&mut self, slot: SlotId, alive: SmtTerm) {
        self.encoding
            .assert(SmtTerm::var(del_var(slot)).eq(alive.not()));
    }

    pub(crate) fn define_cell(&mut self, slot: SlotId, attr: AttrId, val: Val) {
        self.encoding
            .assert(SmtTerm::var(val_var(slot, attr)).eq(val.v));
        self.encoding
            .assert(SmtTerm::var(null_var(slot, attr)).eq(val.n));
    }
}
