//! Integrity-constraint assertions over the base tables.
//!
//! Constraints narrow the space of databases both queries range over; they
//! are asserted once per session, against the shared base-table cells, so a
//! counterexample is always a legal database.

use relcheck_ir::{AttrId, TableNode};
use relcheck_sql::constraints::{CmpOp, ColumnRef, IntegrityConstraint, Operand};
use relcheck_sql::SchemaError;

use super::exprs::Val;
use super::{and2, and_all, null_var, or_any, val_var, Encoder};
use crate::errors::LowerError;
use crate::terms::SmtTerm;

fn cmp_term(op: CmpOp, l: SmtTerm, r: SmtTerm) -> SmtTerm {
    match op {
        CmpOp::Eq => l.eq(r),
        CmpOp::Ne => l.eq(r).not(),
        CmpOp::Lt => l.lt(r),
        CmpOp::Le => l.le(r),
        CmpOp::Gt => l.gt(r),
        CmpOp::Ge => l.ge(r),
    }
}

impl<'a> Encoder<'a> {
    /// Assert every declared integrity constraint.
    pub fn encode_constraints(
        &mut self,
        constraints: &[IntegrityConstraint],
    ) -> Result<(), LowerError> {
        for c in constraints {
            match c {
                IntegrityConstraint::PrimaryKey { columns } => self.primary_key(columns)?,
                IntegrityConstraint::ForeignKey { column, references } => {
                    self.foreign_key(column, references)?
                }
                IntegrityConstraint::Between { column, low, high } => {
                    self.between(column, low, high)?
                }
                IntegrityConstraint::InValues { column, values } => {
                    self.in_values(column, values)?
                }
                IntegrityConstraint::NotNull { column } => self.not_null(column)?,
                IntegrityConstraint::Comparison { op, left, right } => {
                    self.comparison(*op, left, right)?
                }
                IntegrityConstraint::Increasing { column } => self.increasing(column)?,
            }
        }
        Ok(())
    }

    fn base_node(&self, name: &str) -> Result<&'a TableNode, LowerError> {
        let arena = self.arena;
        arena
            .base_tables()
            .find(|t| t.name == name)
            .ok_or_else(|| LowerError::Schema(SchemaError::UnknownTable(name.to_string())))
    }

    fn base_column(&self, cr: &ColumnRef) -> Result<(&'a TableNode, AttrId), LowerError> {
        let node = self.base_node(&cr.table)?;
        let attr = node
            .attrs
            .iter()
            .find(|a| a.short_name() == cr.column)
            .ok_or_else(|| {
                LowerError::Schema(SchemaError::UnknownColumn(format!(
                    "{}.{}",
                    cr.table, cr.column
                )))
            })?;
        Ok((node, attr.id))
    }

    /// Constant or same-row column operand of the slot under assertion.
    fn operand_cell(
        &mut self,
        op: &Operand,
        node: &TableNode,
        idx: usize,
    ) -> Result<Val, LowerError> {
        match op {
            Operand::Int(n) => Ok(Val {
                v: SmtTerm::int(*n),
                n: SmtTerm::bool(false),
            }),
            Operand::Str(s) => Ok(Val {
                v: SmtTerm::int(self.interner.intern(s)),
                n: SmtTerm::bool(false),
            }),
            Operand::Column(cr) => {
                if cr.table != node.name {
                    return Err(LowerError::BadConstraint(format!(
                        "operand column {cr} does not live in table {}",
                        node.name
                    )));
                }
                let (_, attr) = self.base_column(cr)?;
                let slot = node.slots[idx];
                Ok(Val {
                    v: SmtTerm::var(val_var(slot, attr)),
                    n: SmtTerm::var(null_var(slot, attr)),
                })
            }
        }
    }

    fn primary_key(&mut self, columns: &[ColumnRef]) -> Result<(), LowerError> {
        let cols = columns
            .iter()
            .map(|c| self.base_column(c))
            .collect::<Result<Vec<_>, _>>()?;
        let Some((node, _)) = cols.first() else {
            return Err(LowerError::BadConstraint("empty primary key".to_string()));
        };
        let node = *node;
        if cols.iter().any(|(n, _)| n.id != node.id) {
            return Err(LowerError::BadConstraint(
                "primary key spans multiple tables".to_string(),
            ));
        }
        self.encode_table(node.id)?;
        for &slot in &node.slots {
            for (_, attr) in &cols {
                self.encoding
                    .assert(SmtTerm::var(null_var(slot, *attr)).not());
            }
        }
        for (i, &si) in node.slots.iter().enumerate() {
            for &sj in node.slots.iter().skip(i + 1) {
                let eqs = cols
                    .iter()
                    .map(|(_, a)| {
                        SmtTerm::var(val_var(si, *a)).eq(SmtTerm::var(val_var(sj, *a)))
                    })
                    .collect();
                self.encoding.assert(and_all(eqs).not());
            }
        }
        Ok(())
    }

    fn foreign_key(&mut self, column: &ColumnRef, references: &ColumnRef) -> Result<(), LowerError> {
        let (child, ca) = self.base_column(column)?;
        let (parent, pa) = self.base_column(references)?;
        self.encode_table(child.id)?;
        self.encode_table(parent.id)?;
        for &cs in &child.slots {
            let targets = parent
                .slots
                .iter()
                .map(|&ps| {
                    and2(
                        SmtTerm::var(null_var(ps, pa)).not(),
                        SmtTerm::var(val_var(cs, ca)).eq(SmtTerm::var(val_var(ps, pa))),
                    )
                })
                .collect();
            self.encoding.assert(
                SmtTerm::var(null_var(cs, ca))
                    .not()
                    .implies(or_any(targets)),
            );
        }
        Ok(())
    }

    fn between(
        &mut self,
        column: &ColumnRef,
        low: &Operand,
        high: &Operand,
    ) -> Result<(), LowerError> {
        let (node, attr) = self.base_column(column)?;
        self.encode_table(node.id)?;
        for (idx, &slot) in node.slots.iter().enumerate() {
            let lo = self.operand_cell(low, node, idx)?;
            let hi = self.operand_cell(high, node, idx)?;
            let guard = and_all(vec![
                SmtTerm::var(null_var(slot, attr)).not(),
                lo.n.not(),
                hi.n.not(),
            ]);
            let v = SmtTerm::var(val_var(slot, attr));
            self.encoding
                .assert(guard.implies(and2(v.clone().ge(lo.v), v.le(hi.v))));
        }
        Ok(())
    }

    fn in_values(&mut self, column: &ColumnRef, values: &[Operand]) -> Result<(), LowerError> {
        let (node, attr) = self.base_column(column)?;
        self.encode_table(node.id)?;
        for (idx, &slot) in node.slots.iter().enumerate() {
            let mut options = Vec::with_capacity(values.len());
            for value in values {
                let cell = self.operand_cell(value, node, idx)?;
                options.push(and2(
                    cell.n.not(),
                    SmtTerm::var(val_var(slot, attr)).eq(cell.v),
                ));
            }
            self.encoding.assert(
                SmtTerm::var(null_var(slot, attr))
                    .not()
                    .implies(or_any(options)),
            );
        }
        Ok(())
    }

    fn not_null(&mut self, column: &ColumnRef) -> Result<(), LowerError> {
        let (node, attr) = self.base_column(column)?;
        self.encode_table(node.id)?;
        for &slot in &node.slots {
            self.encoding
                .assert(SmtTerm::var(null_var(slot, attr)).not());
        }
        Ok(())
    }

    fn comparison(&mut self, op: CmpOp, left: &Operand, right: &Operand) -> Result<(), LowerError> {
        let anchor = [left, right].into_iter().find_map(|o| match o {
            Operand::Column(cr) => Some(cr.clone()),
            _ => None,
        });
        match anchor {
            None => {
                // Constant comparison: holds globally or contradicts the
                // whole problem; assert it once and let the solver decide.
                let l = self.operand_const(left)?;
                let r = self.operand_const(right)?;
                self.encoding.assert(cmp_term(op, l, r));
                Ok(())
            }
            Some(cr) => {
                let node = self.base_node(&cr.table)?;
                self.encode_table(node.id)?;
                for idx in 0..node.slots.len() {
                    let l = self.operand_cell(left, node, idx)?;
                    let r = self.operand_cell(right, node, idx)?;
                    let guard = and2(l.n.not(), r.n.not());
                    self.encoding.assert(guard.implies(cmp_term(op, l.v, r.v)));
                }
                Ok(())
            }
        }
    }

    fn operand_const(&mut self, op: &Operand) -> Result<SmtTerm, LowerError> {
        match op {
            Operand::Int(n) => Ok(SmtTerm::int(*n)),
            Operand::Str(s) => Ok(SmtTerm::int(self.interner.intern(s))),
            Operand::Column(cr) => Err(LowerError::Internal(format!(
                "column operand {cr} in constant comparison"
            ))),
        }
    }

    fn increasing(&mut self, column: &ColumnRef) -> Result<(), LowerError> {
        let (node, attr) = self.base_column(column)?;
        self.encode_table(node.id)?;
        for pair in node.slots.windows(2) {
            let guard = and2(
                SmtTerm::var(null_var(pair[0], attr)).not(),
                SmtTerm::var(null_var(pair[1], attr)).not(),
            );
            self.encoding.assert(guard.implies(
                SmtTerm::var(val_var(pair[0], attr)).lt(SmtTerm::var(val_var(pair[1], attr))),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relcheck_ir::Arena;
    use relcheck_sql::constraints::parse_constraints;
    use relcheck_sql::schema::TableSchema;
    use relcheck_sql::{ColumnType, Schema};
    use serde_json::json;

    use crate::interner::StringInterner;

    fn setup() -> (Arena, Schema) {
        let schema = Schema::new()
            .table(
                "EMP",
                TableSchema::new(2)
                    .column("id", ColumnType::Int)
                    .column("dept_id", ColumnType::Int),
            )
            .table("DEPT", TableSchema::new(2).column("id", ColumnType::Int));
        let mut arena = Arena::new();
        arena.base("EMP", schema.lookup("EMP").unwrap());
        arena.base("DEPT", schema.lookup("DEPT").unwrap());
        (arena, schema)
    }

    fn assert_constraints(
        doc: serde_json::Value,
    ) -> Result<super::super::EquivEncoding, LowerError> {
        let (arena, schema) = setup();
        let constraints = parse_constraints(&doc).map_err(LowerError::Schema)?;
        let mut interner = StringInterner::new();
        let mut encoder = Encoder::new(&arena, &schema, &mut interner);
        encoder.encode_constraints(&constraints)?;
        Ok(encoder.finish())
    }

    #[test]
    fn primary_key_forces_non_null_and_distinct() {
        let enc = assert_constraints(json!([{"primary": ["EMP__id"]}])).unwrap();
        let (arena, _) = setup();
        let emp = arena.base_tables().find(|t| t.name == "EMP").unwrap();
        let id = emp.attrs[0].id;
        for &slot in &emp.slots {
            assert!(enc
                .assertions
                .contains(&SmtTerm::var(null_var(slot, id)).not()));
        }
        // One pairwise distinctness assertion for the 2-slot bound.
        let distinct = SmtTerm::and(vec![SmtTerm::var(val_var(emp.slots[0], id))
            .eq(SmtTerm::var(val_var(emp.slots[1], id)))])
        .not();
        assert!(enc.assertions.contains(&distinct));
    }

    #[test]
    fn foreign_key_requires_a_parent_match() {
        let enc =
            assert_constraints(json!([{"foreign": ["EMP__dept_id", "DEPT__id"]}])).unwrap();
        // One membership implication per child slot, on top of the base
        // facts of both tables (2 liveness assertions each).
        let implications = enc
            .assertions
            .iter()
            .filter(|a| matches!(a, SmtTerm::Implies(..)))
            .count();
        assert_eq!(implications, 2);
    }

    #[test]
    fn cross_table_comparison_is_rejected() {
        let err = assert_constraints(json!([{"gt": ["EMP__id", "DEPT__id"]}])).unwrap_err();
        assert!(matches!(err, LowerError::BadConstraint(_)));
    }

    #[test]
    fn unknown_columns_are_schema_errors() {
        let err = assert_constraints(json!([{"not_null": "EMP__salary"}])).unwrap_err();
        assert!(matches!(err, LowerError::Schema(_)));
    }

    #[test]
    fn in_values_interns_string_options() {
        let (arena, schema) = setup();
        let constraints =
            parse_constraints(&json!([{"in": ["EMP__id", ["sales", "eng"]]}])).unwrap();
        let mut interner = StringInterner::new();
        let mut encoder = Encoder::new(&arena, &schema, &mut interner);
        encoder.encode_constraints(&constraints).unwrap();
        drop(encoder);
        assert_eq!(interner.len(), 2);
        assert_eq!(interner.resolve(1), Some("sales"));
    }

    #[test]
    fn increasing_orders_consecutive_slots() {
        let enc = assert_constraints(json!([{"inc": "EMP__id"}])).unwrap();
        let (arena, _) = setup();
        let emp = arena.base_tables().find(|t| t.name == "EMP").unwrap();
        let id = emp.attrs[0].id;
        let guard = SmtTerm::and(vec![
            SmtTerm::var(null_var(emp.slots[0], id)).not(),
            SmtTerm::var(null_var(emp.slots[1], id)).not(),
        ]);
        let expected = guard.implies(
            SmtTerm::var(val_var(emp.slots[0], id)).lt(SmtTerm::var(val_var(emp.slots[1], id))),
        );
        assert!(enc.assertions.contains(&expected));
    }
}
