//! Equivalence conclusion assembly and the refutation check.
//!
//! Both queries lower into one arena so base tables (and their tuple slots)
//! are shared; the encoded slot definitions and integrity constraints form
//! the premise, and equivalence of the two outputs forms the conclusion.
//! The solver is asked for premise AND NOT conclusion: UNSAT proves the
//! queries agree on every database within the bounds, a model is a database
//! on which they disagree.
//!
//! Bag semantics (the default) compares NULL-aware multiset cardinalities:
//! every surviving row of either output must occur equally often in both.
//! List semantics applies when both queries carry an outermost ORDER BY and
//! compares position by position; the comparator network has already
//! compacted survivors into a prefix, so positional comparison is sound.

use tracing::debug;

use relcheck_ir::{lower, Arena, TableId};
use relcheck_smt::{Encoder, SatResult, SmtSolver, SmtSort, SmtTerm};
use relcheck_sql::{IntegrityConstraint, Query, Schema};

use crate::counterexample::{extract, out_alive, out_null, out_val};
use crate::errors::VerifyError;
use crate::result::{Verdict, VerifyState};
use crate::session::Session;

/// Checks query pairs against one schema and constraint set.
pub struct Verifier<'a> {
    schema: &'a Schema,
    constraints: &'a [IntegrityConstraint],
}

impl<'a> Verifier<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Verifier {
            schema,
            constraints: &[],
        }
    }

    pub fn with_constraints(schema: &'a Schema, constraints: &'a [IntegrityConstraint]) -> Self {
        Verifier {
            schema,
            constraints,
        }
    }

    /// Decide one query pair inside its own session scope.
    ///
    /// Never panics and never leaves the scope open: every failure mode is
    /// folded into the verdict's terminal state.
    pub fn check<S: SmtSolver>(&self, session: &mut Session<S>, q1: &Query, q2: &Query) -> Verdict {
        let mark = match session.checkpoint() {
            Ok(mark) => mark,
            Err(e) => {
                return Verdict::error(VerifyState::OtherErr, format!("solver push failed: {e}"))
            }
        };
        let verdict = match self.check_scoped(session, q1, q2) {
            Ok(verdict) => verdict,
            Err(e) => Verdict::error(e.state(), e.to_string()),
        };
        match session.rollback(mark) {
            Ok(()) => verdict,
            Err(e) => Verdict::error(VerifyState::OtherErr, format!("solver pop failed: {e}")),
        }
    }

    fn check_scoped<S: SmtSolver>(
        &self,
        session: &mut Session<S>,
        q1: &Query,
        q2: &Query,
    ) -> Result<Verdict, VerifyError> {
        let mut arena = Arena::new();
        // Register every schema table up front so constraints bind even on
        // tables the queries never mention and the witness covers the whole
        // database.
        for (name, table) in &self.schema.tables {
            arena.base(name, table);
        }
        let t1 = lower(&mut arena, self.schema, q1)?;
        let t2 = lower(&mut arena, self.schema, q2)?;

        let cols1 = arena.table(t1).attrs.len();
        let cols2 = arena.table(t2).attrs.len();
        if cols1 != cols2 {
            return Ok(Verdict::incomparable(cols1, cols2));
        }
        let ordered = q1.has_outer_order_by() && q2.has_outer_order_by();
        debug!(%t1, %t2, ordered, "lowered query pair");

        let bases: Vec<TableId> = arena.base_tables().map(|node| node.id).collect();
        let mut encoder = Encoder::new(&arena, self.schema, session.interner_mut());
        for base in bases {
            encoder.encode_table(base)?;
        }
        encoder.encode_constraints(self.constraints)?;
        encoder.encode_table(t1)?;
        encoder.encode_table(t2)?;

        let conclusion = if ordered {
            list_conclusion(&mut encoder, &arena, t1, t2)?
        } else {
            bag_conclusion(&mut encoder, &arena, t1, t2)?
        };
        register_outputs(&mut encoder, &arena, 1, t1)?;
        register_outputs(&mut encoder, &arena, 2, t2)?;
        encoder.encoding_mut().assert(conclusion.not());

        let encoding = encoder.finish();
        debug!(
            declarations = encoding.declarations.len(),
            assertions = encoding.assertions.len(),
            "encoded refutation problem"
        );
        session
            .load(&encoding)
            .map_err(|e| VerifyError::Solver(e.to_string()))?;
        let watched: Vec<(&str, &SmtSort)> = encoding
            .model_vars
            .iter()
            .map(|(name, sort)| (name.as_str(), sort))
            .collect();
        let (sat, model) = session
            .solver_mut()
            .check_sat_with_model(&watched)
            .map_err(|e| VerifyError::Solver(e.to_string()))?;
        match sat {
            SatResult::Unsat => Ok(Verdict::equivalent()),
            SatResult::Sat => {
                let model = model
                    .ok_or_else(|| VerifyError::Solver("SAT answer without a model".to_string()))?;
                let witness = extract(&model, &arena, session.interner(), [t1, t2]);
                Ok(Verdict::not_equivalent(witness))
            }
            SatResult::Unknown(reason) => Ok(Verdict::undecided(reason)),
        }
    }
}

/// One-shot convenience over a fresh default session.
pub fn check_equivalence(
    schema: &Schema,
    constraints: &[IntegrityConstraint],
    q1: &Query,
    q2: &Query,
) -> Verdict {
    let verifier = Verifier::with_constraints(schema, constraints);
    let mut session = Session::new();
    verifier.check(&mut session, q1, q2)
}

/// NULL-aware cell equality: both NULL, or both non-NULL with equal values.
fn cell_eq(l: &(SmtTerm, SmtTerm), r: &(SmtTerm, SmtTerm)) -> SmtTerm {
    let both_null = SmtTerm::and(vec![l.1.clone(), r.1.clone()]);
    let both_set = SmtTerm::and(vec![
        l.1.clone().not(),
        r.1.clone().not(),
        l.0.clone().eq(r.0.clone()),
    ]);
    SmtTerm::or(vec![both_null, both_set])
}

/// All output cells of one row, collected once per row.
fn row_cells(
    encoder: &mut Encoder,
    table: TableId,
    idx: usize,
    cols: usize,
) -> Result<Vec<(SmtTerm, SmtTerm)>, VerifyError> {
    (0..cols)
        .map(|c| encoder.output_cell(table, idx, c).map_err(VerifyError::from))
        .collect()
}

/// Number of surviving rows of `table` that are NULL-aware equal to `probe`.
fn multiplicity(
    encoder: &Encoder,
    probe: &[(SmtTerm, SmtTerm)],
    rows: &[Vec<(SmtTerm, SmtTerm)>],
    table: TableId,
) -> SmtTerm {
    let mut total = SmtTerm::int(0);
    for (j, row) in rows.iter().enumerate() {
        let hit = SmtTerm::and(
            std::iter::once(encoder.row_alive(table, j))
                .chain(probe.iter().zip(row).map(|(l, r)| cell_eq(l, r)))
                .collect(),
        );
        total = total.add(SmtTerm::ite(hit, SmtTerm::int(1), SmtTerm::int(0)));
    }
    total
}

/// Bag equivalence: every surviving row of either output occurs with the
/// same multiplicity in both outputs.
fn bag_conclusion(
    encoder: &mut Encoder,
    arena: &Arena,
    t1: TableId,
    t2: TableId,
) -> Result<SmtTerm, VerifyError> {
    let cols = arena.table(t1).attrs.len();
    let n1 = arena.table(t1).slots.len();
    let n2 = arena.table(t2).slots.len();
    let rows1: Vec<Vec<(SmtTerm, SmtTerm)>> = (0..n1)
        .map(|k| row_cells(encoder, t1, k, cols))
        .collect::<Result<_, _>>()?;
    let rows2: Vec<Vec<(SmtTerm, SmtTerm)>> = (0..n2)
        .map(|k| row_cells(encoder, t2, k, cols))
        .collect::<Result<_, _>>()?;

    let mut parts = Vec::new();
    for (rows_from, t_from) in [(&rows1, t1), (&rows2, t2)] {
        for (k, probe) in rows_from.iter().enumerate() {
            let alive = encoder.row_alive(t_from, k);
            let in_first = multiplicity(encoder, probe, &rows1, t1);
            let in_second = multiplicity(encoder, probe, &rows2, t2);
            parts.push(alive.implies(in_first.eq(in_second)));
        }
    }
    Ok(SmtTerm::and(parts))
}

/// List equivalence: outputs agree position by position, including which
/// positions survive.
fn list_conclusion(
    encoder: &mut Encoder,
    arena: &Arena,
    t1: TableId,
    t2: TableId,
) -> Result<SmtTerm, VerifyError> {
    let cols = arena.table(t1).attrs.len();
    let n1 = arena.table(t1).slots.len();
    let n2 = arena.table(t2).slots.len();
    let shared = n1.min(n2);

    let mut parts = Vec::new();
    for k in 0..shared {
        let a1 = encoder.row_alive(t1, k);
        let a2 = encoder.row_alive(t2, k);
        let row1 = row_cells(encoder, t1, k, cols)?;
        let row2 = row_cells(encoder, t2, k, cols)?;
        parts.push(a1.clone().eq(a2));
        let agree = SmtTerm::and(row1.iter().zip(&row2).map(|(l, r)| cell_eq(l, r)).collect());
        parts.push(a1.implies(agree));
    }
    // A larger bound on one side may not contribute extra survivors.
    for k in shared..n1 {
        parts.push(encoder.row_alive(t1, k).not());
    }
    for k in shared..n2 {
        parts.push(encoder.row_alive(t2, k).not());
    }
    Ok(SmtTerm::and(parts))
}

/// Tie named marker variables to the output rows of one query so the model
/// fixes them for counterexample rendering.
fn register_outputs(
    encoder: &mut Encoder,
    arena: &Arena,
    q: usize,
    table: TableId,
) -> Result<(), VerifyError> {
    let cols = arena.table(table).attrs.len();
    for k in 0..arena.table(table).slots.len() {
        let alive = encoder.row_alive(table, k);
        let name = out_alive(q, k);
        encoder
            .encoding_mut()
            .declare_model(name.clone(), SmtSort::Bool);
        encoder.encoding_mut().assert(SmtTerm::var(name).eq(alive));
        for c in 0..cols {
            let (value, null) = encoder.output_cell(table, k, c)?;
            let vname = out_val(q, k, c);
            let nname = out_null(q, k, c);
            encoder
                .encoding_mut()
                .declare_model(vname.clone(), SmtSort::Int);
            encoder.encoding_mut().assert(SmtTerm::var(vname).eq(value));
            encoder
                .encoding_mut()
                .declare_model(nname.clone(), SmtSort::Bool);
            encoder.encoding_mut().assert(SmtTerm::var(nname).eq(null));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relcheck_sql::ast::{ScalarExpr, Select, SelectItem, TableRef};
    use relcheck_sql::schema::TableSchema;
    use relcheck_sql::ColumnType;

    fn schema() -> Schema {
        Schema::new().table(
            "EMP",
            TableSchema::new(2)
                .column("id", ColumnType::Int)
                .column("age", ColumnType::Int),
        )
    }

    fn select_all() -> Query {
        Query::select(Select::new(
            vec![SelectItem::Wildcard],
            Some(TableRef::named("EMP")),
        ))
    }

    #[test]
    fn identical_queries_are_equivalent() {
        let schema = schema();
        let verdict = check_equivalence(&schema, &[], &select_all(), &select_all());
        assert_eq!(verdict.state, VerifyState::Equiv);
        assert_eq!(verdict.code, 1);
    }

    #[test]
    fn column_count_mismatch_is_incomparable() {
        let schema = schema();
        let narrow = Query::select(Select::new(
            vec![SelectItem::expr(ScalarExpr::column("id"))],
            Some(TableRef::named("EMP")),
        ));
        let verdict = check_equivalence(&schema, &[], &select_all(), &narrow);
        assert_eq!(verdict.code, -1);
        assert!(verdict.counterexample.is_none());
    }

    #[test]
    fn unknown_table_reports_a_syntax_error() {
        let schema = schema();
        let bad = Query::select(Select::new(
            vec![SelectItem::Wildcard],
            Some(TableRef::named("NOPE")),
        ));
        let verdict = check_equivalence(&schema, &[], &bad, &select_all());
        assert_eq!(verdict.state, VerifyState::SynErr);
        assert_eq!(verdict.code, 0);
    }

    #[test]
    fn session_scope_survives_a_failed_check() {
        let schema = schema();
        let verifier = Verifier::new(&schema);
        let mut session = Session::new();
        let bad = Query::select(Select::new(
            vec![SelectItem::expr(ScalarExpr::column("salary"))],
            Some(TableRef::named("EMP")),
        ));
        let verdict = verifier.check(&mut session, &bad, &select_all());
        assert_eq!(verdict.state, VerifyState::SynErr);
        // The scope rolled back; the session still decides fresh pairs.
        let verdict = verifier.check(&mut session, &select_all(), &select_all());
        assert_eq!(verdict.state, VerifyState::Equiv);
    }

    #[test]
    fn cell_eq_is_null_aware() {
        let l = (SmtTerm::int(1), SmtTerm::bool(true));
        let r = (SmtTerm::int(2), SmtTerm::bool(true));
        // Two NULL cells compare equal regardless of their value terms.
        match cell_eq(&l, &r) {
            SmtTerm::Or(parts) => {
                assert_eq!(
                    parts[0],
                    SmtTerm::and(vec![SmtTerm::bool(true), SmtTerm::bool(true)])
                );
            }
            other => panic!("expected a disjunction, got {other:?}"),
        }
    }
}
