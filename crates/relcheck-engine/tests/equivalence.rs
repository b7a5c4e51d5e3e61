//! End-to-end equivalence scenarios against the real solver.

use relcheck_engine::{check_equivalence, CellValue, Session, Verifier, VerifyState};
use relcheck_sql::ast::{
    AggFunc, Join, JoinConstraint, JoinOp, Literal, OrderKey, Query, ScalarExpr, Select,
    SelectItem, SetExpr, SetOp, TableRef,
};
use relcheck_sql::constraints::parse_constraints;
use relcheck_sql::schema::TableSchema;
use relcheck_sql::{ColumnType, Schema};

fn schema() -> Schema {
    Schema::new()
        .table(
            "EMP",
            TableSchema::new(2)
                .column("id", ColumnType::Int)
                .column("age", ColumnType::Int)
                .column("dept", ColumnType::Int),
        )
        .table(
            "DEPT",
            TableSchema::new(2)
                .column("id", ColumnType::Int)
                .column("head", ColumnType::Int),
        )
}

fn emp_where(pred: ScalarExpr) -> Query {
    let mut select = Select::new(vec![SelectItem::Wildcard], Some(TableRef::named("EMP")));
    select.selection = Some(pred);
    Query::select(select)
}

fn emp_ids() -> Query {
    Query::select(Select::new(
        vec![SelectItem::expr(ScalarExpr::column("id"))],
        Some(TableRef::named("EMP")),
    ))
}

#[test]
fn negation_pushes_through_a_comparison() {
    let q1 = emp_where(ScalarExpr::column("age").gt(ScalarExpr::int(25)).not());
    let q2 = emp_where(ScalarExpr::column("age").le(ScalarExpr::int(25)));
    let verdict = check_equivalence(&schema(), &[], &q1, &q2);
    assert_eq!(verdict.state, VerifyState::Equiv);
    assert_eq!(verdict.code, 1);
}

fn emp_dept_join(op: JoinOp) -> Query {
    let join = TableRef::Join(Box::new(Join {
        left: TableRef::aliased("EMP", "E"),
        right: TableRef::aliased("DEPT", "D"),
        op,
        constraint: JoinConstraint::On(
            ScalarExpr::qualified("E", "dept").eq(ScalarExpr::qualified("D", "id")),
        ),
    }));
    Query::select(Select::new(
        vec![
            SelectItem::expr(ScalarExpr::qualified("E", "id")),
            SelectItem::expr(ScalarExpr::qualified("D", "head")),
        ],
        Some(join),
    ))
}

#[test]
fn outer_join_sides_are_not_interchangeable() {
    let verdict = check_equivalence(
        &schema(),
        &[],
        &emp_dept_join(JoinOp::Left),
        &emp_dept_join(JoinOp::Right),
    );
    assert_eq!(verdict.state, VerifyState::NonEquiv);
    assert_eq!(verdict.code, 0);

    let witness = verdict.counterexample.expect("SAT verdict carries a witness");
    assert_eq!(witness.outputs.len(), 2);
    let sql = witness.to_sql();
    assert!(sql.contains("CREATE TABLE EMP (id INT, age INT, dept INT);"));
    assert!(sql.contains("CREATE TABLE DEPT (id INT, head INT);"));
    assert!(sql.contains("INSERT INTO EMP VALUES ("));
    // The two outputs must actually differ on the witness database.
    assert_ne!(witness.outputs[0].rows, witness.outputs[1].rows);
}

fn emp_dept_keyed(op: JoinOp, constraint: JoinConstraint) -> Query {
    let join = TableRef::Join(Box::new(Join {
        left: TableRef::named("EMP"),
        right: TableRef::named("DEPT"),
        op,
        constraint,
    }));
    Query::select(Select::new(
        vec![
            SelectItem::expr(ScalarExpr::column("id")),
            SelectItem::expr(ScalarExpr::column("head")),
        ],
        Some(join),
    ))
}

#[test]
fn right_join_using_key_is_never_null_for_unmatched_rows() {
    let join = TableRef::Join(Box::new(Join {
        left: TableRef::named("EMP"),
        right: TableRef::named("DEPT"),
        op: JoinOp::Right,
        constraint: JoinConstraint::Using(vec!["id".to_string()]),
    }));
    let mut null_keys = Select::new(
        vec![SelectItem::expr(ScalarExpr::column("id"))],
        Some(join),
    );
    // The USING key of an unmatched DEPT row is DEPT's own id, so with a
    // non-null DEPT.id no output row can carry a NULL key.
    null_keys.selection = Some(ScalarExpr::IsNull {
        expr: Box::new(ScalarExpr::column("id")),
        negated: false,
    });
    let mut empty = Select::new(
        vec![SelectItem::expr(ScalarExpr::column("id"))],
        Some(TableRef::named("DEPT")),
    );
    empty.selection = Some(ScalarExpr::Literal(Literal::Bool(false)));

    let constraints = parse_constraints(&serde_json::json!([{ "not_null": "DEPT__id" }]))
        .expect("constraint DSL parses");
    let verdict = check_equivalence(
        &schema(),
        &constraints,
        &Query::select(null_keys),
        &Query::select(empty),
    );
    assert_eq!(verdict.state, VerifyState::Equiv);
}

#[test]
fn natural_join_matches_the_explicit_using_form() {
    // EMP and DEPT share exactly one column name, so NATURAL degenerates to
    // USING (id) in every join flavor including the padded ones.
    for op in [JoinOp::Inner, JoinOp::Right, JoinOp::Full] {
        let natural = emp_dept_keyed(op, JoinConstraint::Natural);
        let using = emp_dept_keyed(op, JoinConstraint::Using(vec!["id".to_string()]));
        let verdict = check_equivalence(&schema(), &[], &natural, &using);
        assert_eq!(verdict.state, VerifyState::Equiv, "join flavor {op:?}");
    }
}

#[test]
fn having_on_a_group_key_moves_into_where() {
    let mut q1 = Select::new(
        vec![
            SelectItem::expr(ScalarExpr::column("dept")),
            SelectItem::expr(ScalarExpr::count_star()),
        ],
        Some(TableRef::named("EMP")),
    );
    q1.group_by = vec![ScalarExpr::column("dept")];
    q1.having = Some(ScalarExpr::column("dept").gt(ScalarExpr::int(0)));

    let mut q2 = Select::new(
        vec![
            SelectItem::expr(ScalarExpr::column("dept")),
            SelectItem::expr(ScalarExpr::count_star()),
        ],
        Some(TableRef::named("EMP")),
    );
    q2.selection = Some(ScalarExpr::column("dept").gt(ScalarExpr::int(0)));
    q2.group_by = vec![ScalarExpr::column("dept")];

    let verdict = check_equivalence(&schema(), &[], &Query::select(q1), &Query::select(q2));
    assert_eq!(verdict.state, VerifyState::Equiv);
}

#[test]
fn except_all_of_a_query_with_itself_is_empty() {
    fn id_select() -> SetExpr {
        SetExpr::Select(Box::new(Select::new(
            vec![SelectItem::expr(ScalarExpr::column("id"))],
            Some(TableRef::named("EMP")),
        )))
    }
    let q1 = Query {
        with: Vec::new(),
        body: SetExpr::SetOp {
            op: SetOp::Except,
            all: true,
            left: Box::new(id_select()),
            right: Box::new(id_select()),
        },
        order_by: Vec::new(),
        limit: None,
        offset: None,
    };
    let mut empty = Select::new(
        vec![SelectItem::expr(ScalarExpr::column("id"))],
        Some(TableRef::named("EMP")),
    );
    empty.selection = Some(ScalarExpr::Literal(Literal::Bool(false)));
    let verdict = check_equivalence(&schema(), &[], &q1, &Query::select(empty));
    assert_eq!(verdict.state, VerifyState::Equiv);
}

#[test]
fn stddev_is_rejected_as_unsupported() {
    let q = Query::select(Select::new(
        vec![SelectItem::expr(ScalarExpr::agg(
            AggFunc::StddevPop,
            ScalarExpr::column("age"),
        ))],
        Some(TableRef::named("EMP")),
    ));
    let verdict = check_equivalence(&schema(), &[], &q, &emp_ids());
    assert_eq!(verdict.state, VerifyState::NotSupErr);
    assert_eq!(verdict.code, 0);
}

#[test]
fn order_direction_matters_under_list_semantics() {
    let mut asc = emp_ids();
    asc.order_by.push(OrderKey::asc(ScalarExpr::column("id")));
    let mut desc = emp_ids();
    desc.order_by.push(OrderKey::desc(ScalarExpr::column("id")));

    let verdict = check_equivalence(&schema(), &[], &asc, &desc);
    assert_eq!(verdict.state, VerifyState::NonEquiv);

    let mut asc_again = emp_ids();
    asc_again
        .order_by
        .push(OrderKey::asc(ScalarExpr::column("id")));
    let verdict = check_equivalence(&schema(), &[], &asc, &asc_again);
    assert_eq!(verdict.state, VerifyState::Equiv);
}

#[test]
fn a_single_order_by_still_compares_as_a_bag() {
    let mut ordered = emp_ids();
    ordered.order_by.push(OrderKey::asc(ScalarExpr::column("id")));
    let verdict = check_equivalence(&schema(), &[], &ordered, &emp_ids());
    assert_eq!(verdict.state, VerifyState::Equiv);
}

#[test]
fn tautological_filter_needs_the_not_null_fact() {
    let q1 = emp_where(
        ScalarExpr::column("age")
            .gt(ScalarExpr::int(25))
            .or(ScalarExpr::column("age").le(ScalarExpr::int(25))),
    );
    let q2 = Query::select(Select::new(
        vec![SelectItem::Wildcard],
        Some(TableRef::named("EMP")),
    ));

    let verdict = check_equivalence(&schema(), &[], &q1, &q2);
    assert_eq!(verdict.state, VerifyState::NonEquiv);
    // The disagreement hinges on a NULL age cell in the witness.
    let witness = verdict.counterexample.expect("witness");
    let emp = witness
        .tables
        .iter()
        .find(|t| t.name == "EMP")
        .expect("EMP dump");
    let age = emp.columns.iter().position(|c| c == "age").expect("age");
    assert!(emp.rows.iter().any(|row| row[age] == CellValue::Null));

    let constraints = parse_constraints(&serde_json::json!([{ "not_null": "EMP__age" }]))
        .expect("constraint DSL parses");
    let verdict = check_equivalence(&schema(), &constraints, &q1, &q2);
    assert_eq!(verdict.state, VerifyState::Equiv);
}

#[test]
fn primary_key_makes_distinct_redundant() {
    let mut distinct = Select::new(
        vec![SelectItem::expr(ScalarExpr::column("id"))],
        Some(TableRef::named("EMP")),
    );
    distinct.distinct = true;
    let q1 = Query::select(distinct);
    let q2 = emp_ids();

    let verdict = check_equivalence(&schema(), &[], &q1, &q2);
    assert_eq!(verdict.state, VerifyState::NonEquiv);

    let constraints = parse_constraints(&serde_json::json!([{ "primary": ["EMP__id"] }]))
        .expect("constraint DSL parses");
    let verdict = check_equivalence(&schema(), &constraints, &q1, &q2);
    assert_eq!(verdict.state, VerifyState::Equiv);
}

#[test]
fn one_session_decides_many_pairs() {
    let schema = schema();
    let verifier = Verifier::new(&schema);
    let mut session = Session::new();

    let verdict = verifier.check(&mut session, &emp_ids(), &emp_ids());
    assert_eq!(verdict.state, VerifyState::Equiv);

    let narrowed = emp_where(ScalarExpr::column("age").gt(ScalarExpr::int(0)));
    let wide = emp_where(ScalarExpr::Literal(Literal::Bool(true)));
    let verdict = verifier.check(&mut session, &narrowed, &wide);
    assert_eq!(verdict.state, VerifyState::NonEquiv);

    let verdict = verifier.check(&mut session, &emp_ids(), &emp_ids());
    assert_eq!(verdict.state, VerifyState::Equiv);
}
