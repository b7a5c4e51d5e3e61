//! Counterexample extraction and rendering.
//!
//! A SAT model fixes every base-table cell; this module decodes those cells
//! back into SQL values (reversing the interner and day-number coercions)
//! and pairs the witness database with both queries' outputs, read off the
//! marker variables the verifier registers for each output row.

use std::fmt;

use serde::Serialize;

use relcheck_ir::{Arena, TableId};
use relcheck_smt::{null_var, val_var, Model, StringInterner};
use relcheck_sql::schema::days_to_date;
use relcheck_sql::ColumnType;

/// Survivorship marker of output row `k` of query `q` (1-based).
pub(crate) fn out_alive(q: usize, k: usize) -> String {
    format!("o{q}_r{k}")
}

/// Value marker of output cell `(k, c)` of query `q`.
pub(crate) fn out_val(q: usize, k: usize, c: usize) -> String {
    format!("o{q}_r{k}_c{c}")
}

/// NULL marker of output cell `(k, c)` of query `q`.
pub(crate) fn out_null(q: usize, k: usize, c: usize) -> String {
    format!("o{q}_r{k}_c{c}_null")
}

/// One decoded SQL value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellValue {
    Null,
    Int(i64),
    Bool(bool),
    Str(String),
    Date(String),
}

impl CellValue {
    fn decode(ty: ColumnType, null: bool, value: i64, interner: &StringInterner) -> CellValue {
        if null {
            return CellValue::Null;
        }
        match ty {
            ColumnType::Int => CellValue::Int(value),
            ColumnType::Boolean => CellValue::Bool(value != 0),
            ColumnType::Date => CellValue::Date(days_to_date(value)),
            // The model may pick a code outside the interned range (any
            // integer satisfies the constraints); those are fresh strings.
            ColumnType::Varchar => match interner.resolve(value) {
                Some(s) => CellValue::Str(s.to_string()),
                None => CellValue::Str(format!("str_{value}")),
            },
        }
    }

    /// SQL literal syntax for INSERT statements.
    fn to_sql(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Int(n) => n.to_string(),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
            CellValue::Str(s) => format!("'{}'", s.replace('\'', "''")),
            CellValue::Date(d) => format!("'{d}'"),
        }
    }
}

/// Contents of one base table in the witness database.
#[derive(Debug, Clone, Serialize)]
pub struct TableDump {
    pub name: String,
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
    pub rows: Vec<Vec<CellValue>>,
}

/// One query's output over the witness database, surviving rows only.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// A witness database on which the two queries disagree.
#[derive(Debug, Clone, Serialize)]
pub struct Counterexample {
    pub tables: Vec<TableDump>,
    pub outputs: Vec<QueryOutput>,
}

/// Decode a SAT model into a witness.
pub fn extract(
    model: &Model,
    arena: &Arena,
    interner: &StringInterner,
    roots: [TableId; 2],
) -> Counterexample {
    let tables = arena
        .base_tables()
        .map(|node| {
            let rows = node
                .slots
                .iter()
                .map(|&slot| {
                    node.attrs
                        .iter()
                        .map(|attr| {
                            let null = model.get_bool(&null_var(slot, attr.id)).unwrap_or(false);
                            let value = model.get_int(&val_var(slot, attr.id)).unwrap_or(0);
                            CellValue::decode(attr.ty, null, value, interner)
                        })
                        .collect()
                })
                .collect();
            TableDump {
                name: node.name.clone(),
                columns: node.attrs.iter().map(|a| a.short_name().to_string()).collect(),
                types: node.attrs.iter().map(|a| a.ty).collect(),
                rows,
            }
        })
        .collect();

    let outputs = roots
        .iter()
        .enumerate()
        .map(|(i, &root)| {
            let q = i + 1;
            let node = arena.table(root);
            let rows = (0..node.slots.len())
                .filter(|&k| model.get_bool(&out_alive(q, k)).unwrap_or(false))
                .map(|k| {
                    node.attrs
                        .iter()
                        .enumerate()
                        .map(|(c, attr)| {
                            let null = model.get_bool(&out_null(q, k, c)).unwrap_or(false);
                            let value = model.get_int(&out_val(q, k, c)).unwrap_or(0);
                            CellValue::decode(attr.ty, null, value, interner)
                        })
                        .collect()
                })
                .collect();
            QueryOutput {
                columns: node.attrs.iter().map(|a| a.short_name().to_string()).collect(),
                rows,
            }
        })
        .collect();

    Counterexample { tables, outputs }
}

fn type_keyword(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Int => "INT",
        ColumnType::Varchar => "VARCHAR",
        ColumnType::Date => "DATE",
        ColumnType::Boolean => "BOOLEAN",
    }
}

impl Counterexample {
    /// CREATE TABLE and INSERT statements reproducing the witness database.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!("CREATE TABLE {} (", table.name));
            for (i, (col, ty)) in table.columns.iter().zip(&table.types).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&format!("{} {}", col, type_keyword(*ty)));
            }
            out.push_str(");\n");
            for row in &table.rows {
                let values: Vec<String> = row.iter().map(CellValue::to_sql).collect();
                out.push_str(&format!(
                    "INSERT INTO {} VALUES ({});\n",
                    table.name,
                    values.join(", ")
                ));
            }
        }
        out
    }

    /// Full report: the witness database plus both queries' outputs.
    pub fn format_report(&self) -> String {
        let mut out = self.to_sql();
        for (i, output) in self.outputs.iter().enumerate() {
            out.push_str(&format!(
                "-- query {} output ({}):\n",
                i + 1,
                output.columns.join(", ")
            ));
            if output.rows.is_empty() {
                out.push_str("--   (empty)\n");
            }
            for row in &output.rows {
                let values: Vec<String> = row.iter().map(CellValue::to_sql).collect();
                out.push_str(&format!("--   ({})\n", values.join(", ")));
            }
        }
        out
    }
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_report())
    }
}
