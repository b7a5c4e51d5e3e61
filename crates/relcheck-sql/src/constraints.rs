//! Integrity-constraint DSL.
//!
//! Constraints arrive as a JSON-like list, each entry a single-key object
//! whose key names the constraint kind and whose payload references columns
//! as `TABLE__COLUMN`:
//!
//! ```json
//! [
//!   {"primary": ["EMP__id"]},
//!   {"foreign": ["EMP__dept_id", "DEPT__id"]},
//!   {"between": ["EMP__age", 0, 120]},
//!   {"in": ["DEPT__name", ["sales", "eng"]]},
//!   {"not_null": "EMP__name"},
//!   {"gt": ["EMP__age", 18]},
//!   {"inc": "EMP__id"}
//! ]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SchemaError;

/// A `TABLE__COLUMN` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn parse(raw: &str) -> Result<Self, SchemaError> {
        let (table, column) = raw
            .split_once("__")
            .ok_or_else(|| SchemaError::BadColumnRef(raw.to_string()))?;
        if table.is_empty() || column.is_empty() {
            return Err(SchemaError::BadColumnRef(raw.to_string()));
        }
        Ok(ColumnRef {
            table: table.to_string(),
            column: column.to_string(),
        })
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}__{}", self.table, self.column)
    }
}

/// Comparison operator usable in a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "eq" => Some(CmpOp::Eq),
            "ne" => Some(CmpOp::Ne),
            "lt" => Some(CmpOp::Lt),
            "le" => Some(CmpOp::Le),
            "gt" => Some(CmpOp::Gt),
            "ge" => Some(CmpOp::Ge),
            _ => None,
        }
    }
}

/// Either a column reference or an integer constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    Column(ColumnRef),
    Int(i64),
    Str(String),
}

impl Operand {
    fn from_value(v: &Value) -> Result<Self, SchemaError> {
        match v {
            Value::String(s) => {
                if s.contains("__") {
                    Ok(Operand::Column(ColumnRef::parse(s)?))
                } else {
                    Ok(Operand::Str(s.clone()))
                }
            }
            Value::Number(n) => n
                .as_i64()
                .map(Operand::Int)
                .ok_or_else(|| SchemaError::BadConstraint(format!("non-integer operand {n}"))),
            other => Err(SchemaError::BadConstraint(format!(
                "unsupported operand {other}"
            ))),
        }
    }
}

/// One declared integrity constraint over the base tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityConstraint {
    /// Multi-column primary key: members are non-null and rows are pairwise
    /// distinct on the key.
    PrimaryKey { columns: Vec<ColumnRef> },
    /// Every value of `column` appears in `references`.
    ForeignKey {
        column: ColumnRef,
        references: ColumnRef,
    },
    Between {
        column: ColumnRef,
        low: Operand,
        high: Operand,
    },
    InValues {
        column: ColumnRef,
        values: Vec<Operand>,
    },
    NotNull { column: ColumnRef },
    Comparison {
        op: CmpOp,
        left: Operand,
        right: Operand,
    },
    /// Auto-increment style column: strictly increasing in slot order.
    Increasing { column: ColumnRef },
}

/// Parse the JSON-like DSL into constraints.
pub fn parse_constraints(doc: &Value) -> Result<Vec<IntegrityConstraint>, SchemaError> {
    let entries = doc
        .as_array()
        .ok_or_else(|| SchemaError::BadConstraint("expected a list".to_string()))?;
    entries.iter().map(parse_one).collect()
}

fn parse_one(entry: &Value) -> Result<IntegrityConstraint, SchemaError> {
    let obj = entry
        .as_object()
        .filter(|o| o.len() == 1)
        .ok_or_else(|| SchemaError::BadConstraint(format!("expected single-key object, got {entry}")))?;
    let (key, payload) = obj.iter().next().ok_or_else(|| {
        SchemaError::BadConstraint("empty constraint object".to_string())
    })?;

    match key.as_str() {
        "primary" => {
            let cols = string_list(payload)?
                .iter()
                .map(|s| ColumnRef::parse(s))
                .collect::<Result<Vec<_>, _>>()?;
            if cols.is_empty() {
                return Err(SchemaError::BadConstraint("empty primary key".to_string()));
            }
            Ok(IntegrityConstraint::PrimaryKey { columns: cols })
        }
        "foreign" => {
            let pair = string_list(payload)?;
            let [col, refd] = pair.as_slice() else {
                return Err(SchemaError::BadConstraint(format!(
                    "foreign expects [column, references], got {payload}"
                )));
            };
            Ok(IntegrityConstraint::ForeignKey {
                column: ColumnRef::parse(col)?,
                references: ColumnRef::parse(refd)?,
            })
        }
        "between" => {
            let items = array_of(payload, 3)?;
            let Value::String(col) = &items[0] else {
                return Err(SchemaError::BadConstraint(format!(
                    "between expects a column first, got {payload}"
                )));
            };
            Ok(IntegrityConstraint::Between {
                column: ColumnRef::parse(col)?,
                low: Operand::from_value(&items[1])?,
                high: Operand::from_value(&items[2])?,
            })
        }
        "in" => {
            let items = array_of(payload, 2)?;
            let Value::String(col) = &items[0] else {
                return Err(SchemaError::BadConstraint(format!(
                    "in expects a column first, got {payload}"
                )));
            };
            let values = items[1]
                .as_array()
                .ok_or_else(|| {
                    SchemaError::BadConstraint(format!("in expects a value list, got {payload}"))
                })?
                .iter()
                .map(Operand::from_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(IntegrityConstraint::InValues {
                column: ColumnRef::parse(col)?,
                values,
            })
        }
        "not_null" => Ok(IntegrityConstraint::NotNull {
            column: single_column(payload)?,
        }),
        "inc" => Ok(IntegrityConstraint::Increasing {
            column: single_column(payload)?,
        }),
        cmp => {
            let op = CmpOp::from_key(cmp).ok_or_else(|| {
                SchemaError::BadConstraint(format!("unknown constraint kind '{cmp}'"))
            })?;
            let items = array_of(payload, 2)?;
            Ok(IntegrityConstraint::Comparison {
                op,
                left: Operand::from_value(&items[0])?,
                right: Operand::from_value(&items[1])?,
            })
        }
    }
}

fn single_column(payload: &Value) -> Result<ColumnRef, SchemaError> {
    payload
        .as_str()
        .ok_or_else(|| SchemaError::BadConstraint(format!("expected a column string, got {payload}")))
        .and_then(ColumnRef::parse)
}

fn string_list(payload: &Value) -> Result<Vec<String>, SchemaError> {
    payload
        .as_array()
        .ok_or_else(|| SchemaError::BadConstraint(format!("expected a list, got {payload}")))?
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                SchemaError::BadConstraint(format!("expected a string, got {v}"))
            })
        })
        .collect()
}

fn array_of(payload: &Value, len: usize) -> Result<&Vec<Value>, SchemaError> {
    let arr = payload
        .as_array()
        .ok_or_else(|| SchemaError::BadConstraint(format!("expected a list, got {payload}")))?;
    if arr.len() != len {
        return Err(SchemaError::BadConstraint(format!(
            "expected {len} entries, got {}",
            arr.len()
        )));
    }
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_ref_parsing() {
        let c = ColumnRef::parse("EMP__dept_id").unwrap();
        assert_eq!(c.table, "EMP");
        assert_eq!(c.column, "dept_id");
        assert_eq!(c.to_string(), "EMP__dept_id");
        assert!(ColumnRef::parse("EMPage").is_err());
        assert!(ColumnRef::parse("__x").is_err());
    }

    #[test]
    fn parses_full_dsl() {
        let doc = json!([
            {"primary": ["EMP__id"]},
            {"foreign": ["EMP__dept_id", "DEPT__id"]},
            {"between": ["EMP__age", 0, 120]},
            {"in": ["EMP__age", [25, 30]]},
            {"not_null": "EMP__name"},
            {"gt": ["EMP__age", 18]},
            {"inc": "EMP__id"}
        ]);
        let cs = parse_constraints(&doc).unwrap();
        assert_eq!(cs.len(), 7);
        assert!(matches!(cs[0], IntegrityConstraint::PrimaryKey { .. }));
        assert!(matches!(cs[6], IntegrityConstraint::Increasing { .. }));
        match &cs[5] {
            IntegrityConstraint::Comparison { op, left, right } => {
                assert_eq!(*op, CmpOp::Gt);
                assert!(matches!(left, Operand::Column(_)));
                assert_eq!(*right, Operand::Int(18));
            }
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn between_accepts_column_endpoints() {
        let doc = json!([{"between": ["EMP__age", "EMP__min_age", 120]}]);
        let cs = parse_constraints(&doc).unwrap();
        match &cs[0] {
            IntegrityConstraint::Between { low, .. } => {
                assert!(matches!(low, Operand::Column(_)))
            }
            other => panic!("expected between, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_entries() {
        for doc in [
            json!({"primary": ["EMP__id"]}),
            json!([{"primary": []}]),
            json!([{"foreign": ["EMP__a"]}]),
            json!([{"frobnicate": ["EMP__a", 1]}]),
            json!([{"between": ["EMP__age", 0]}]),
        ] {
            assert!(parse_constraints(&doc).is_err(), "should reject {doc}");
        }
    }
}
