//! Bounded schema: declared tables, column types, and per-table bound sizes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::SchemaError;

/// Declared column type. Every type contributes a domain constraint on the
/// integer encoding of its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Int,
    Date,
    Varchar,
    Boolean,
}

impl ColumnType {
    /// Inclusive integer domain of the encoded value, when bounded.
    ///
    /// INT and VARCHAR are left open below/above where the solver may roam;
    /// DATE day numbers and BOOLEAN flags are clamped.
    pub fn domain(&self) -> (Option<i64>, Option<i64>) {
        match self {
            ColumnType::Int => (None, None),
            ColumnType::Date => (Some(0), Some(3_999_999)),
            ColumnType::Varchar => (Some(0), None),
            ColumnType::Boolean => (Some(0), Some(1)),
        }
    }
}

/// One declared base table: ordered columns and the number of tuple slots
/// allocated to it in the bounded model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: IndexMap<String, ColumnType>,
    pub bound: usize,
}

impl TableSchema {
    pub fn new(bound: usize) -> Self {
        TableSchema {
            columns: IndexMap::new(),
            bound,
        }
    }

    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.insert(name.into(), ty);
        self
    }
}

/// The verification schema: table name -> declared columns + bound size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: IndexMap<String, TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn table(mut self, name: impl Into<String>, table: TableSchema) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    pub fn lookup(&self, name: &str) -> Result<&TableSchema, SchemaError> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
    }

    pub fn column_type(&self, table: &str, column: &str) -> Result<ColumnType, SchemaError> {
        let t = self.lookup(table)?;
        t.columns
            .get(column)
            .copied()
            .ok_or_else(|| SchemaError::UnknownColumn(format!("{table}.{column}")))
    }

    /// Override every table's bound size, as the bound-escalation driver does
    /// between attempts.
    pub fn with_uniform_bound(mut self, bound: usize) -> Self {
        for table in self.tables.values_mut() {
            table.bound = bound;
        }
        self
    }
}

/// Convert an ISO `YYYY-MM-DD` date into its day-number encoding.
///
/// Days are counted from 0000-03-01 using the standard civil-calendar
/// era arithmetic, so ordering and distance survive the coercion.
pub fn date_to_days(date: &str) -> Result<i64, SchemaError> {
    let bad = || SchemaError::BadDate(date.to_string());
    let mut parts = date.splitn(3, '-');
    let y: i64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let m: i64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let d: i64 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return Err(bad());
    }
    let y = if m <= 2 { y - 1 } else { y };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    Ok(era * 146_097 + doe)
}

/// Inverse of [`date_to_days`].
pub fn days_to_date(days: i64) -> String {
    let era = days.div_euclid(146_097);
    let doe = days - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{y:04}-{m:02}-{d:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emp_dept() -> Schema {
        Schema::new()
            .table(
                "EMP",
                TableSchema::new(2)
                    .column("id", ColumnType::Int)
                    .column("name", ColumnType::Varchar)
                    .column("age", ColumnType::Int)
                    .column("dept_id", ColumnType::Int),
            )
            .table(
                "DEPT",
                TableSchema::new(2)
                    .column("id", ColumnType::Int)
                    .column("name", ColumnType::Varchar),
            )
    }

    #[test]
    fn lookup_resolves_declared_tables() {
        let schema = emp_dept();
        assert_eq!(schema.lookup("EMP").unwrap().bound, 2);
        assert!(matches!(
            schema.lookup("NOPE"),
            Err(SchemaError::UnknownTable(_))
        ));
    }

    #[test]
    fn column_type_resolves_and_rejects() {
        let schema = emp_dept();
        assert_eq!(
            schema.column_type("EMP", "age").unwrap(),
            ColumnType::Int
        );
        assert!(matches!(
            schema.column_type("EMP", "salary"),
            Err(SchemaError::UnknownColumn(_))
        ));
    }

    #[test]
    fn uniform_bound_overrides_all_tables() {
        let schema = emp_dept().with_uniform_bound(5);
        assert!(schema.tables.values().all(|t| t.bound == 5));
    }

    #[test]
    fn boolean_domain_is_clamped() {
        assert_eq!(ColumnType::Boolean.domain(), (Some(0), Some(1)));
        assert_eq!(ColumnType::Int.domain(), (None, None));
    }

    #[test]
    fn date_round_trip() {
        for d in ["1970-01-01", "2000-02-29", "2024-12-31", "1999-03-01"] {
            let days = date_to_days(d).unwrap();
            assert_eq!(days_to_date(days), d, "round trip for {d}");
        }
    }

    #[test]
    fn date_ordering_survives_encoding() {
        let a = date_to_days("2020-01-01").unwrap();
        let b = date_to_days("2020-01-02").unwrap();
        let c = date_to_days("2021-01-01").unwrap();
        assert!(a < b && b < c);
        assert_eq!(b - a, 1);
    }

    #[test]
    fn malformed_dates_are_rejected() {
        for bad in ["2020-13-01", "2020-00-10", "2020-01", "x-y-z"] {
            assert!(date_to_days(bad).is_err(), "{bad} should be rejected");
        }
    }
}
