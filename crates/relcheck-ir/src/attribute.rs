//! Attribute identities and bindings.

use std::hash::{Hash, Hasher};

use relcheck_sql::ColumnType;

use crate::expr::Expr;

/// Stable attribute identity. Two attributes are the same column exactly
/// when their ids match, independent of alias display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrId(pub u32);

impl std::fmt::Display for AttrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// A named column binding on a table.
///
/// A pure column (`expr == None`) is bound directly to the base facts; an
/// attribute with `expr` set aliases a computed value that the lowering
/// visitor re-derives from its source expression.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub id: AttrId,
    /// Table-qualified display name, e.g. `EMP.age`.
    pub name: String,
    /// Secondary lookup alias retained when USING/natural joins hide the
    /// duplicated key column of one side.
    pub alt_name: Option<String>,
    pub ty: ColumnType,
    /// Derivation expression for computed attributes.
    pub expr: Option<Expr>,
}

impl Attribute {
    pub fn column(id: AttrId, name: impl Into<String>, ty: ColumnType) -> Self {
        Attribute {
            id,
            name: name.into(),
            alt_name: None,
            ty,
            expr: None,
        }
    }

    pub fn derived(id: AttrId, name: impl Into<String>, ty: ColumnType, expr: Expr) -> Self {
        Attribute {
            id,
            name: name.into(),
            alt_name: None,
            ty,
            expr: Some(expr),
        }
    }

    /// Unqualified column name.
    pub fn short_name(&self) -> &str {
        self.name.rsplit_once('.').map(|(_, c)| c).unwrap_or(&self.name)
    }

    /// Whether `qualifier.name` (or bare `name`) refers to this attribute,
    /// checking the primary name first and then the secondary alias.
    pub fn matches(&self, qualifier: Option<&str>, name: &str) -> bool {
        if Self::name_matches(&self.name, qualifier, name) {
            return true;
        }
        self.alt_name
            .as_deref()
            .is_some_and(|alt| Self::name_matches(alt, qualifier, name))
    }

    fn name_matches(full: &str, qualifier: Option<&str>, name: &str) -> bool {
        match full.rsplit_once('.') {
            Some((table, column)) => match qualifier {
                Some(q) => q == table && column == name,
                None => column == name,
            },
            None => qualifier.is_none() && full == name,
        }
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_identity_not_name() {
        let a = Attribute::column(AttrId(1), "EMP.age", ColumnType::Int);
        let mut b = a.clone();
        b.name = "E.age".to_string();
        assert_eq!(a, b);

        let c = Attribute::column(AttrId(2), "EMP.age", ColumnType::Int);
        assert_ne!(a, c);
    }

    #[test]
    fn qualified_and_bare_matching() {
        let a = Attribute::column(AttrId(1), "EMP.age", ColumnType::Int);
        assert!(a.matches(None, "age"));
        assert!(a.matches(Some("EMP"), "age"));
        assert!(!a.matches(Some("DEPT"), "age"));
        assert!(!a.matches(None, "name"));
    }

    #[test]
    fn alt_name_resolves_hidden_join_keys() {
        let mut a = Attribute::column(AttrId(1), "EMP.dept_id", ColumnType::Int);
        a.alt_name = Some("DEPT.dept_id".to_string());
        assert!(a.matches(Some("EMP"), "dept_id"));
        assert!(a.matches(Some("DEPT"), "dept_id"));
        assert!(a.matches(None, "dept_id"));
    }

    #[test]
    fn short_name_strips_qualifier() {
        let a = Attribute::column(AttrId(1), "EMP.age", ColumnType::Int);
        assert_eq!(a.short_name(), "age");
    }
}
