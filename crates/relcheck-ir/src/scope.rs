//! Name resolution scopes.
//!
//! Each query level owns one scope: the attributes of its FROM table, the
//! CTE bindings visible to it, and a link to the enclosing scope. Subquery
//! lowering probes with the enclosing scope *unpinned*; a column that only
//! resolves there raises [`EncodeError::OuterReference`], which tells the
//! caller to re-instantiate the subquery once per enclosing tuple slot with
//! the scope pinned to that slot.

use indexmap::IndexMap;

use crate::attribute::{AttrId, Attribute};
use crate::errors::EncodeError;
use crate::table::{SlotId, TableId};

/// Outcome of a column lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// Bound in the current scope.
    Local(AttrId),
    /// Bound in a pinned enclosing scope.
    Outer { slot: SlotId, attr: AttrId },
}

#[derive(Debug, Clone, Default)]
pub struct Scope<'a> {
    /// WITH bindings introduced at this level, in declaration order.
    pub ctes: IndexMap<String, TableId>,
    /// Attributes of the FROM table currently in scope.
    attrs: Vec<Attribute>,
    /// The enclosing tuple slot a correlated instantiation is bound to.
    pinned: Option<SlotId>,
    outer: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    pub fn root() -> Self {
        Scope::default()
    }

    /// Scope for a subquery nested under `outer`.
    pub fn nested(outer: &'a Scope<'a>) -> Self {
        Scope {
            ctes: IndexMap::new(),
            attrs: Vec::new(),
            pinned: None,
            outer: Some(outer),
        }
    }

    /// Install the FROM-table attributes once the FROM clause is lowered.
    pub fn bind(&mut self, attrs: Vec<Attribute>) {
        self.attrs = attrs;
    }

    pub fn attrs(&self) -> &[Attribute] {
        &self.attrs
    }

    /// Pin this scope to one of its tuple slots for a correlated
    /// instantiation of a nested subquery.
    pub fn pin(&mut self, slot: SlotId) {
        self.pinned = Some(slot);
    }

    /// Resolve a WITH binding, walking outward. Inner bindings shadow
    /// outer ones.
    pub fn cte(&self, name: &str) -> Option<TableId> {
        if let Some(&id) = self.ctes.get(name) {
            return Some(id);
        }
        self.outer.and_then(|o| o.cte(name))
    }

    /// Resolve `qualifier.name` (or bare `name`) against this scope, then
    /// the enclosing chain.
    pub fn resolve(&self, qualifier: Option<&str>, name: &str) -> Result<Resolved, EncodeError> {
        if let Some(attr) = self.lookup_local(qualifier, name)? {
            return Ok(Resolved::Local(attr));
        }
        let mut outer = self.outer;
        while let Some(scope) = outer {
            if let Some(attr) = scope.lookup_local(qualifier, name)? {
                return match scope.pinned {
                    Some(slot) => Ok(Resolved::Outer { slot, attr }),
                    None => Err(EncodeError::OuterReference(display_name(qualifier, name))),
                };
            }
            outer = scope.outer;
        }
        Err(EncodeError::UnknownColumn(display_name(qualifier, name)))
    }

    fn lookup_local(
        &self,
        qualifier: Option<&str>,
        name: &str,
    ) -> Result<Option<AttrId>, EncodeError> {
        let mut hits = self.attrs.iter().filter(|a| a.matches(qualifier, name));
        let Some(first) = hits.next() else {
            return Ok(None);
        };
        if hits.next().is_some() {
            return Err(EncodeError::Syntax(format!(
                "ambiguous column reference '{}'",
                display_name(qualifier, name)
            )));
        }
        Ok(Some(first.id))
    }
}

fn display_name(qualifier: Option<&str>, name: &str) -> String {
    match qualifier {
        Some(q) => format!("{q}.{name}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relcheck_sql::ColumnType;

    fn emp_attrs() -> Vec<Attribute> {
        vec![
            Attribute::column(AttrId(0), "EMP.id", ColumnType::Int),
            Attribute::column(AttrId(1), "EMP.age", ColumnType::Int),
        ]
    }

    #[test]
    fn local_resolution() {
        let mut scope = Scope::root();
        scope.bind(emp_attrs());
        assert_eq!(scope.resolve(None, "age").unwrap(), Resolved::Local(AttrId(1)));
        assert_eq!(
            scope.resolve(Some("EMP"), "id").unwrap(),
            Resolved::Local(AttrId(0))
        );
    }

    #[test]
    fn unknown_column() {
        let mut scope = Scope::root();
        scope.bind(emp_attrs());
        assert!(matches!(
            scope.resolve(None, "salary"),
            Err(EncodeError::UnknownColumn(_))
        ));
    }

    #[test]
    fn ambiguous_bare_name_across_tables() {
        let mut scope = Scope::root();
        scope.bind(vec![
            Attribute::column(AttrId(0), "EMP.id", ColumnType::Int),
            Attribute::column(AttrId(1), "DEPT.id", ColumnType::Int),
        ]);
        assert!(matches!(
            scope.resolve(None, "id"),
            Err(EncodeError::Syntax(_))
        ));
        // Qualification disambiguates.
        assert_eq!(
            scope.resolve(Some("DEPT"), "id").unwrap(),
            Resolved::Local(AttrId(1))
        );
    }

    #[test]
    fn unpinned_outer_hit_signals_correlation() {
        let mut outer = Scope::root();
        outer.bind(emp_attrs());
        let mut inner = Scope::nested(&outer);
        inner.bind(vec![Attribute::column(AttrId(2), "DEPT.dept_id", ColumnType::Int)]);
        assert!(matches!(
            inner.resolve(Some("EMP"), "age"),
            Err(EncodeError::OuterReference(_))
        ));
    }

    #[test]
    fn pinned_outer_hit_resolves_to_slot() {
        let mut outer = Scope::root();
        outer.bind(emp_attrs());
        outer.pin(SlotId(7));
        let mut inner = Scope::nested(&outer);
        inner.bind(vec![Attribute::column(AttrId(2), "DEPT.dept_id", ColumnType::Int)]);
        assert_eq!(
            inner.resolve(Some("EMP"), "age").unwrap(),
            Resolved::Outer {
                slot: SlotId(7),
                attr: AttrId(1)
            }
        );
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let mut outer = Scope::root();
        outer.bind(emp_attrs());
        outer.pin(SlotId(0));
        let mut inner = Scope::nested(&outer);
        inner.bind(vec![Attribute::column(AttrId(9), "EMP.age", ColumnType::Int)]);
        assert_eq!(
            inner.resolve(None, "age").unwrap(),
            Resolved::Local(AttrId(9))
        );
    }

    #[test]
    fn cte_lookup_walks_outward_and_shadows() {
        let mut outer = Scope::root();
        outer.ctes.insert("t".to_string(), TableId(1));
        outer.ctes.insert("u".to_string(), TableId(2));
        let mut inner = Scope::nested(&outer);
        inner.ctes.insert("t".to_string(), TableId(3));
        assert_eq!(inner.cte("t"), Some(TableId(3)));
        assert_eq!(inner.cte("u"), Some(TableId(2)));
        assert_eq!(inner.cte("v"), None);
    }
}
