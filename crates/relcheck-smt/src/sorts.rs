/// SMT sorts. Every SQL value is modeled as an integer (strings through the
/// session interner, dates as civil day numbers, booleans as 0/1) with a
/// separate boolean NULL flag, so two sorts suffice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtSort {
    Bool,
    Int,
}

impl std::fmt::Display for SmtSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtSort::Bool => write!(f, "Bool"),
            SmtSort::Int => write!(f, "Int"),
        }
    }
}
