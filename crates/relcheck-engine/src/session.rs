//! Per-session solver state.
//!
//! One session hosts many analyses over the same schema. Each analysis runs
//! inside a solver push/pop scope; the string interner grows during an
//! analysis (string and date literals pick up codes) and is truncated back
//! on rollback so codes do not leak across analyses.

use relcheck_smt::backends::Z3Solver;
use relcheck_smt::{EquivEncoding, SmtSolver, StringInterner};

pub struct Session<S: SmtSolver> {
    solver: S,
    interner: StringInterner,
}

/// Rollback point for one analysis scope.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    interned: usize,
}

impl Session<Z3Solver> {
    pub fn new() -> Self {
        Session::with_solver(Z3Solver::with_default_config())
    }

    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        Session::with_solver(Z3Solver::with_timeout_ms(timeout_ms))
    }
}

impl Default for Session<Z3Solver> {
    fn default() -> Self {
        Session::new()
    }
}

impl<S: SmtSolver> Session<S> {
    pub fn with_solver(solver: S) -> Self {
        Session {
            solver,
            interner: StringInterner::new(),
        }
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    pub fn interner(&self) -> &StringInterner {
        &self.interner
    }

    pub fn interner_mut(&mut self) -> &mut StringInterner {
        &mut self.interner
    }

    /// Open an analysis scope.
    pub fn checkpoint(&mut self) -> Result<Checkpoint, S::Error> {
        self.solver.push()?;
        Ok(Checkpoint {
            interned: self.interner.len(),
        })
    }

    /// Discard everything registered since `mark`.
    pub fn rollback(&mut self, mark: Checkpoint) -> Result<(), S::Error> {
        self.solver.pop()?;
        self.interner.truncate(mark.interned);
        Ok(())
    }

    /// Declare and assert one encoded problem into the current scope.
    pub fn load(&mut self, encoding: &EquivEncoding) -> Result<(), S::Error> {
        for (name, sort) in &encoding.declarations {
            self.solver.declare_var(name, sort)?;
        }
        for term in &encoding.assertions {
            self.solver.assert(term)?;
        }
        Ok(())
    }

    /// Drop every scope and every interned string.
    pub fn reset(&mut self) -> Result<(), S::Error> {
        self.solver.reset()?;
        self.interner = StringInterner::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relcheck_smt::{SatResult, SmtSort, SmtTerm};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn rollback_discards_scope_assertions() -> TestResult {
        let mut session = Session::new();
        let mark = session.checkpoint()?;
        session.solver_mut().declare_var("x", &SmtSort::Int)?;
        session
            .solver_mut()
            .assert(&SmtTerm::var("x").eq(SmtTerm::int(1)))?;
        session
            .solver_mut()
            .assert(&SmtTerm::var("x").eq(SmtTerm::int(2)))?;
        assert_eq!(session.solver_mut().check_sat()?, SatResult::Unsat);
        session.rollback(mark)?;
        assert_eq!(session.solver_mut().check_sat()?, SatResult::Sat);
        Ok(())
    }

    #[test]
    fn rollback_truncates_the_interner() -> TestResult {
        let mut session = Session::new();
        session.interner_mut().intern("alice");
        let mark = session.checkpoint()?;
        session.interner_mut().intern("bob");
        session.interner_mut().intern("carol");
        assert_eq!(session.interner().len(), 3);
        session.rollback(mark)?;
        assert_eq!(session.interner().len(), 1);
        assert_eq!(session.interner().resolve(1), Some("alice"));
        assert_eq!(session.interner().resolve(2), None);
        Ok(())
    }

    #[test]
    fn load_replays_an_encoding() -> TestResult {
        let mut encoding = EquivEncoding::new();
        encoding.declare("a".to_string(), SmtSort::Int);
        encoding.declare("b".to_string(), SmtSort::Bool);
        encoding.assert(SmtTerm::var("a").gt(SmtTerm::int(3)));
        encoding.assert(SmtTerm::var("b"));

        let mut session = Session::new();
        session.load(&encoding)?;
        assert_eq!(session.solver_mut().check_sat()?, SatResult::Sat);
        session
            .solver_mut()
            .assert(&SmtTerm::var("a").lt(SmtTerm::int(0)))?;
        assert_eq!(session.solver_mut().check_sat()?, SatResult::Unsat);
        Ok(())
    }

    #[test]
    fn reset_clears_interned_strings() -> TestResult {
        let mut session = Session::new();
        session.interner_mut().intern("alice");
        session.reset()?;
        assert!(session.interner().is_empty());
        Ok(())
    }
}
