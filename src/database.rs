
use crate::hc::*;
use crate::utility::*;
use crate::level::*;
use crate::term::*;

/// Allocation site for terms and universe levels. Every node goes through a
/// canonicalizing table, so structurally equal nodes are pointer-identical
/// and the engines' identity fast paths are sound.
#[derive(Debug)]
pub struct Database {
    terms: HcFactory<Node>,
    univs: HcFactory<UnivNode>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Database {
        Database {
            terms: HcFactory::with_capacity(128),
            univs: HcFactory::with_capacity(128),
        }
    }

    pub fn make_term(&mut self, data: TermData) -> Term {
        self.terms.make(Node::new(data))
    }

    pub fn make_univ(&mut self, data: UnivData) -> Univ {
        self.univs.make(UnivNode::new(data))
    }

    /// Number of live slots in the term table; the sharing tests use this to
    /// show an operation allocated nothing.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn purge(&mut self) {
        self.terms.purge();
        self.univs.purge();
    }

    pub fn bound(&mut self, index: impl Into<Index>) -> Term {
        let index = index.into();
        self.make_term(TermData::Bound { index })
    }

    pub fn free(&mut self, id: impl Into<Id>) -> Term {
        let id = id.into();
        self.make_term(TermData::Free { id })
    }

    pub fn constant(&mut self, id: impl Into<Id>, levels: Univs) -> Term {
        let id = id.into();
        self.make_term(TermData::Const { id, levels })
    }

    pub fn sort(&mut self, level: Univ) -> Term {
        self.make_term(TermData::Sort { level })
    }

    pub fn prop(&mut self) -> Term {
        let level = self.zero();
        self.sort(level)
    }

    pub fn apply(&mut self, fun: Term, arg: Term) -> Term {
        self.make_term(TermData::Apply { fun, arg })
    }

    pub fn apply_spine(&mut self, fun: Term, args: &[Term]) -> Term {
        let mut result = fun;
        for arg in args.iter().cloned() {
            result = self.make_term(TermData::Apply { fun: result, arg });
        }
        result
    }

    pub fn lambda(&mut self, name: Symbol, domain: Term, body: Term) -> Term {
        self.make_term(TermData::Lambda { name, domain, body })
    }

    pub fn pi(&mut self, name: Symbol, domain: Term, body: Term) -> Term {
        self.make_term(TermData::Pi { name, domain, body })
    }

    pub fn let_bind(&mut self, name: Symbol, ty: Term, def: Term, body: Term) -> Term {
        self.make_term(TermData::Let { name, ty, def, body })
    }

    pub fn metavar(&mut self, name: Symbol) -> Term {
        self.make_term(TermData::Meta { name })
    }

    pub fn opaque(&mut self, name: Symbol, args: Vec<Term>) -> Term {
        self.make_term(TermData::Opaque { name, args })
    }

    pub fn zero(&mut self) -> Univ {
        self.make_univ(UnivData::Zero)
    }

    pub fn succ(&mut self, of: Univ) -> Univ {
        self.make_univ(UnivData::Succ(of))
    }

    pub fn param(&mut self, name: Symbol) -> Univ {
        self.make_univ(UnivData::Param(name))
    }

    /// The ground level `n`.
    pub fn univ_of(&mut self, n: usize) -> Univ {
        let mut result = self.zero();
        for _ in 0..n {
            result = self.succ(result);
        }
        result
    }

    pub fn max_level(&mut self, lhs: Univ, rhs: Univ) -> Univ {
        if lhs == rhs || rhs.is_zero() { return lhs }
        if lhs.is_zero() { return rhs }
        self.make_univ(UnivData::Max(lhs, rhs))
    }

    pub fn imax_level(&mut self, lhs: Univ, rhs: Univ) -> Univ {
        if rhs.is_zero() { return rhs }
        if lhs.is_zero() || lhs == rhs { return rhs }
        if let UnivData::Succ(_) = &rhs.data {
            // the right-hand side is known nonzero
            return self.max_level(lhs, rhs);
        }
        self.make_univ(UnivData::IMax(lhs, rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_canonicalizes() {
        let db = &mut Database::new();
        let f1 = db.free("f");
        let before = db.term_count();
        let f2 = db.free("f");
        assert_eq!(f1, f2);
        assert_eq!(db.term_count(), before);

        let a1 = db.apply(f1, f2);
        let f3 = db.free("f");
        let a2 = db.apply(f3.clone(), f3);
        assert_eq!(a1, a2);
    }

    #[test]
    fn purge_forgets_dropped_terms() {
        let db = &mut Database::new();
        let keep = db.free("keep");
        {
            let _scratch = db.free("scratch");
        }
        db.purge();
        assert_eq!(db.term_count(), 1);
        let again = db.free("keep");
        assert_eq!(again, keep);
    }
}
