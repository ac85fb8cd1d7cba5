
use std::fmt;
use std::hash;

use imbl::Vector;
use if_chain::if_chain;

use crate::hc::*;
use crate::utility::*;
use crate::database::Database;

pub type Univ = Hc<UnivNode>;
pub type Univs = Vector<Univ>;

#[derive(Debug, Hash, Clone, PartialEq, Eq)]
pub enum UnivData {
    Zero,
    Succ(Univ),
    Max(Univ, Univ),
    IMax(Univ, Univ),
    Param(Symbol),
}

/// A level node together with the one structural fact the engines test on
/// every visit: whether any named parameter occurs below it. The fact is
/// fixed at construction, identity is keyed on the data alone.
#[derive(Debug, Clone)]
pub struct UnivNode {
    pub data: UnivData,
    params: bool,
}

impl UnivNode {
    pub(crate) fn new(data: UnivData) -> UnivNode {
        let params = match &data {
            UnivData::Zero => false,
            UnivData::Succ(of) => of.has_params(),
            UnivData::Max(lhs, rhs)
            | UnivData::IMax(lhs, rhs) => lhs.has_params() || rhs.has_params(),
            UnivData::Param(_) => true,
        };
        UnivNode { data, params }
    }
}

impl PartialEq for UnivNode {
    fn eq(&self, other: &Self) -> bool { self.data == other.data }
}
impl Eq for UnivNode { }

impl hash::Hash for UnivNode {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl Hc<UnivNode> {
    pub fn has_params(&self) -> bool { self.params }

    pub fn is_zero(&self) -> bool { matches!(self.data, UnivData::Zero) }
}

pub trait UnivExt {
    fn instantiate(&self, db: &mut Database, ps: &[Symbol], ls: &[Univ]) -> Self;
}

impl UnivExt for Univ {
    /// Replace every parameter named in `ps` with the paired level in `ls`.
    /// Parameter-free levels come back untouched; rebuilding goes through the
    /// normalizing constructors, so `max u u` collapses once `u` is fixed.
    fn instantiate(&self, db: &mut Database, ps: &[Symbol], ls: &[Univ]) -> Univ {
        if !self.has_params() { return self.clone() }
        match &self.data {
            UnivData::Zero => self.clone(),
            UnivData::Succ(of) => {
                let of = of.instantiate(db, ps, ls);
                db.succ(of)
            }
            UnivData::Max(lhs, rhs) => {
                let lhs = lhs.instantiate(db, ps, ls);
                let rhs = rhs.instantiate(db, ps, ls);
                db.max_level(lhs, rhs)
            }
            UnivData::IMax(lhs, rhs) => {
                let lhs = lhs.instantiate(db, ps, ls);
                let rhs = rhs.instantiate(db, ps, ls);
                db.imax_level(lhs, rhs)
            }
            UnivData::Param(name) => {
                if_chain! {
                    if let Some(at) = ps.iter().position(|p| p == name);
                    if let Some(level) = ls.get(at);
                    then { level.clone() }
                    else { self.clone() }
                }
            }
        }
    }
}

fn operand(level: &Univ) -> String {
    match &level.data {
        UnivData::Max(..) | UnivData::IMax(..) => format!("({})", level),
        _ => level.to_string(),
    }
}

impl fmt::Display for UnivNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // collapse the successor spine onto a numeral tail
        let mut offset = 0;
        let mut cursor = self;
        while let UnivData::Succ(of) = &cursor.data {
            offset += 1;
            cursor = &**of;
        }
        match &cursor.data {
            UnivData::Zero => write!(f, "{}", offset),
            UnivData::Param(name) => {
                write!(f, "{}", name)?;
                if offset > 0 { write!(f, "+{}", offset)?; }
                Ok(())
            }
            UnivData::Max(lhs, rhs) => {
                write!(f, "max {} {}", operand(lhs), operand(rhs))?;
                if offset > 0 { write!(f, "+{}", offset)?; }
                Ok(())
            }
            UnivData::IMax(lhs, rhs) => {
                write!(f, "imax {} {}", operand(lhs), operand(rhs))?;
                if offset > 0 { write!(f, "+{}", offset)?; }
                Ok(())
            }
            UnivData::Succ(_) => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[test]
    fn constructors_normalize_the_cheap_identities() {
        let db = &mut Database::new();
        let zero = db.zero();
        let u = db.param(Symbol::from("u"));
        let max_uu = db.max_level(u.clone(), u.clone());
        assert_eq!(max_uu, u);
        let max_u0 = db.max_level(u.clone(), zero.clone());
        assert_eq!(max_u0, u);
        let imax_u0 = db.imax_level(u.clone(), zero.clone());
        assert_eq!(imax_u0, zero);
        let one = db.univ_of(1);
        let imax_u1 = db.imax_level(u.clone(), one.clone());
        let max_u1 = db.max_level(u, one);
        assert_eq!(imax_u1, max_u1);
    }

    #[test]
    fn parameter_substitution_rewrites_only_the_named_slots() {
        let db = &mut Database::new();
        let u = Symbol::from("u");
        let v = Symbol::from("v");
        let pu = db.param(u);
        let pv = db.param(v);
        let su = db.succ(pu.clone());
        let level = db.max_level(su, pv.clone());
        let two = db.univ_of(2);
        let result = level.instantiate(db, &[u], &[two]);
        let three = db.univ_of(3);
        let expected = db.max_level(three, pv.clone());
        assert_eq!(result, expected);
        // untouched operand keeps its allocation
        let zero = db.zero();
        let untouched = pv.instantiate(db, &[u], &[zero]);
        assert_eq!(untouched, pv);
    }

    #[test]
    fn display_folds_successor_spines() {
        let db = &mut Database::new();
        let three = db.univ_of(3);
        assert_eq!(three.to_string(), "3");
        let u = db.param(Symbol::from("u"));
        let su = db.succ(u.clone());
        assert_eq!(su.to_string(), "u+1");
        let zero = db.zero();
        let m = db.max_level(su, zero);
        assert_eq!(m.to_string(), "u+1");
    }
}
