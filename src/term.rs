
use std::fmt;
use std::hash;

use imbl::Vector;

use crate::hc::*;
use crate::utility::*;
use crate::level::*;
use crate::database::Database;

pub type Term = Hc<Node>;

#[derive(Debug, Hash, Clone, PartialEq, Eq)]
pub enum TermData {
    Bound {
        index: Index
    },
    Free {
        id: Id
    },
    Const {
        id: Id,
        levels: Univs
    },
    Sort {
        level: Univ
    },
    Apply {
        fun: Term,
        arg: Term
    },
    Lambda {
        name: Symbol,
        domain: Term,
        body: Term
    },
    Pi {
        name: Symbol,
        domain: Term,
        body: Term
    },
    Let {
        name: Symbol,
        ty: Term,
        def: Term,
        body: Term
    },
    Meta {
        name: Symbol
    },
    Opaque {
        name: Symbol,
        args: Vec<Term>
    },
}

/// A term node together with the structural facts the engines test on every
/// visit: the loose-bound-variable range, whether a named free variable
/// occurs, and whether any universe parameter occurs. The facts are fixed at
/// construction; identity is keyed on the data alone.
#[derive(Debug, Clone)]
pub struct Node {
    pub data: TermData,
    bvar_range: usize,
    frees: bool,
    params: bool,
}

impl Node {
    pub(crate) fn new(data: TermData) -> Node {
        let (bvar_range, frees, params) = measure(&data);
        Node { data, bvar_range, frees, params }
    }
}

fn measure(data: &TermData) -> (usize, bool, bool) {
    match data {
        TermData::Bound { index } => (**index + 1, false, false),
        TermData::Free { .. } => (0, true, false),
        TermData::Const { levels, .. } => {
            (0, false, levels.iter().any(|l| l.has_params()))
        }
        TermData::Sort { level } => (0, false, level.has_params()),
        TermData::Apply { fun, arg } => (
            fun.bvar_range().max(arg.bvar_range()),
            fun.has_frees() || arg.has_frees(),
            fun.has_univ_params() || arg.has_univ_params(),
        ),
        TermData::Lambda { domain, body, .. }
        | TermData::Pi { domain, body, .. } => (
            domain.bvar_range().max(body.bvar_range().saturating_sub(1)),
            domain.has_frees() || body.has_frees(),
            domain.has_univ_params() || body.has_univ_params(),
        ),
        TermData::Let { ty, def, body, .. } => (
            ty.bvar_range()
                .max(def.bvar_range())
                .max(body.bvar_range().saturating_sub(1)),
            ty.has_frees() || def.has_frees() || body.has_frees(),
            ty.has_univ_params() || def.has_univ_params() || body.has_univ_params(),
        ),
        TermData::Meta { .. } => (0, false, false),
        TermData::Opaque { args, .. } => {
            args.iter().fold((0, false, false), |(range, frees, params), arg| (
                range.max(arg.bvar_range()),
                frees || arg.has_frees(),
                params || arg.has_univ_params(),
            ))
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool { self.data == other.data }
}
impl Eq for Node { }

impl hash::Hash for Node {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl Hc<Node> {
    /// Smallest `n` such that every loose bound variable below this node has
    /// index `< n`; zero means no bound variable escapes.
    pub fn bvar_range(&self) -> usize { self.bvar_range }

    pub fn closed(&self) -> bool { self.bvar_range == 0 }

    pub fn has_frees(&self) -> bool { self.frees }

    pub fn has_univ_params(&self) -> bool { self.params }

    pub fn is_lambda(&self) -> bool { matches!(self.data, TermData::Lambda { .. }) }

    pub fn is_apply(&self) -> bool { matches!(self.data, TermData::Apply { .. }) }

    /// Peel nested applications, returning the head and the arguments in
    /// left-to-right order.
    pub fn unfold_apps(&self) -> (Term, Vec<Term>) {
        let mut args = Vec::new();
        let mut head = self;
        while let TermData::Apply { fun, arg } = &head.data {
            args.push(arg.clone());
            head = fun;
        }
        args.reverse();
        (head.clone(), args)
    }
}

pub trait TermExt {
    fn shift(&self, db: &mut Database, amount: usize, cutoff: usize) -> Self;
}

impl TermExt for Term {
    /// Add `amount` to every loose bound variable with index `>= cutoff`.
    /// Subtrees with nothing at or above the cutoff keep their allocation.
    fn shift(&self, db: &mut Database, amount: usize, cutoff: usize) -> Term {
        if amount == 0 || self.bvar_range() <= cutoff {
            return self.clone();
        }
        stacker::maybe_grow(crate::RED_ZONE, crate::STACK_CHUNK, || {
            match &self.data {
                TermData::Bound { index } => {
                    // the range test already filtered indices below the cutoff
                    db.bound(*index + amount)
                }
                TermData::Apply { fun, arg } => {
                    let fun = fun.shift(db, amount, cutoff);
                    let arg = arg.shift(db, amount, cutoff);
                    db.make_term(TermData::Apply { fun, arg })
                }
                TermData::Lambda { name, domain, body } => {
                    let domain = domain.shift(db, amount, cutoff);
                    let body = body.shift(db, amount, cutoff + 1);
                    db.make_term(TermData::Lambda { name: *name, domain, body })
                }
                TermData::Pi { name, domain, body } => {
                    let domain = domain.shift(db, amount, cutoff);
                    let body = body.shift(db, amount, cutoff + 1);
                    db.make_term(TermData::Pi { name: *name, domain, body })
                }
                TermData::Let { name, ty, def, body } => {
                    let ty = ty.shift(db, amount, cutoff);
                    let def = def.shift(db, amount, cutoff);
                    let body = body.shift(db, amount, cutoff + 1);
                    db.make_term(TermData::Let { name: *name, ty, def, body })
                }
                TermData::Opaque { name, args } => {
                    let args = args.iter().map(|a| a.shift(db, amount, cutoff)).collect();
                    db.make_term(TermData::Opaque { name: *name, args })
                }
                TermData::Free { .. }
                | TermData::Const { .. }
                | TermData::Sort { .. }
                | TermData::Meta { .. } => self.clone(),
            }
        })
    }
}

impl TermData {
    fn ambiguous(&self) -> bool {
        match self {
            TermData::Apply { .. }
            | TermData::Lambda { .. }
            | TermData::Pi { .. }
            | TermData::Let { .. } => true,
            TermData::Sort { level } => !level.is_zero(),
            TermData::Bound { .. }
            | TermData::Free { .. }
            | TermData::Const { .. }
            | TermData::Meta { .. }
            | TermData::Opaque { .. } => false,
        }
    }

    pub fn to_string_with_context(&self, mut ctx: Vector<Symbol>) -> String {
        match self {
            TermData::Lambda { name, domain, body } => {
                let domain_str = domain.data.to_string_with_context(ctx.clone());
                ctx.push_back(*name);
                let body = body.data.to_string_with_context(ctx);
                if domain.data.ambiguous() { format!("λ {}:({}). {}", name, domain_str, body) }
                else { format!("λ {}:{}. {}", name, domain_str, body) }
            }
            TermData::Pi { name, domain, body } => {
                let domain_str = domain.data.to_string_with_context(ctx.clone());
                ctx.push_back(*name);
                let body = body.data.to_string_with_context(ctx);
                if domain.data.ambiguous() { format!("Π {}:({}). {}", name, domain_str, body) }
                else { format!("Π {}:{}. {}", name, domain_str, body) }
            }
            TermData::Let { name, ty, def, body } => {
                let ty = ty.data.to_string_with_context(ctx.clone());
                let def = def.data.to_string_with_context(ctx.clone());
                ctx.push_back(*name);
                let body = body.data.to_string_with_context(ctx);
                format!("let {} : {} := {}; {}", name, ty, def, body)
            }
            TermData::Apply { fun, arg } => {
                let fun_str = fun.data.to_string_with_context(ctx.clone());
                let arg_str = arg.data.to_string_with_context(ctx);
                match (fun.is_apply() || !fun.data.ambiguous(), arg.data.ambiguous()) {
                    (true, true) => format!("{} ({})", fun_str, arg_str),
                    (true, false) => format!("{} {}", fun_str, arg_str),
                    (false, true) => format!("({}) ({})", fun_str, arg_str),
                    (false, false) => format!("({}) {}", fun_str, arg_str),
                }
            }
            TermData::Bound { index } => {
                let mut result = index.to_string();
                if ctx.len() > **index {
                    if let Some(var) = ctx.get(ctx.len() - **index - 1) {
                        result = var.to_string()
                    }
                }
                result
            }
            TermData::Free { id } => id.to_string(),
            TermData::Const { id, levels } => {
                if levels.is_empty() { id.to_string() }
                else {
                    let levels = levels.iter()
                        .map(|l| l.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{}.{{{}}}", id, levels)
                }
            }
            TermData::Sort { level } => {
                if level.is_zero() { "Prop".to_string() }
                else { format!("Sort {}", level) }
            }
            TermData::Meta { name } => format!("?{}", name),
            TermData::Opaque { name, args } => {
                let mut result = format!("[{}", name);
                for arg in args.iter() {
                    result.push(' ');
                    result.push_str(&arg.data.to_string_with_context(ctx.clone()));
                }
                result.push(']');
                result
            }
        }
    }
}

impl fmt::Display for TermData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_context(Vector::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[test]
    fn binders_close_over_their_own_index() {
        let db = &mut Database::new();
        let v0 = db.bound(0usize);
        let prop = db.prop();
        let identity = db.lambda(Symbol::from("x"), prop.clone(), v0.clone());
        assert!(identity.closed());
        assert_eq!(v0.bvar_range(), 1);

        let v2 = db.bound(2usize);
        let escaping = db.lambda(Symbol::from("x"), prop, v2);
        assert_eq!(escaping.bvar_range(), 2);
    }

    #[test]
    fn shift_respects_the_cutoff() {
        let db = &mut Database::new();
        let v0 = db.bound(0usize);
        let v1 = db.bound(1usize);
        let e = db.apply(v0.clone(), v1);
        let shifted = e.shift(db, 2, 1);
        let v3 = db.bound(3usize);
        let expected = db.apply(v0, v3);
        assert_eq!(shifted, expected);
    }

    #[test]
    fn shift_shares_subtrees_below_the_cutoff() {
        let db = &mut Database::new();
        let f = db.free("f");
        let v0 = db.bound(0usize);
        let inner = db.apply(f, v0);
        let prop = db.prop();
        let e = db.lambda(Symbol::from("x"), prop, inner.clone());
        // the lambda closes over its only variable, nothing to move
        let shifted = e.shift(db, 5, 0);
        assert_eq!(shifted, e);
    }

    #[test]
    fn display_resolves_binder_names() {
        let db = &mut Database::new();
        let v0 = db.bound(0usize);
        let prop = db.prop();
        let identity = db.lambda(Symbol::from("x"), prop, v0);
        assert_eq!(identity.data.to_string(), "λ x:Prop. x");

        let v5 = db.bound(5usize);
        assert_eq!(v5.data.to_string(), "5");
    }

    #[test]
    fn unfold_apps_recovers_the_spine() {
        let db = &mut Database::new();
        let f = db.free("f");
        let a = db.free("a");
        let b = db.free("b");
        let e = db.apply_spine(f.clone(), &[a.clone(), b.clone()]);
        let (head, args) = e.unfold_apps();
        assert_eq!(head, f);
        assert_eq!(args, vec![a, b]);
    }
}
