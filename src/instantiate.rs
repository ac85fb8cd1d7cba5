
use ahash::AHashMap;
use if_chain::if_chain;

use crate::database::Database;
use crate::level::*;
use crate::term::*;
use crate::utility::*;

/// Callback receiving `(old, new)` whenever the walker produces a rewritten
/// counterpart for a node it visited: composite rebuilds, bound-variable
/// reindexings, and replacements that had to be lifted. Fast-path returns,
/// memo hits, and replacements used verbatim never reach it.
pub type NodeObserver<'a> = dyn FnMut(&Term, &Term) + 'a;

/// Replace loose bound variable `i` with `subst[i]` for `i < subst.len()`
/// and shift higher indices down by the window size. A replacement is lifted
/// by the binder depth of the occurrence it fills, so its own loose
/// variables keep referring to the scope it was written in. Subtrees with no
/// variable in the affected range keep their allocation.
pub fn instantiate(db: &mut Database, e: &Term, subst: &[Term]) -> Term {
    instantiate_core(db, e, 0, subst, None)
}

/// One-element window: replace loose bound variable `0` with `sub`.
pub fn instantiate1(db: &mut Database, e: &Term, sub: &Term) -> Term {
    instantiate_core(db, e, 0, std::slice::from_ref(sub), None)
}

/// One-element window anchored at `at`: indices below `at` are untouched,
/// `at` is replaced, and higher indices drop by one.
pub fn instantiate_at(db: &mut Database, e: &Term, at: usize, sub: &Term) -> Term {
    instantiate_core(db, e, at, std::slice::from_ref(sub), None)
}

pub fn instantiate_with_observer(
    db: &mut Database,
    e: &Term,
    subst: &[Term],
    observer: &mut NodeObserver<'_>,
) -> Term {
    instantiate_core(db, e, 0, subst, Some(observer))
}

pub fn instantiate1_with_observer(
    db: &mut Database,
    e: &Term,
    sub: &Term,
    observer: &mut NodeObserver<'_>,
) -> Term {
    instantiate_core(db, e, 0, std::slice::from_ref(sub), Some(observer))
}

fn instantiate_core(
    db: &mut Database,
    e: &Term,
    start: usize,
    subst: &[Term],
    observer: Option<&mut NodeObserver<'_>>,
) -> Term {
    // an empty window replaces nothing and shifts nothing
    if subst.is_empty() {
        return e.clone();
    }
    let walker = Instantiator {
        db,
        subst,
        start,
        cache: AHashMap::new(),
        observer,
    };
    walker.run(e)
}

struct Instantiator<'a, 'e> {
    db: &'a mut Database,
    subst: &'a [Term],
    start: usize,
    cache: AHashMap<(Term, usize), Term>,
    observer: Option<&'a mut NodeObserver<'e>>,
}

impl<'a, 'e> Instantiator<'a, 'e> {
    fn run(mut self, e: &Term) -> Term {
        self.walk(e, 0)
    }

    fn walk(&mut self, e: &Term, depth: usize) -> Term {
        // no loose variable reaches the window or the range shifted above it
        if e.bvar_range() <= depth + self.start {
            return e.clone();
        }
        let key = (e.clone(), depth);
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let result = stacker::maybe_grow(crate::RED_ZONE, crate::STACK_CHUNK, || {
            self.step(e, depth)
        });
        self.cache.insert(key, result.clone());
        result
    }

    fn step(&mut self, e: &Term, depth: usize) -> Term {
        match &e.data {
            TermData::Bound { index } => {
                let index = **index;
                let base = depth + self.start;
                // the range test already filtered indices below the window
                if index < base + self.subst.len() {
                    let sub = self.subst[index - base].clone();
                    let lifted = sub.shift(self.db, depth, 0);
                    if lifted != sub {
                        self.emit(e, &lifted);
                    }
                    lifted
                } else {
                    let reindexed = self.db.bound(index - self.subst.len());
                    self.emit(e, &reindexed);
                    reindexed
                }
            }
            TermData::Apply { fun, arg } => {
                let new_fun = self.walk(fun, depth);
                let new_arg = self.walk(arg, depth);
                if new_fun == *fun && new_arg == *arg {
                    e.clone()
                } else {
                    let result = self.db.make_term(TermData::Apply { fun: new_fun, arg: new_arg });
                    self.emit(e, &result);
                    result
                }
            }
            TermData::Lambda { name, domain, body } => {
                let new_domain = self.walk(domain, depth);
                let new_body = self.walk(body, depth + 1);
                if new_domain == *domain && new_body == *body {
                    e.clone()
                } else {
                    let result = self.db.make_term(TermData::Lambda {
                        name: *name,
                        domain: new_domain,
                        body: new_body,
                    });
                    self.emit(e, &result);
                    result
                }
            }
            TermData::Pi { name, domain, body } => {
                let new_domain = self.walk(domain, depth);
                let new_body = self.walk(body, depth + 1);
                if new_domain == *domain && new_body == *body {
                    e.clone()
                } else {
                    let result = self.db.make_term(TermData::Pi {
                        name: *name,
                        domain: new_domain,
                        body: new_body,
                    });
                    self.emit(e, &result);
                    result
                }
            }
            TermData::Let { name, ty, def, body } => {
                let new_ty = self.walk(ty, depth);
                let new_def = self.walk(def, depth);
                let new_body = self.walk(body, depth + 1);
                if new_ty == *ty && new_def == *def && new_body == *body {
                    e.clone()
                } else {
                    let result = self.db.make_term(TermData::Let {
                        name: *name,
                        ty: new_ty,
                        def: new_def,
                        body: new_body,
                    });
                    self.emit(e, &result);
                    result
                }
            }
            TermData::Opaque { name, args } => {
                let new_args: Vec<Term> = args.iter().map(|a| self.walk(a, depth)).collect();
                if new_args == *args {
                    e.clone()
                } else {
                    let result = self.db.make_term(TermData::Opaque { name: *name, args: new_args });
                    self.emit(e, &result);
                    result
                }
            }
            // leaves without bound variables never get past the range test
            TermData::Free { .. }
            | TermData::Const { .. }
            | TermData::Sort { .. }
            | TermData::Meta { .. } => e.clone(),
        }
    }

    fn emit(&mut self, old: &Term, new: &Term) {
        if let Some(observer) = self.observer.as_mut() {
            observer(old, new);
        }
    }
}

/// Rewrite every universe level in `e` under the substitution pairing each
/// name in `ps` with the level of `ls` at the same position. The lists must
/// pair up; a mismatch is a caller bug and fails loudly. Subtrees mentioning
/// no parameter keep their allocation.
pub fn instantiate_params(db: &mut Database, e: &Term, ps: &[Symbol], ls: &[Univ]) -> Term {
    assert_eq!(ps.len(), ls.len(), "universe parameter and level lists must pair up");
    if ps.is_empty() || !e.has_univ_params() {
        return e.clone();
    }
    let mut cache = AHashMap::new();
    walk_params(db, &mut cache, e, ps, ls)
}

fn walk_params(
    db: &mut Database,
    cache: &mut AHashMap<Term, Term>,
    e: &Term,
    ps: &[Symbol],
    ls: &[Univ],
) -> Term {
    if !e.has_univ_params() {
        return e.clone();
    }
    if let Some(hit) = cache.get(e) {
        return hit.clone();
    }
    let result = stacker::maybe_grow(crate::RED_ZONE, crate::STACK_CHUNK, || {
        match &e.data {
            TermData::Sort { level } => {
                let level = level.instantiate(db, ps, ls);
                db.make_term(TermData::Sort { level })
            }
            TermData::Const { id, levels } => {
                let levels = levels.iter().map(|l| l.instantiate(db, ps, ls)).collect();
                db.make_term(TermData::Const { id: id.clone(), levels })
            }
            TermData::Apply { fun, arg } => {
                let fun = walk_params(db, cache, fun, ps, ls);
                let arg = walk_params(db, cache, arg, ps, ls);
                db.make_term(TermData::Apply { fun, arg })
            }
            TermData::Lambda { name, domain, body } => {
                let domain = walk_params(db, cache, domain, ps, ls);
                let body = walk_params(db, cache, body, ps, ls);
                db.make_term(TermData::Lambda { name: *name, domain, body })
            }
            TermData::Pi { name, domain, body } => {
                let domain = walk_params(db, cache, domain, ps, ls);
                let body = walk_params(db, cache, body, ps, ls);
                db.make_term(TermData::Pi { name: *name, domain, body })
            }
            TermData::Let { name, ty, def, body } => {
                let ty = walk_params(db, cache, ty, ps, ls);
                let def = walk_params(db, cache, def, ps, ls);
                let body = walk_params(db, cache, body, ps, ls);
                db.make_term(TermData::Let { name: *name, ty, def, body })
            }
            TermData::Opaque { name, args } => {
                let args = args.iter().map(|a| walk_params(db, cache, a, ps, ls)).collect();
                db.make_term(TermData::Opaque { name: *name, args })
            }
            // parameter-free leaves never get past the flag test
            TermData::Bound { .. }
            | TermData::Free { .. }
            | TermData::Meta { .. } => e.clone(),
        }
    });
    cache.insert(e.clone(), result.clone());
    result
}

/// Replace the named free variables listed in `ids` with bound variables:
/// `ids[j]` becomes index `depth + j` at binder depth `depth`. This is the
/// inverse of instantiating the same free variables in matching order.
pub fn abstract_locals(db: &mut Database, e: &Term, ids: &[Id]) -> Term {
    if ids.is_empty() || !e.has_frees() {
        return e.clone();
    }
    let mut cache = AHashMap::new();
    walk_abstract(db, &mut cache, e, ids, 0)
}

fn walk_abstract(
    db: &mut Database,
    cache: &mut AHashMap<(Term, usize), Term>,
    e: &Term,
    ids: &[Id],
    depth: usize,
) -> Term {
    if !e.has_frees() {
        return e.clone();
    }
    let key = (e.clone(), depth);
    if let Some(hit) = cache.get(&key) {
        return hit.clone();
    }
    let result = stacker::maybe_grow(crate::RED_ZONE, crate::STACK_CHUNK, || {
        match &e.data {
            TermData::Free { id } => {
                if_chain! {
                    if let Some(at) = ids.iter().position(|x| x == id);
                    then { db.bound(depth + at) }
                    else { e.clone() }
                }
            }
            TermData::Apply { fun, arg } => {
                let new_fun = walk_abstract(db, cache, fun, ids, depth);
                let new_arg = walk_abstract(db, cache, arg, ids, depth);
                if new_fun == *fun && new_arg == *arg { e.clone() }
                else { db.make_term(TermData::Apply { fun: new_fun, arg: new_arg }) }
            }
            TermData::Lambda { name, domain, body } => {
                let new_domain = walk_abstract(db, cache, domain, ids, depth);
                let new_body = walk_abstract(db, cache, body, ids, depth + 1);
                if new_domain == *domain && new_body == *body { e.clone() }
                else { db.make_term(TermData::Lambda { name: *name, domain: new_domain, body: new_body }) }
            }
            TermData::Pi { name, domain, body } => {
                let new_domain = walk_abstract(db, cache, domain, ids, depth);
                let new_body = walk_abstract(db, cache, body, ids, depth + 1);
                if new_domain == *domain && new_body == *body { e.clone() }
                else { db.make_term(TermData::Pi { name: *name, domain: new_domain, body: new_body }) }
            }
            TermData::Let { name, ty, def, body } => {
                let new_ty = walk_abstract(db, cache, ty, ids, depth);
                let new_def = walk_abstract(db, cache, def, ids, depth);
                let new_body = walk_abstract(db, cache, body, ids, depth + 1);
                if new_ty == *ty && new_def == *def && new_body == *body { e.clone() }
                else { db.make_term(TermData::Let { name: *name, ty: new_ty, def: new_def, body: new_body }) }
            }
            TermData::Opaque { name, args } => {
                let new_args: Vec<Term> = args.iter()
                    .map(|a| walk_abstract(db, cache, a, ids, depth))
                    .collect();
                if new_args == *args { e.clone() }
                else { db.make_term(TermData::Opaque { name: *name, args: new_args }) }
            }
            TermData::Bound { .. }
            | TermData::Const { .. }
            | TermData::Sort { .. }
            | TermData::Meta { .. } => e.clone(),
        }
    });
    cache.insert(key, result.clone());
    result
}
