
use ahash::AHashMap;

use crate::database::Database;
use crate::instantiate::instantiate;
use crate::term::*;

/// True when the outermost structure of `t` is a redex: an application whose
/// unfolded head is a lambda. Allocates nothing.
pub fn is_head_beta(t: &Term) -> bool {
    match &t.data {
        TermData::Apply { fun, .. } => {
            let mut head = fun;
            while let TermData::Apply { fun, .. } = &head.data {
                head = fun;
            }
            head.is_lambda()
        }
        _ => false,
    }
}

/// Apply `f` to `args`, consuming as many leading lambdas as the arguments
/// saturate in one batched substitution. Leftover arguments are reapplied on
/// top of the reduced body; leftover lambdas stay in place. A non-lambda `f`
/// just gets the plain application spine.
pub fn apply_beta(db: &mut Database, f: &Term, args: &[Term]) -> Term {
    if args.is_empty() {
        return f.clone();
    }
    let mut consumed = 0;
    let mut body = f;
    while consumed < args.len() {
        match &body.data {
            TermData::Lambda { body: inner, .. } => {
                body = inner;
                consumed += 1;
            }
            _ => break,
        }
    }
    if consumed == 0 {
        return db.apply_spine(f.clone(), args);
    }
    // the innermost consumed binder pairs with the last consumed argument
    let window: Vec<Term> = args[..consumed].iter().rev().cloned().collect();
    let body = body.clone();
    let reduced = instantiate(db, &body, &window);
    db.apply_spine(reduced, &args[consumed..])
}

/// Contract the redex at the head position, leaving every other subterm
/// untouched. A term that is not a head-redex comes back unchanged
/// (pointer-identical); callers that need the stricter contract can guard
/// with `is_head_beta`.
pub fn head_beta_reduce(db: &mut Database, t: &Term) -> Term {
    if !is_head_beta(t) {
        return t.clone();
    }
    let (head, args) = t.unfold_apps();
    apply_beta(db, &head, &args)
}

/// Beta-normal form under a deterministic head-first strategy: contract head
/// redexes until none remains, then normalize children, re-checking the head
/// whenever rebuilding an application exposes a new redex. Diverges on terms
/// with no beta-normal form; bounding is the caller's concern.
pub fn beta_reduce(db: &mut Database, t: &Term) -> Term {
    let mut cache = AHashMap::new();
    reduce(db, &mut cache, t)
}

fn reduce(db: &mut Database, cache: &mut AHashMap<Term, Term>, t: &Term) -> Term {
    if let Some(hit) = cache.get(t) {
        return hit.clone();
    }
    let mut head = t.clone();
    while is_head_beta(&head) {
        head = head_beta_reduce(db, &head);
        log::trace!("head redex contracted to {}", head.data);
    }
    let result = stacker::maybe_grow(crate::RED_ZONE, crate::STACK_CHUNK, || {
        match &head.data {
            TermData::Apply { fun, arg } => {
                let new_fun = reduce(db, cache, fun);
                let new_arg = reduce(db, cache, arg);
                let rebuilt = if new_fun == *fun && new_arg == *arg {
                    head.clone()
                } else {
                    db.apply(new_fun, new_arg)
                };
                if is_head_beta(&rebuilt) {
                    reduce(db, cache, &rebuilt)
                } else {
                    rebuilt
                }
            }
            TermData::Lambda { name, domain, body } => {
                let new_domain = reduce(db, cache, domain);
                let new_body = reduce(db, cache, body);
                if new_domain == *domain && new_body == *body {
                    head.clone()
                } else {
                    db.lambda(*name, new_domain, new_body)
                }
            }
            TermData::Pi { name, domain, body } => {
                let new_domain = reduce(db, cache, domain);
                let new_body = reduce(db, cache, body);
                if new_domain == *domain && new_body == *body {
                    head.clone()
                } else {
                    db.pi(*name, new_domain, new_body)
                }
            }
            TermData::Let { name, ty, def, body } => {
                let new_ty = reduce(db, cache, ty);
                let new_def = reduce(db, cache, def);
                let new_body = reduce(db, cache, body);
                if new_ty == *ty && new_def == *def && new_body == *body {
                    head.clone()
                } else {
                    db.let_bind(*name, new_ty, new_def, new_body)
                }
            }
            TermData::Opaque { name, args } => {
                let new_args: Vec<Term> = args.iter().map(|a| reduce(db, cache, a)).collect();
                if new_args == *args {
                    head.clone()
                } else {
                    db.opaque(*name, new_args)
                }
            }
            TermData::Bound { .. }
            | TermData::Free { .. }
            | TermData::Const { .. }
            | TermData::Sort { .. }
            | TermData::Meta { .. } => head.clone(),
        }
    });
    cache.insert(t.clone(), result.clone());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::Symbol;

    fn binder(db: &mut Database, name: &str, body: Term) -> Term {
        let domain = db.prop();
        db.lambda(Symbol::from(name), domain, body)
    }

    /// λ f. λ x. f (f ... (f x))
    fn church(db: &mut Database, n: usize) -> Term {
        let mut body = db.bound(0usize);
        for _ in 0..n {
            let f = db.bound(1usize);
            body = db.apply(f, body);
        }
        let inner = binder(db, "x", body);
        binder(db, "f", inner)
    }

    #[test]
    fn head_redex_detection() {
        let db = &mut Database::new();
        let c = db.free("c");
        let v0 = db.bound(0usize);
        let identity = binder(db, "x", v0.clone());
        let redex = db.apply(identity.clone(), c.clone());
        assert!(is_head_beta(&redex));

        let stuck = db.apply(v0, c.clone());
        assert!(!is_head_beta(&stuck));
        assert!(!is_head_beta(&identity));
        assert!(!is_head_beta(&c));

        // the lambda head is found under nested applications
        let d = db.free("d");
        let nested = db.apply(redex, d);
        assert!(is_head_beta(&nested));
    }

    #[test]
    fn identity_application_contracts() {
        let db = &mut Database::new();
        let c = db.free("c");
        let v0 = db.bound(0usize);
        let identity = binder(db, "x", v0);
        let redex = db.apply(identity, c.clone());
        assert_eq!(head_beta_reduce(db, &redex), c);
    }

    #[test]
    fn head_reduction_is_identity_off_redexes() {
        let db = &mut Database::new();
        let c = db.free("c");
        let a = db.free("a");
        let stuck = db.apply(c, a);
        assert_eq!(head_beta_reduce(db, &stuck), stuck);
    }

    #[test]
    fn two_arguments_substitute_in_one_batch() {
        let db = &mut Database::new();
        let a = db.free("a");
        let b = db.free("b");
        let v1 = db.bound(1usize);
        let v0 = db.bound(0usize);
        let body = db.apply(v1, v0);
        let inner = binder(db, "y", body);
        let f = binder(db, "x", inner);
        let result = apply_beta(db, &f, &[a.clone(), b.clone()]);
        let expected = db.apply(a, b);
        assert_eq!(result, expected);
    }

    #[test]
    fn leftover_arguments_are_reapplied() {
        let db = &mut Database::new();
        let a = db.free("a");
        let b = db.free("b");
        let v0 = db.bound(0usize);
        let identity = binder(db, "x", v0);
        let result = apply_beta(db, &identity, &[a.clone(), b.clone()]);
        let expected = db.apply(a, b);
        assert_eq!(result, expected);
    }

    #[test]
    fn leftover_binders_stay_in_place() {
        let db = &mut Database::new();
        let a = db.free("a");
        let v1 = db.bound(1usize);
        let v0 = db.bound(0usize);
        let body = db.apply(v1, v0);
        let inner = binder(db, "y", body);
        let f = binder(db, "x", inner);
        let result = apply_beta(db, &f, &[a.clone()]);
        let v0 = db.bound(0usize);
        let applied = db.apply(a, v0);
        let expected = binder(db, "y", applied);
        assert_eq!(result, expected);
    }

    #[test]
    fn non_lambda_heads_build_a_spine() {
        let db = &mut Database::new();
        let c = db.free("c");
        let a = db.free("a");
        let result = apply_beta(db, &c, &[a.clone()]);
        let expected = db.apply(c, a);
        assert_eq!(result, expected);
    }

    #[test]
    fn reduction_goes_under_binders_once_the_head_is_stable() {
        let db = &mut Database::new();
        let v0 = db.bound(0usize);
        let identity = binder(db, "y", v0.clone());
        let inner_redex = db.apply(identity, v0);
        let e = binder(db, "x", inner_redex);
        let result = beta_reduce(db, &e);
        let v0 = db.bound(0usize);
        let expected = binder(db, "x", v0);
        assert_eq!(result, expected);
    }

    #[test]
    fn church_arithmetic_normalizes() {
        let db = &mut Database::new();
        let two = church(db, 2);
        let four = church(db, 4);

        // λ m. λ n. λ f. λ x. m f (n f x)
        let m = db.bound(3usize);
        let f = db.bound(1usize);
        let mf = db.apply(m, f);
        let n = db.bound(2usize);
        let f = db.bound(1usize);
        let x = db.bound(0usize);
        let nf = db.apply(n, f);
        let nfx = db.apply(nf, x);
        let body = db.apply(mf, nfx);
        let add = {
            let i1 = binder(db, "x", body);
            let i2 = binder(db, "f", i1);
            let i3 = binder(db, "n", i2);
            binder(db, "m", i3)
        };

        let sum = db.apply_spine(add, &[two.clone(), two]);
        let result = beta_reduce(db, &sum);
        assert_eq!(result, four);
    }

    #[test]
    fn beta_reduction_is_idempotent() {
        let db = &mut Database::new();
        let two = church(db, 2);
        let three = church(db, 3);
        let f = db.free("f");
        let c = db.free("c");
        // (2 3) f c : church exponentiation, nine applications of f
        let power = db.apply(two, three);
        let e = db.apply_spine(power, &[f.clone(), c.clone()]);
        let once = beta_reduce(db, &e);
        let twice = beta_reduce(db, &once);
        assert_eq!(once, twice);
        let mut expected = c;
        for _ in 0..9 {
            expected = db.apply(f.clone(), expected);
        }
        assert_eq!(once, expected);
    }

    #[test]
    fn nested_redexes_collapse() {
        let db = &mut Database::new();
        let c = db.free("c");
        let v0 = db.bound(0usize);
        let identity = binder(db, "x", v0);
        let redex = db.apply(identity, c.clone());
        let shared = db.apply(redex.clone(), redex);
        let result = beta_reduce(db, &shared);
        let expected = db.apply(c.clone(), c);
        assert_eq!(result, expected);
    }
}
