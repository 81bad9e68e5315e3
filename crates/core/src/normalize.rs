//! β/η-normalization, α-normalization, and the variable algebra they share.
//!
//! `shift`/`subst` implement capture-avoiding substitution over label +
//! de Bruijn index variable pairs. Normalization is total: the calculus has
//! no recursion, so every reduction sequence terminates. Record fields are
//! ordered by label here, so expressions that differ only in field
//! declaration order share a normal form.

use crate::ast::{Const, Expr, Var};

/// User-supplied reduction rules, consulted at application nodes after the
/// built-in rules have run. Returning `None` leaves the node untouched; a
/// returned replacement is normalized again.
pub trait CustomNormalizer {
    fn reduce(&self, expr: &Expr) -> Option<Expr>;
}

/// Shift by `delta` every free occurrence of `name` whose index is at least
/// `cutoff`.
pub fn shift(delta: isize, name: &str, cutoff: usize, expr: &Expr) -> Expr {
    match expr {
        Expr::Var(v) => {
            if v.name == name && v.index >= cutoff {
                Expr::Var(Var {
                    name: v.name.clone(),
                    index: (v.index as isize + delta) as usize,
                })
            } else {
                Expr::Var(v.clone())
            }
        }
        Expr::Lam(x, a, b) => {
            let cutoff_b = if x == name { cutoff + 1 } else { cutoff };
            Expr::Lam(
                x.clone(),
                Box::new(shift(delta, name, cutoff, a)),
                Box::new(shift(delta, name, cutoff_b, b)),
            )
        }
        Expr::Pi(x, a, b) => {
            let cutoff_b = if x == name { cutoff + 1 } else { cutoff };
            Expr::Pi(
                x.clone(),
                Box::new(shift(delta, name, cutoff, a)),
                Box::new(shift(delta, name, cutoff_b, b)),
            )
        }
        Expr::Let(x, t, v, b) => {
            let cutoff_b = if x == name { cutoff + 1 } else { cutoff };
            Expr::Let(
                x.clone(),
                t.as_ref().map(|t| Box::new(shift(delta, name, cutoff, t))),
                Box::new(shift(delta, name, cutoff, v)),
                Box::new(shift(delta, name, cutoff_b, b)),
            )
        }
        other => map_subexpressions(other, &|e| shift(delta, name, cutoff, e)),
    }
}

/// Substitute `value` for the variable `name@index`.
pub fn subst(name: &str, index: usize, value: &Expr, expr: &Expr) -> Expr {
    match expr {
        Expr::Var(v) => {
            if v.name == name && v.index == index {
                value.clone()
            } else {
                Expr::Var(v.clone())
            }
        }
        Expr::Lam(x, a, b) => {
            let value_b = shift(1, x, 0, value);
            let index_b = if x == name { index + 1 } else { index };
            Expr::Lam(
                x.clone(),
                Box::new(subst(name, index, value, a)),
                Box::new(subst(name, index_b, &value_b, b)),
            )
        }
        Expr::Pi(x, a, b) => {
            let value_b = shift(1, x, 0, value);
            let index_b = if x == name { index + 1 } else { index };
            Expr::Pi(
                x.clone(),
                Box::new(subst(name, index, value, a)),
                Box::new(subst(name, index_b, &value_b, b)),
            )
        }
        Expr::Let(x, t, v, b) => {
            let value_b = shift(1, x, 0, value);
            let index_b = if x == name { index + 1 } else { index };
            Expr::Let(
                x.clone(),
                t.as_ref().map(|t| Box::new(subst(name, index, value, t))),
                Box::new(subst(name, index, value, v)),
                Box::new(subst(name, index_b, &value_b, b)),
            )
        }
        other => map_subexpressions(other, &|e| subst(name, index, value, e)),
    }
}

/// Apply `f` to every immediate sub-expression of a non-binding node.
fn map_subexpressions(expr: &Expr, f: &dyn Fn(&Expr) -> Expr) -> Expr {
    match expr {
        Expr::Const(_)
        | Expr::Var(_)
        | Expr::Bool
        | Expr::BoolLit(_)
        | Expr::Integer
        | Expr::IntegerLit(_)
        | Expr::Text
        | Expr::TextLit(_)
        | Expr::List
        | Expr::Embed(_) => expr.clone(),
        Expr::Lam(x, a, b) => Expr::Lam(x.clone(), Box::new(f(a)), Box::new(f(b))),
        Expr::Pi(x, a, b) => Expr::Pi(x.clone(), Box::new(f(a)), Box::new(f(b))),
        Expr::App(g, a) => Expr::App(Box::new(f(g)), Box::new(f(a))),
        Expr::Let(x, t, v, b) => Expr::Let(
            x.clone(),
            t.as_ref().map(|t| Box::new(f(t))),
            Box::new(f(v)),
            Box::new(f(b)),
        ),
        Expr::Annot(e, t) => Expr::Annot(Box::new(f(e)), Box::new(f(t))),
        Expr::BoolAnd(l, r) => Expr::BoolAnd(Box::new(f(l)), Box::new(f(r))),
        Expr::BoolOr(l, r) => Expr::BoolOr(Box::new(f(l)), Box::new(f(r))),
        Expr::BoolEq(l, r) => Expr::BoolEq(Box::new(f(l)), Box::new(f(r))),
        Expr::ListLit(t, xs) => Expr::ListLit(
            t.as_ref().map(|t| Box::new(f(t))),
            xs.iter().map(|x| f(x)).collect(),
        ),
        Expr::RecordType(fields) => {
            Expr::RecordType(fields.iter().map(|(k, v)| (k.clone(), f(v))).collect())
        }
        Expr::RecordLit(fields) => {
            Expr::RecordLit(fields.iter().map(|(k, v)| (k.clone(), f(v))).collect())
        }
        Expr::Field(e, k) => Expr::Field(Box::new(f(e)), k.clone()),
        Expr::ImportAlt(l, r) => Expr::ImportAlt(Box::new(f(l)), Box::new(f(r))),
    }
}

/// β/η-normalize with the built-in rules only.
pub fn normalize(expr: &Expr) -> Expr {
    normalize_with(None, expr)
}

/// β/η-normalize, consulting `normalizer` at application nodes that the
/// built-in rules leave untouched.
pub fn normalize_with(normalizer: Option<&dyn CustomNormalizer>, expr: &Expr) -> Expr {
    match expr {
        Expr::App(f, a) => match normalize_with(normalizer, f) {
            Expr::Lam(x, _, body) => {
                let a = shift(1, &x, 0, a);
                let body = subst(&x, 0, &a, &body);
                let body = shift(-1, &x, 0, &body);
                normalize_with(normalizer, &body)
            }
            f => {
                let a = normalize_with(normalizer, a);
                let app = Expr::App(Box::new(f), Box::new(a));
                if let Some(custom) = normalizer {
                    if let Some(reduced) = custom.reduce(&app) {
                        return normalize_with(normalizer, &reduced);
                    }
                }
                app
            }
        },
        Expr::Let(x, _, v, b) => {
            let v = shift(1, x, 0, v);
            let b = subst(x, 0, &v, b);
            let b = shift(-1, x, 0, &b);
            normalize_with(normalizer, &b)
        }
        Expr::Annot(e, t) => {
            let e = normalize_with(normalizer, e);
            // an empty list keeps its element type, or nothing downstream
            // could re-check it
            if let Expr::ListLit(None, items) = &e {
                if items.is_empty() {
                    if let Expr::App(g, element) = normalize_with(normalizer, t) {
                        if *g == Expr::List {
                            return Expr::ListLit(Some(element), Vec::new());
                        }
                    }
                }
            }
            e
        }
        Expr::Lam(x, a, b) => {
            let domain = normalize_with(normalizer, a);
            let body = normalize_with(normalizer, b);
            // η: λ(x : T) → f x reduces to f when x is not free in f
            if let Expr::App(f, argument) = &body {
                let applies_binder =
                    matches!(&**argument, Expr::Var(v) if v.name == *x && v.index == 0);
                if applies_binder && !mentions_var(f, x, 0) {
                    return shift(-1, x, 0, f);
                }
            }
            Expr::Lam(x.clone(), Box::new(domain), Box::new(body))
        }
        Expr::Pi(x, a, b) => Expr::Pi(
            x.clone(),
            Box::new(normalize_with(normalizer, a)),
            Box::new(normalize_with(normalizer, b)),
        ),
        Expr::BoolAnd(l, r) => {
            let l = normalize_with(normalizer, l);
            let r = normalize_with(normalizer, r);
            match (l, r) {
                (Expr::BoolLit(true), r) => r,
                (Expr::BoolLit(false), _) => Expr::BoolLit(false),
                (l, Expr::BoolLit(true)) => l,
                (_, Expr::BoolLit(false)) => Expr::BoolLit(false),
                (l, r) if l == r => l,
                (l, r) => Expr::BoolAnd(Box::new(l), Box::new(r)),
            }
        }
        Expr::BoolOr(l, r) => {
            let l = normalize_with(normalizer, l);
            let r = normalize_with(normalizer, r);
            match (l, r) {
                (Expr::BoolLit(false), r) => r,
                (Expr::BoolLit(true), _) => Expr::BoolLit(true),
                (l, Expr::BoolLit(false)) => l,
                (_, Expr::BoolLit(true)) => Expr::BoolLit(true),
                (l, r) if l == r => l,
                (l, r) => Expr::BoolOr(Box::new(l), Box::new(r)),
            }
        }
        Expr::BoolEq(l, r) => {
            let l = normalize_with(normalizer, l);
            let r = normalize_with(normalizer, r);
            match (l, r) {
                (Expr::BoolLit(true), r) => r,
                (l, Expr::BoolLit(true)) => l,
                (l, r) if l == r => Expr::BoolLit(true),
                (l, r) => Expr::BoolEq(Box::new(l), Box::new(r)),
            }
        }
        Expr::ListLit(t, xs) => {
            if xs.is_empty() {
                Expr::ListLit(
                    t.as_ref()
                        .map(|t| Box::new(normalize_with(normalizer, t))),
                    Vec::new(),
                )
            } else {
                Expr::ListLit(
                    None,
                    xs.iter().map(|x| normalize_with(normalizer, x)).collect(),
                )
            }
        }
        Expr::RecordType(fields) => {
            let mut fields: Vec<(String, Expr)> = fields
                .iter()
                .map(|(k, v)| (k.clone(), normalize_with(normalizer, v)))
                .collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            Expr::RecordType(fields)
        }
        Expr::RecordLit(fields) => {
            let mut fields: Vec<(String, Expr)> = fields
                .iter()
                .map(|(k, v)| (k.clone(), normalize_with(normalizer, v)))
                .collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            Expr::RecordLit(fields)
        }
        Expr::Field(e, k) => {
            let e = normalize_with(normalizer, e);
            if let Expr::RecordLit(fields) = &e {
                if let Some((_, v)) = fields.iter().find(|(name, _)| name == k) {
                    return v.clone();
                }
            }
            Expr::Field(Box::new(e), k.clone())
        }
        Expr::ImportAlt(l, _) => normalize_with(normalizer, l),
        Expr::Const(c) => Expr::Const(*c),
        Expr::Var(v) => Expr::Var(v.clone()),
        Expr::Bool => Expr::Bool,
        Expr::BoolLit(b) => Expr::BoolLit(*b),
        Expr::Integer => Expr::Integer,
        Expr::IntegerLit(n) => Expr::IntegerLit(*n),
        Expr::Text => Expr::Text,
        Expr::TextLit(s) => Expr::TextLit(s.clone()),
        Expr::List => Expr::List,
        Expr::Embed(import) => Expr::Embed(import.clone()),
    }
}

/// Rename every binder to `_`, adjusting indices, so that expressions that
/// differ only in bound-variable names become identical. Hashing and the
/// on-disk cache operate on α-normal forms.
pub fn alpha_normalize(expr: &Expr) -> Expr {
    match expr {
        Expr::Lam(x, a, b) => Expr::Lam(
            "_".to_string(),
            Box::new(alpha_normalize(a)),
            Box::new(alpha_normalize(&rename_to_underscore(x, b))),
        ),
        Expr::Pi(x, a, b) => Expr::Pi(
            "_".to_string(),
            Box::new(alpha_normalize(a)),
            Box::new(alpha_normalize(&rename_to_underscore(x, b))),
        ),
        Expr::Let(x, t, v, b) => Expr::Let(
            "_".to_string(),
            t.as_ref().map(|t| Box::new(alpha_normalize(t))),
            Box::new(alpha_normalize(v)),
            Box::new(alpha_normalize(&rename_to_underscore(x, b))),
        ),
        other => map_subexpressions(other, &alpha_normalize),
    }
}

/// Does `name@index` occur free in `expr`?
fn mentions_var(expr: &Expr, name: &str, index: usize) -> bool {
    match expr {
        Expr::Var(v) => v.name == name && v.index == index,
        Expr::Lam(x, a, b) | Expr::Pi(x, a, b) => {
            let index_b = if x == name { index + 1 } else { index };
            mentions_var(a, name, index) || mentions_var(b, name, index_b)
        }
        Expr::Let(x, t, v, b) => {
            let index_b = if x == name { index + 1 } else { index };
            t.as_ref().is_some_and(|t| mentions_var(t, name, index))
                || mentions_var(v, name, index)
                || mentions_var(b, name, index_b)
        }
        Expr::App(f, a) => mentions_var(f, name, index) || mentions_var(a, name, index),
        Expr::Annot(e, t) => mentions_var(e, name, index) || mentions_var(t, name, index),
        Expr::BoolAnd(l, r)
        | Expr::BoolOr(l, r)
        | Expr::BoolEq(l, r)
        | Expr::ImportAlt(l, r) => {
            mentions_var(l, name, index) || mentions_var(r, name, index)
        }
        Expr::ListLit(t, xs) => {
            t.as_ref().is_some_and(|t| mentions_var(t, name, index))
                || xs.iter().any(|x| mentions_var(x, name, index))
        }
        Expr::RecordType(fields) | Expr::RecordLit(fields) => {
            fields.iter().any(|(_, v)| mentions_var(v, name, index))
        }
        Expr::Field(e, _) => mentions_var(e, name, index),
        Expr::Const(_)
        | Expr::Bool
        | Expr::BoolLit(_)
        | Expr::Integer
        | Expr::IntegerLit(_)
        | Expr::Text
        | Expr::TextLit(_)
        | Expr::List
        | Expr::Embed(_) => false,
    }
}

/// Rewrite the body of a binder named `x` as if the binder were named `_`.
fn rename_to_underscore(x: &str, body: &Expr) -> Expr {
    if x == "_" {
        return body.clone();
    }
    let body = shift(1, "_", 0, body);
    let body = subst(x, 0, &Expr::Var(Var::new("_", 0)), &body);
    shift(-1, x, 0, &body)
}

/// The universe constant a normalized expression is, if it is one.
pub fn as_const(expr: &Expr) -> Option<Const> {
    match expr {
        Expr::Const(c) => Some(*c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Var(Var::new(name, 0))
    }

    fn lam(x: &str, a: Expr, b: Expr) -> Expr {
        Expr::Lam(x.to_string(), Box::new(a), Box::new(b))
    }

    #[test]
    fn beta_reduces_application() {
        let id = lam("x", Expr::Bool, var("x"));
        let applied = Expr::App(Box::new(id), Box::new(Expr::BoolLit(true)));
        assert_eq!(normalize(&applied), Expr::BoolLit(true));
    }

    #[test]
    fn beta_reduction_avoids_capture() {
        // (λ(x : Bool) → λ(y : Bool) → x) y  ⇒  λ(y : Bool) → y@1
        let inner = lam("y", Expr::Bool, var("x"));
        let outer = lam("x", Expr::Bool, inner);
        let applied = Expr::App(Box::new(outer), Box::new(var("y")));
        let expected = lam("y", Expr::Bool, Expr::Var(Var::new("y", 1)));
        assert_eq!(normalize(&applied), expected);
    }

    #[test]
    fn let_substitutes_value() {
        let e = Expr::Let(
            "x".to_string(),
            None,
            Box::new(Expr::IntegerLit(2)),
            Box::new(var("x")),
        );
        assert_eq!(normalize(&e), Expr::IntegerLit(2));
    }

    #[test]
    fn bool_operators_fold() {
        let t = Expr::BoolLit(true);
        let f = Expr::BoolLit(false);
        let and = Expr::BoolAnd(Box::new(t.clone()), Box::new(f.clone()));
        assert_eq!(normalize(&and), Expr::BoolLit(false));
        let eq = Expr::BoolEq(Box::new(f.clone()), Box::new(f.clone()));
        assert_eq!(normalize(&eq), Expr::BoolLit(true));
    }

    #[test]
    fn equality_with_free_variable_stays_symbolic() {
        let e = Expr::BoolEq(Box::new(var("x")), Box::new(Expr::BoolLit(false)));
        assert_eq!(normalize(&e), e);
    }

    #[test]
    fn eta_reduces_a_wrapped_application() {
        // λ(x : Bool) → f x  ⇒  f
        let wrapped = lam(
            "x",
            Expr::Bool,
            Expr::App(Box::new(var("f")), Box::new(var("x"))),
        );
        assert_eq!(normalize(&wrapped), var("f"));
    }

    #[test]
    fn eta_leaves_functions_that_use_their_binder() {
        // λ(x : Bool) → (g x) x has x free in the applied function
        let body = Expr::App(
            Box::new(Expr::App(Box::new(var("g")), Box::new(var("x")))),
            Box::new(var("x")),
        );
        let e = lam("x", Expr::Bool, body);
        assert_eq!(normalize(&e), e);
    }

    #[test]
    fn eta_adjusts_indices_past_the_removed_binder() {
        // λ(f : Bool → Bool) → λ(f : Bool) → f@1 f  ⇒  λ(f : Bool → Bool) → f
        let arrow = Expr::Pi("_".to_string(), Box::new(Expr::Bool), Box::new(Expr::Bool));
        let inner = lam(
            "f",
            Expr::Bool,
            Expr::App(
                Box::new(Expr::Var(Var::new("f", 1))),
                Box::new(var("f")),
            ),
        );
        let outer = lam("f", arrow.clone(), inner);
        assert_eq!(normalize(&outer), lam("f", arrow, var("f")));
    }

    #[test]
    fn record_fields_normalize_into_label_order() {
        let written = Expr::RecordLit(vec![
            ("zeta".to_string(), Expr::BoolLit(true)),
            ("alpha".to_string(), Expr::IntegerLit(1)),
        ]);
        let sorted = Expr::RecordLit(vec![
            ("alpha".to_string(), Expr::IntegerLit(1)),
            ("zeta".to_string(), Expr::BoolLit(true)),
        ]);
        assert_eq!(normalize(&written), sorted);
    }

    #[test]
    fn alpha_normalize_renames_binders() {
        let named = lam("x", Expr::Bool, var("x"));
        let underscored = lam("_", Expr::Bool, var("_"));
        assert_eq!(alpha_normalize(&named), underscored);
    }

    #[test]
    fn alpha_normalize_preserves_distinct_binders() {
        // λ(a : Type) → λ(x : a) → x  and  λ(b : Type) → λ(y : b) → y
        let first = Expr::Lam(
            "a".to_string(),
            Box::new(Expr::Const(Const::Type)),
            Box::new(lam("x", var("a"), var("x"))),
        );
        let second = Expr::Lam(
            "b".to_string(),
            Box::new(Expr::Const(Const::Type)),
            Box::new(lam("y", var("b"), var("y"))),
        );
        assert_eq!(alpha_normalize(&first), alpha_normalize(&second));
    }

    struct Reverse;

    impl CustomNormalizer for Reverse {
        fn reduce(&self, expr: &Expr) -> Option<Expr> {
            match expr {
                Expr::App(f, a) if **f == Expr::Var(Var::new("reverse", 0)) => match &**a {
                    Expr::TextLit(s) => Some(Expr::TextLit(s.chars().rev().collect())),
                    _ => None,
                },
                _ => None,
            }
        }
    }

    #[test]
    fn custom_normalizer_rewrites_applications() {
        let call = Expr::App(
            Box::new(var("reverse")),
            Box::new(Expr::TextLit("abc".to_string())),
        );
        assert_eq!(
            normalize_with(Some(&Reverse), &call),
            Expr::TextLit("cba".to_string())
        );
    }
}
