//! Expression tree for the Timbre configuration calculus.
//!
//! The import resolver only inspects two nodes structurally -- the import
//! leaf ([`Expr::Embed`]) and the alternative operator ([`Expr::ImportAlt`]);
//! everything else is walked homomorphically. A fully resolved expression
//! contains neither.

use std::fmt;

use crate::import::Import;

/// Universe constants. `Type` classifies ordinary types, `Kind` classifies
/// `Type` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Const {
    Type,
    Kind,
}

/// A variable occurrence: a label plus a de Bruijn index disambiguating
/// shadowed binders of the same label (`x@0` is the innermost `x`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var {
    pub name: String,
    pub index: usize,
}

impl Var {
    pub fn new(name: impl Into<String>, index: usize) -> Var {
        Var {
            name: name.into(),
            index,
        }
    }
}

/// A Timbre expression.
///
/// Record fields are kept in declaration order so the import resolver's
/// side effects (fetches, cache writes) run left to right exactly as
/// written; normalization and the canonical codec order fields by label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Const(Const),
    Var(Var),
    /// `λ(x : A) → b`
    Lam(String, Box<Expr>, Box<Expr>),
    /// `∀(x : A) → B`; `A → B` is the non-dependent rendering with label `_`.
    Pi(String, Box<Expr>, Box<Expr>),
    App(Box<Expr>, Box<Expr>),
    /// `let x : A = v in b` (the annotation is optional)
    Let(String, Option<Box<Expr>>, Box<Expr>, Box<Expr>),
    /// `e : T`
    Annot(Box<Expr>, Box<Expr>),
    Bool,
    BoolLit(bool),
    BoolAnd(Box<Expr>, Box<Expr>),
    BoolOr(Box<Expr>, Box<Expr>),
    BoolEq(Box<Expr>, Box<Expr>),
    Integer,
    IntegerLit(i64),
    Text,
    TextLit(String),
    List,
    /// List literal; the annotation slot carries the element type of an
    /// empty literal (`[] : List T` fills it during type checking).
    ListLit(Option<Box<Expr>>, Vec<Expr>),
    RecordType(Vec<(String, Expr)>),
    RecordLit(Vec<(String, Expr)>),
    Field(Box<Expr>, String),
    /// `a ? b` -- fall back to `b` when resolving `a` raises missing imports.
    ImportAlt(Box<Expr>, Box<Expr>),
    Embed(Import),
}

impl Expr {
    /// True when the expression contains no import leaves.
    pub fn is_resolved(&self) -> bool {
        match self {
            Expr::Embed(_) => false,
            Expr::Const(_)
            | Expr::Var(_)
            | Expr::Bool
            | Expr::BoolLit(_)
            | Expr::Integer
            | Expr::IntegerLit(_)
            | Expr::Text
            | Expr::TextLit(_)
            | Expr::List => true,
            Expr::Lam(_, a, b) | Expr::Pi(_, a, b) => a.is_resolved() && b.is_resolved(),
            Expr::App(f, a) => f.is_resolved() && a.is_resolved(),
            Expr::Let(_, t, v, b) => {
                t.as_ref().map_or(true, |t| t.is_resolved()) && v.is_resolved() && b.is_resolved()
            }
            Expr::Annot(e, t) => e.is_resolved() && t.is_resolved(),
            Expr::BoolAnd(l, r) | Expr::BoolOr(l, r) | Expr::BoolEq(l, r) => {
                l.is_resolved() && r.is_resolved()
            }
            Expr::ListLit(t, xs) => {
                t.as_ref().map_or(true, |t| t.is_resolved()) && xs.iter().all(Expr::is_resolved)
            }
            Expr::RecordType(fs) | Expr::RecordLit(fs) => {
                fs.iter().all(|(_, v)| v.is_resolved())
            }
            Expr::Field(e, _) => e.is_resolved(),
            Expr::ImportAlt(l, r) => l.is_resolved() && r.is_resolved(),
        }
    }
}

// ── Pretty rendering ─────────────────────────────────────────────────
//
// Precedence levels, loosest to tightest. Parentheses are inserted when a
// child renders at a looser level than its context requires.

const PREC_EXPR: u8 = 0;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_EQ: u8 = 4;
const PREC_ALT: u8 = 5;
const PREC_APP: u8 = 6;
const PREC_FIELD: u8 = 7;
const PREC_ATOM: u8 = 8;

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_prec(self, PREC_EXPR, f)
    }
}

fn fmt_prec(expr: &Expr, prec: u8, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let level = expr_level(expr);
    if level < prec {
        write!(f, "(")?;
        fmt_raw(expr, f)?;
        write!(f, ")")
    } else {
        fmt_raw(expr, f)
    }
}

fn expr_level(expr: &Expr) -> u8 {
    match expr {
        Expr::Lam(..) | Expr::Pi(..) | Expr::Let(..) | Expr::Annot(..) => PREC_EXPR,
        Expr::BoolOr(..) => PREC_OR,
        Expr::BoolAnd(..) => PREC_AND,
        Expr::BoolEq(..) => PREC_EQ,
        Expr::ImportAlt(..) => PREC_ALT,
        Expr::App(..) => PREC_APP,
        Expr::Field(..) => PREC_FIELD,
        _ => PREC_ATOM,
    }
}

fn fmt_raw(expr: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match expr {
        Expr::Const(Const::Type) => write!(f, "Type"),
        Expr::Const(Const::Kind) => write!(f, "Kind"),
        Expr::Var(v) => {
            if v.index == 0 {
                write!(f, "{}", v.name)
            } else {
                write!(f, "{}@{}", v.name, v.index)
            }
        }
        Expr::Lam(x, a, b) => write!(f, "λ({} : {}) → {}", x, a, b),
        Expr::Pi(x, a, b) => {
            if x == "_" {
                fmt_prec(a, PREC_OR, f)?;
                write!(f, " → {}", b)
            } else {
                write!(f, "∀({} : {}) → {}", x, a, b)
            }
        }
        Expr::App(g, a) => {
            fmt_prec(g, PREC_APP, f)?;
            write!(f, " ")?;
            fmt_prec(a, PREC_FIELD, f)
        }
        Expr::Let(x, t, v, b) => {
            write!(f, "let {}", x)?;
            if let Some(t) = t {
                write!(f, " : {}", t)?;
            }
            write!(f, " = {} in {}", v, b)
        }
        Expr::Annot(e, t) => {
            fmt_prec(e, PREC_OR, f)?;
            write!(f, " : {}", t)
        }
        Expr::Bool => write!(f, "Bool"),
        Expr::BoolLit(true) => write!(f, "True"),
        Expr::BoolLit(false) => write!(f, "False"),
        Expr::BoolOr(l, r) => {
            fmt_prec(l, PREC_OR, f)?;
            write!(f, " || ")?;
            fmt_prec(r, PREC_AND, f)
        }
        Expr::BoolAnd(l, r) => {
            fmt_prec(l, PREC_AND, f)?;
            write!(f, " && ")?;
            fmt_prec(r, PREC_EQ, f)
        }
        Expr::BoolEq(l, r) => {
            fmt_prec(l, PREC_EQ, f)?;
            write!(f, " == ")?;
            fmt_prec(r, PREC_ALT, f)
        }
        Expr::Integer => write!(f, "Integer"),
        Expr::IntegerLit(n) => write!(f, "{}", n),
        Expr::Text => write!(f, "Text"),
        Expr::TextLit(s) => {
            write!(f, "\"")?;
            for c in s.chars() {
                match c {
                    '"' => write!(f, "\\\"")?,
                    '\\' => write!(f, "\\\\")?,
                    '\n' => write!(f, "\\n")?,
                    '\t' => write!(f, "\\t")?,
                    '\r' => write!(f, "\\r")?,
                    other => write!(f, "{}", other)?,
                }
            }
            write!(f, "\"")
        }
        Expr::List => write!(f, "List"),
        Expr::ListLit(t, xs) => {
            write!(f, "[")?;
            for (i, x) in xs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_prec(x, PREC_OR, f)?;
            }
            write!(f, "]")?;
            if let Some(t) = t {
                write!(f, " : List {}", t)?;
            }
            Ok(())
        }
        Expr::RecordType(fields) => {
            if fields.is_empty() {
                return write!(f, "{{}}");
            }
            write!(f, "{{ ")?;
            for (i, (k, t)) in fields.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} : {}", k, t)?;
            }
            write!(f, " }}")
        }
        Expr::RecordLit(fields) => {
            if fields.is_empty() {
                return write!(f, "{{}}");
            }
            write!(f, "{{ ")?;
            for (i, (k, v)) in fields.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} = {}", k, v)?;
            }
            write!(f, " }}")
        }
        Expr::Field(e, k) => {
            fmt_prec(e, PREC_FIELD, f)?;
            write!(f, ".{}", k)
        }
        Expr::ImportAlt(l, r) => {
            fmt_prec(l, PREC_ALT, f)?;
            write!(f, " ? ")?;
            fmt_prec(r, PREC_APP, f)
        }
        Expr::Embed(import) => write!(f, "{}", import),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lambda() {
        let e = Expr::Lam(
            "x".to_string(),
            Box::new(Expr::Bool),
            Box::new(Expr::Var(Var::new("x", 0))),
        );
        assert_eq!(e.to_string(), "λ(x : Bool) → x");
    }

    #[test]
    fn display_arrow_sugar() {
        let e = Expr::Pi("_".to_string(), Box::new(Expr::Bool), Box::new(Expr::Bool));
        assert_eq!(e.to_string(), "Bool → Bool");
    }

    #[test]
    fn display_application_parenthesizes_argument() {
        let e = Expr::App(
            Box::new(Expr::List),
            Box::new(Expr::App(Box::new(Expr::List), Box::new(Expr::Bool))),
        );
        assert_eq!(e.to_string(), "List (List Bool)");
    }

    #[test]
    fn display_text_escapes() {
        let e = Expr::TextLit("a\"b\\c\nd".to_string());
        assert_eq!(e.to_string(), "\"a\\\"b\\\\c\\nd\"");
    }
}
