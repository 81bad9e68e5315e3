//! Type checker for the Timbre calculus.
//!
//! A pure-type-system checker with `Type : Kind`, the function rules
//! (Type, Type), (Kind, Type), and (Kind, Kind), and judgmental equality
//! defined as syntactic equality of α-normalized β/η-normal forms.

use std::fmt;

use crate::ast::{Const, Expr, Var};
use crate::import::Import;
use crate::normalize::{alpha_normalize, as_const, normalize, shift, subst};

/// A typing context: label/type bindings, innermost last. Extension is
/// functional so checking a binder cannot disturb the caller's context.
#[derive(Debug, Clone, Default)]
pub struct Context {
    bindings: Vec<(String, Expr)>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    /// Extend with `name : ty`, shifting every entry (the new one included)
    /// so indices stay aligned under the new binder.
    pub fn insert(&self, name: &str, ty: &Expr) -> Context {
        let mut bindings = self.bindings.clone();
        bindings.push((name.to_string(), ty.clone()));
        for (_, t) in bindings.iter_mut() {
            *t = shift(1, name, 0, t);
        }
        Context { bindings }
    }

    /// Look up `name@index`, counting inward from the innermost binding.
    pub fn lookup(&self, name: &str, index: usize) -> Option<&Expr> {
        self.bindings
            .iter()
            .rev()
            .filter(|(n, _)| n == name)
            .nth(index)
            .map(|(_, t)| t)
    }
}

/// Why an expression failed to type-check.
#[derive(Debug, Clone)]
pub enum TypeError {
    UnboundVariable(Var),
    /// `Kind` has no type.
    Untyped,
    /// The domain of a function or binder is not a type.
    InvalidInputType(Box<Expr>),
    /// The codomain of a function is not a type.
    InvalidOutputType(Box<Expr>),
    /// A type-level function result may not depend on a term-level input.
    NoDependentTypes,
    NotAFunction(Box<Expr>),
    /// Function argument type does not match the declared domain.
    TypeMismatch {
        expected: Box<Expr>,
        actual: Box<Expr>,
    },
    /// An annotation (or `let` annotation) disagrees with the inferred type.
    AnnotMismatch {
        annotated: Box<Expr>,
        actual: Box<Expr>,
    },
    /// Operand of `&&`, `||`, or `==` is not a `Bool`.
    InvalidOperand {
        operator: &'static str,
        actual: Box<Expr>,
    },
    /// An empty list literal needs a `: List T` annotation.
    MissingListType,
    InvalidListType(Box<Expr>),
    MismatchedListElements {
        expected: Box<Expr>,
        actual: Box<Expr>,
    },
    InvalidFieldType {
        field: String,
        ty: Box<Expr>,
    },
    NotARecord(Box<Expr>),
    MissingField {
        field: String,
        record: Box<Expr>,
    },
    /// Imports must be resolved before type checking.
    UnresolvedImport(Box<Import>),
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::UnboundVariable(v) => {
                if v.index == 0 {
                    write!(f, "unbound variable: {}", v.name)
                } else {
                    write!(f, "unbound variable: {}@{}", v.name, v.index)
                }
            }
            TypeError::Untyped => write!(f, "Kind has no type"),
            TypeError::InvalidInputType(e) => {
                write!(f, "invalid function input type: {}", e)
            }
            TypeError::InvalidOutputType(e) => {
                write!(f, "invalid function output type: {}", e)
            }
            TypeError::NoDependentTypes => {
                write!(f, "a type-level result may not depend on a term-level input")
            }
            TypeError::NotAFunction(e) => write!(f, "not a function: {}", e),
            TypeError::TypeMismatch { expected, actual } => {
                write!(f, "wrong argument type: expected {}, got {}", expected, actual)
            }
            TypeError::AnnotMismatch { annotated, actual } => {
                write!(
                    f,
                    "annotation mismatch: annotated {}, inferred {}",
                    annotated, actual
                )
            }
            TypeError::InvalidOperand { operator, actual } => {
                write!(f, "operand of '{}' must be Bool, got {}", operator, actual)
            }
            TypeError::MissingListType => {
                write!(f, "an empty list needs a type annotation")
            }
            TypeError::InvalidListType(e) => {
                write!(f, "invalid list element type: {}", e)
            }
            TypeError::MismatchedListElements { expected, actual } => {
                write!(
                    f,
                    "list elements disagree: expected {}, got {}",
                    expected, actual
                )
            }
            TypeError::InvalidFieldType { field, ty } => {
                write!(f, "field '{}' has invalid type {}", field, ty)
            }
            TypeError::NotARecord(e) => write!(f, "not a record: {}", e),
            TypeError::MissingField { field, record } => {
                write!(f, "record {} has no field '{}'", record, field)
            }
            TypeError::UnresolvedImport(i) => {
                write!(f, "cannot type-check an unresolved import: {}", i)
            }
        }
    }
}

impl std::error::Error for TypeError {}

/// Judgmental equality: α-normalized β/η-normal forms are identical.
pub fn equivalent(a: &Expr, b: &Expr) -> bool {
    alpha_normalize(&normalize(a)) == alpha_normalize(&normalize(b))
}

/// Type-check `expr` in the empty context.
pub fn type_of(expr: &Expr) -> Result<Expr, TypeError> {
    type_with(&Context::new(), expr)
}

/// Type-check `expr` under `context`, returning its type.
pub fn type_with(context: &Context, expr: &Expr) -> Result<Expr, TypeError> {
    match expr {
        Expr::Const(Const::Type) => Ok(Expr::Const(Const::Kind)),
        Expr::Const(Const::Kind) => Err(TypeError::Untyped),
        Expr::Var(v) => context
            .lookup(&v.name, v.index)
            .cloned()
            .ok_or_else(|| TypeError::UnboundVariable(v.clone())),
        Expr::Lam(x, a, b) => {
            let ka = normalize(&type_with(context, a)?);
            if as_const(&ka).is_none() {
                return Err(TypeError::InvalidInputType(a.clone()));
            }
            let inner = context.insert(x, a);
            let bt = type_with(&inner, b)?;
            let pi = Expr::Pi(x.clone(), a.clone(), Box::new(bt));
            type_with(context, &pi)?;
            Ok(pi)
        }
        Expr::Pi(x, a, b) => {
            let ka = normalize(&type_with(context, a)?);
            let input = as_const(&ka).ok_or_else(|| TypeError::InvalidInputType(a.clone()))?;
            let inner = context.insert(x, a);
            let kb = normalize(&type_with(&inner, b)?);
            let output = as_const(&kb).ok_or_else(|| TypeError::InvalidOutputType(b.clone()))?;
            match (input, output) {
                (Const::Type, Const::Kind) => Err(TypeError::NoDependentTypes),
                (_, out) => Ok(Expr::Const(out)),
            }
        }
        Expr::App(g, a) => {
            let gt = normalize(&type_with(context, g)?);
            let (x, domain, codomain) = match gt {
                Expr::Pi(x, domain, codomain) => (x, domain, codomain),
                other => return Err(TypeError::NotAFunction(Box::new(other))),
            };
            let at = type_with(context, a)?;
            if !equivalent(&domain, &at) {
                return Err(TypeError::TypeMismatch {
                    expected: domain,
                    actual: Box::new(at),
                });
            }
            let a = shift(1, &x, 0, a);
            let codomain = subst(&x, 0, &a, &codomain);
            Ok(shift(-1, &x, 0, &codomain))
        }
        Expr::Let(x, annot, v, b) => {
            let vt = type_with(context, v)?;
            if let Some(annot) = annot {
                if !equivalent(annot, &vt) {
                    return Err(TypeError::AnnotMismatch {
                        annotated: annot.clone(),
                        actual: Box::new(vt),
                    });
                }
            }
            let v = shift(1, x, 0, v);
            let b = subst(x, 0, &v, b);
            let b = shift(-1, x, 0, &b);
            type_with(context, &b)
        }
        Expr::Annot(e, t) => {
            // `[] : List T` is the one place an empty list learns its type.
            if let Expr::ListLit(None, xs) = &**e {
                if xs.is_empty() {
                    let nt = normalize(t);
                    if let Expr::App(g, element) = &nt {
                        if **g == Expr::List {
                            let kind = normalize(&type_with(context, element)?);
                            if as_const(&kind) != Some(Const::Type) {
                                return Err(TypeError::InvalidListType(element.clone()));
                            }
                            return Ok(nt);
                        }
                    }
                    return Err(TypeError::AnnotMismatch {
                        annotated: t.clone(),
                        actual: Box::new(Expr::List),
                    });
                }
            }
            let et = type_with(context, e)?;
            if equivalent(&et, t) {
                Ok(et)
            } else {
                Err(TypeError::AnnotMismatch {
                    annotated: t.clone(),
                    actual: Box::new(et),
                })
            }
        }
        Expr::Bool | Expr::Integer | Expr::Text => Ok(Expr::Const(Const::Type)),
        Expr::BoolLit(_) => Ok(Expr::Bool),
        Expr::IntegerLit(_) => Ok(Expr::Integer),
        Expr::TextLit(_) => Ok(Expr::Text),
        Expr::List => Ok(Expr::Pi(
            "_".to_string(),
            Box::new(Expr::Const(Const::Type)),
            Box::new(Expr::Const(Const::Type)),
        )),
        Expr::BoolAnd(l, r) => check_bool_operands("&&", context, l, r),
        Expr::BoolOr(l, r) => check_bool_operands("||", context, l, r),
        Expr::BoolEq(l, r) => check_bool_operands("==", context, l, r),
        Expr::ListLit(annot, xs) => {
            let element = match annot {
                Some(t) => (**t).clone(),
                None => match xs.first() {
                    Some(first) => type_with(context, first)?,
                    None => return Err(TypeError::MissingListType),
                },
            };
            let kind = normalize(&type_with(context, &element)?);
            if as_const(&kind) != Some(Const::Type) {
                return Err(TypeError::InvalidListType(Box::new(element)));
            }
            for x in xs {
                let xt = type_with(context, x)?;
                if !equivalent(&element, &xt) {
                    return Err(TypeError::MismatchedListElements {
                        expected: Box::new(element.clone()),
                        actual: Box::new(xt),
                    });
                }
            }
            Ok(Expr::App(Box::new(Expr::List), Box::new(element)))
        }
        Expr::RecordType(fields) => {
            let mut universe = Const::Type;
            for (field, t) in fields {
                let kind = normalize(&type_with(context, t)?);
                match as_const(&kind) {
                    Some(c) => universe = universe.max(c),
                    None => {
                        return Err(TypeError::InvalidFieldType {
                            field: field.clone(),
                            ty: Box::new(t.clone()),
                        })
                    }
                }
            }
            Ok(Expr::Const(universe))
        }
        Expr::RecordLit(fields) => {
            let mut types = Vec::with_capacity(fields.len());
            for (field, v) in fields {
                types.push((field.clone(), type_with(context, v)?));
            }
            Ok(Expr::RecordType(types))
        }
        Expr::Field(e, field) => {
            let et = normalize(&type_with(context, e)?);
            match et {
                Expr::RecordType(fields) => fields
                    .iter()
                    .find(|(name, _)| name == field)
                    .map(|(_, t)| t.clone())
                    .ok_or_else(|| TypeError::MissingField {
                        field: field.clone(),
                        record: Box::new(Expr::RecordType(fields.clone())),
                    }),
                other => Err(TypeError::NotARecord(Box::new(other))),
            }
        }
        Expr::ImportAlt(l, _) => type_with(context, l),
        Expr::Embed(import) => Err(TypeError::UnresolvedImport(Box::new(import.clone()))),
    }
}

fn check_bool_operands(
    operator: &'static str,
    context: &Context,
    l: &Expr,
    r: &Expr,
) -> Result<Expr, TypeError> {
    for operand in [l, r] {
        let t = normalize(&type_with(context, operand)?);
        if t != Expr::Bool {
            return Err(TypeError::InvalidOperand {
                operator,
                actual: Box::new(t),
            });
        }
    }
    Ok(Expr::Bool)
}
