//! timbre-core: Timbre language core library.
//!
//! Timbre is a pure, total, typed configuration language. This crate holds
//! the expression data model and the collaborators the import resolver
//! builds on:
//!
//! - [`parse_expression`] -- text to an (unresolved) expression tree
//! - [`type_with`] / [`type_of`] -- the type checker
//! - [`normalize_with`] / [`alpha_normalize`] -- β/η reduction and
//!   α-normalization for hash stability
//! - [`encode_expression`] / [`decode_expression`] -- the canonical binary
//!   codec under a [`ProtocolVersion`]
//! - [`Import`] and its path algebra (`canonicalize`, `chain`)
//!
//! Import *resolution* -- fetching, caching, cycle detection -- lives in the
//! `timbre-import` crate.

/// Timbre language version tag (e.g. "1.0").
pub const TIMBRE_VERSION: &str = "1.0";

pub mod ast;
pub mod binary;
pub mod import;
pub mod normalize;
pub mod parser;
pub mod typecheck;

// ── Convenience re-exports: key types ────────────────────────────────

pub use ast::{Const, Expr, Var};
pub use binary::{DecodeError, EncodeError, ProtocolVersion};
pub use import::{Directory, File, FilePrefix, Import, ImportMode, ImportTarget, Scheme, Url};
pub use normalize::CustomNormalizer;
pub use parser::ParseError;
pub use typecheck::{Context, TypeError};

// ── Convenience re-exports: entry points ─────────────────────────────

pub use binary::{decode_expression, encode_expression};
pub use normalize::{alpha_normalize, normalize, normalize_with, shift, subst};
pub use parser::parse_expression;
pub use typecheck::{equivalent, type_of, type_with};
