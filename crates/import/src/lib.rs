//! timbre-import: the Timbre import resolution core.
//!
//! Takes an unresolved expression and returns a semantically equivalent
//! expression with every import leaf transitively replaced by the
//! expression it denotes, enforcing integrity (content-addressed hashes),
//! safety (no cycles, no referential-opacity violations), and caching (an
//! in-session memo plus an on-disk store for hashed imports).
//!
//! # Entry points
//!
//! - [`load`] -- resolve against the process working directory
//! - [`load_with`] -- resolve under an explicit [`Status`] session
//! - [`expr_from_import`] -- fetch and parse a single import (no recursion)
//! - [`hash_expression`] / [`hash_expression_to_code`] -- integrity digests
//! - [`write_expression_to_cache`] -- pre-seed the on-disk cache
//!
//! Resolution is single-threaded and cooperative; all mutable state lives
//! in the [`Status`] value the caller threads through.

pub mod cache;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod resolve;

pub use cache::write_expression_to_cache;
pub use error::ImportError;
pub use fetch::{Fetched, Fetcher, SystemFetcher};
pub use hash::{hash_expression, hash_expression_to_code};
pub use resolve::{expr_from_import, load, load_with, Status};
