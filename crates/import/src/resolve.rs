//! The resolver: a memoized depth-first traversal with cycle detection.
//!
//! Session state ([`Status`]) is threaded explicitly through the recursion.
//! The import stack holds as-written imports (above a synthetic root import
//! for the starting directory); an import's *identity* is the canonical
//! composition of the whole stack below it, so the same `./a` reached from
//! two different parents resolves to two different targets. Cycle detection
//! compares the new identity against the composition of every stack prefix.
//!
//! Successful sub-resolutions are sticky: memo entries and cache writes made
//! while the left branch of `a ? b` runs stay in effect for the right
//! branch. The stack is restored on every exit path, including failures.

use std::collections::HashMap;
use std::path::{Component, Path};
use std::rc::Rc;

use sha2::{Digest, Sha256};

use timbre_core::{
    alpha_normalize, encode_expression, normalize_with, parse_expression, type_with, Context,
    CustomNormalizer, Directory, Expr, File, FilePrefix, Import, ImportMode, ImportTarget,
    ProtocolVersion,
};

use crate::cache::{self, CacheLookup};
use crate::error::ImportError;
use crate::fetch::{Fetched, Fetcher, SystemFetcher};

/// Mutable session state for one resolution.
pub struct Status {
    /// Import stack, outermost first; `stack[0]` is the synthetic root
    /// import of the starting directory and is never popped.
    stack: Vec<Import>,
    /// Memo from canonical composed imports to fully resolved, type-checked,
    /// β/η-normalized expressions.
    cache: HashMap<Import, Expr>,
    /// Lazily instantiated HTTP client, shared across the session.
    #[cfg(feature = "http")]
    manager: Option<ureq::Agent>,
    protocol_version: ProtocolVersion,
    normalizer: Option<Rc<dyn CustomNormalizer>>,
    starting_context: Context,
    /// The fetch strategy, indirected so tests can substitute a double.
    fetcher: Rc<dyn Fetcher>,
}

impl Status {
    /// Fresh session state rooted at `root_dir`.
    pub fn new(root_dir: &Path) -> Status {
        Status {
            stack: vec![root_import(root_dir)],
            cache: HashMap::new(),
            #[cfg(feature = "http")]
            manager: None,
            protocol_version: ProtocolVersion::default(),
            normalizer: None,
            starting_context: Context::new(),
            fetcher: Rc::new(SystemFetcher),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Rc<dyn Fetcher>) -> Status {
        self.fetcher = fetcher;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Rc<dyn CustomNormalizer>) -> Status {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Status {
        self.protocol_version = version;
        self
    }

    pub fn with_starting_context(mut self, context: Context) -> Status {
        self.starting_context = context;
        self
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn starting_context(&self) -> &Context {
        &self.starting_context
    }

    #[cfg(feature = "http")]
    pub(crate) fn http_agent(&mut self) -> &ureq::Agent {
        self.manager
            .get_or_insert_with(ureq::Agent::new_with_defaults)
    }
}

/// The synthetic parent of the outermost resolution: a `Code` import of the
/// starting directory itself.
fn root_import(dir: &Path) -> Import {
    let prefix = if dir.is_absolute() {
        FilePrefix::Absolute
    } else {
        FilePrefix::Here
    };
    let mut components = Vec::new();
    for component in dir.components() {
        match component {
            Component::Normal(name) => components.push(name.to_string_lossy().into_owned()),
            Component::ParentDir => components.push("..".to_string()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Import {
        hash: None,
        target: ImportTarget::Local(
            prefix,
            File {
                directory: Directory { components },
                file: ".".to_string(),
            },
        ),
        mode: ImportMode::Code,
    }
}

/// Resolve every import in `expr`, starting from the process working
/// directory.
pub fn load(expr: Expr) -> Result<Expr, ImportError> {
    let mut status = Status::new(Path::new("."));
    load_with(&mut status, expr)
}

/// Resolve every import in `expr` under an existing session. Composable:
/// embedders can thread one [`Status`] through many expressions and share
/// its memo.
pub fn load_with(status: &mut Status, expr: Expr) -> Result<Expr, ImportError> {
    match expr {
        Expr::Embed(import) => resolve_import(status, import),
        Expr::ImportAlt(left, right) => match load_with(status, *left) {
            Ok(resolved) => Ok(resolved),
            Err(ImportError::MissingImports(mut left_errors)) => {
                match load_with(status, *right) {
                    Ok(resolved) => Ok(resolved),
                    Err(ImportError::MissingImports(right_errors)) => {
                        left_errors.extend(right_errors);
                        Err(ImportError::MissingImports(left_errors))
                    }
                    Err(other) => Err(other),
                }
            }
            Err(other) => Err(other),
        },
        // Structural recursion, children in declaration order.
        Expr::Lam(x, a, b) => Ok(Expr::Lam(
            x,
            Box::new(load_with(status, *a)?),
            Box::new(load_with(status, *b)?),
        )),
        Expr::Pi(x, a, b) => Ok(Expr::Pi(
            x,
            Box::new(load_with(status, *a)?),
            Box::new(load_with(status, *b)?),
        )),
        Expr::App(f, a) => Ok(Expr::App(
            Box::new(load_with(status, *f)?),
            Box::new(load_with(status, *a)?),
        )),
        Expr::Let(x, annotation, value, body) => {
            let annotation = match annotation {
                Some(t) => Some(Box::new(load_with(status, *t)?)),
                None => None,
            };
            Ok(Expr::Let(
                x,
                annotation,
                Box::new(load_with(status, *value)?),
                Box::new(load_with(status, *body)?),
            ))
        }
        Expr::Annot(e, t) => Ok(Expr::Annot(
            Box::new(load_with(status, *e)?),
            Box::new(load_with(status, *t)?),
        )),
        Expr::BoolAnd(l, r) => Ok(Expr::BoolAnd(
            Box::new(load_with(status, *l)?),
            Box::new(load_with(status, *r)?),
        )),
        Expr::BoolOr(l, r) => Ok(Expr::BoolOr(
            Box::new(load_with(status, *l)?),
            Box::new(load_with(status, *r)?),
        )),
        Expr::BoolEq(l, r) => Ok(Expr::BoolEq(
            Box::new(load_with(status, *l)?),
            Box::new(load_with(status, *r)?),
        )),
        Expr::ListLit(annotation, items) => {
            let annotation = match annotation {
                Some(t) => Some(Box::new(load_with(status, *t)?)),
                None => None,
            };
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(load_with(status, item)?);
            }
            Ok(Expr::ListLit(annotation, resolved))
        }
        Expr::RecordType(fields) => {
            let mut resolved = Vec::with_capacity(fields.len());
            for (name, value) in fields {
                resolved.push((name, load_with(status, value)?));
            }
            Ok(Expr::RecordType(resolved))
        }
        Expr::RecordLit(fields) => {
            let mut resolved = Vec::with_capacity(fields.len());
            for (name, value) in fields {
                resolved.push((name, load_with(status, value)?));
            }
            Ok(Expr::RecordLit(resolved))
        }
        Expr::Field(e, name) => Ok(Expr::Field(Box::new(load_with(status, *e)?), name)),
        leaf @ (Expr::Const(_)
        | Expr::Var(_)
        | Expr::Bool
        | Expr::BoolLit(_)
        | Expr::Integer
        | Expr::IntegerLit(_)
        | Expr::Text
        | Expr::TextLit(_)
        | Expr::List) => Ok(leaf),
    }
}

/// Fetch and parse a single import against the session's current stack,
/// without recursing, caching, or type checking. This is the base layer the
/// resolver builds on.
pub fn expr_from_import(status: &mut Status, import: &Import) -> Result<Expr, ImportError> {
    let parent = compose(&status.stack);
    let here = Import::chain(&parent, import).canonicalize();
    let fetched = fetch_fresh(status, &here)?;
    match here.mode {
        ImportMode::Code => parse_expression(&fetched.display_path, &fetched.text)
            .map_err(ImportError::Parse),
        ImportMode::RawText => Ok(Expr::TextLit(fetched.text)),
    }
}

fn fetch_fresh(status: &mut Status, here: &Import) -> Result<Fetched, ImportError> {
    let fetcher = status.fetcher.clone();
    fetcher.fetch(status, here)
}

/// Resolve one import leaf.
fn resolve_import(status: &mut Status, import: Import) -> Result<Expr, ImportError> {
    let parent = compose(&status.stack);
    let here = Import::chain(&parent, &import).canonicalize();

    // Diagnostic chain: as-written imports above the synthetic root.
    let chain: Vec<Import> = status.stack.iter().skip(1).cloned().collect();

    if here.is_local() && !parent.is_local() {
        return Err(ImportError::raise(
            &chain,
            ImportError::ReferentiallyOpaque(import),
        ));
    }

    if ancestor_identities(&status.stack).contains(&here) {
        return Err(ImportError::raise(&chain, ImportError::Cycle(import)));
    }

    if let Some(found) = status.cache.get(&here) {
        let found = found.clone();
        if let Some(expected) = &import.hash {
            verify_expression_hash(status, &found, expected, &chain)?;
        }
        return Ok(found);
    }

    // Hashed imports consult the on-disk cache before any fetching; a read
    // hit skips fetching, type checking, and the in-memory memo entirely.
    let mut write_to = None;
    if let Some(expected) = &import.hash {
        match cache::fetch_from_cache(status.protocol_version, expected) {
            Ok(CacheLookup::Hit(expr)) => return Ok(expr),
            Ok(CacheLookup::Miss(path)) => write_to = Some(path),
            Ok(CacheLookup::Unavailable) => {}
            Err(cause) => return Err(ImportError::raise(&chain, cause)),
        }
    }

    // Fetch with the composed import; the child is not pushed yet, so a
    // remote's headers import resolves in the enclosing context.
    let fetched = fetch_fresh(status, &here).map_err(|e| envelope(&chain, e))?;
    let parsed = match here.mode {
        ImportMode::Code => parse_expression(&fetched.display_path, &fetched.text)
            .map_err(|e| ImportError::raise(&chain, ImportError::Parse(e)))?,
        ImportMode::RawText => Expr::TextLit(fetched.text),
    };

    status.stack.push(import.clone());
    let recursed = load_with(status, parsed);
    status.stack.pop();
    let resolved = recursed.map_err(|e| {
        let mut inner_chain = chain.clone();
        inner_chain.push(import.clone());
        e.rewrap(&inner_chain)
    })?;

    if let Err(e) = type_with(&status.starting_context, &resolved) {
        return Err(ImportError::raise(&chain, ImportError::Typecheck(e)));
    }
    let normalized = normalize_with(status.normalizer.as_deref(), &resolved);

    if let Some(expected) = &import.hash {
        let bytes = canonical_bytes(status, &normalized, &chain)?;
        let actual = format!("{:x}", Sha256::digest(&bytes));
        if &actual != expected {
            return Err(ImportError::raise(
                &chain,
                ImportError::HashMismatch {
                    expected: expected.clone(),
                    actual,
                },
            ));
        }
        if let Some(path) = write_to {
            cache::persist(&path, &bytes);
        }
    }

    status.cache.insert(here, normalized.clone());
    Ok(normalized)
}

/// Verify a memoized expression against an expected digest.
fn verify_expression_hash(
    status: &Status,
    expr: &Expr,
    expected: &str,
    chain: &[Import],
) -> Result<(), ImportError> {
    let bytes = canonical_bytes(status, expr, chain)?;
    let actual = format!("{:x}", Sha256::digest(&bytes));
    if actual != expected {
        return Err(ImportError::raise(
            chain,
            ImportError::HashMismatch {
                expected: expected.to_string(),
                actual,
            },
        ));
    }
    Ok(())
}

fn canonical_bytes(
    status: &Status,
    expr: &Expr,
    chain: &[Import],
) -> Result<Vec<u8>, ImportError> {
    encode_expression(status.protocol_version, &alpha_normalize(expr))
        .map_err(|cause| ImportError::raise(chain, ImportError::Encode(cause)))
}

/// Wrap a fetch failure, leaving already-enveloped failures (the `missing`
/// sentinel, nested headers resolutions) untouched.
fn envelope(chain: &[Import], error: ImportError) -> ImportError {
    match error {
        enveloped @ ImportError::MissingImports(_) => enveloped,
        cause => ImportError::raise(chain, cause),
    }
}

/// Fold the stack under child ⊕ parent, outermost first, and canonicalize:
/// the identity of the innermost import.
fn compose(stack: &[Import]) -> Import {
    let mut composed = stack[0].clone();
    for child in &stack[1..] {
        composed = Import::chain(&composed, child);
    }
    composed.canonicalize()
}

/// The identity of every import on the stack: the composition of each
/// prefix. Scanned by cycle detection.
fn ancestor_identities(stack: &[Import]) -> Vec<Import> {
    (1..=stack.len()).map(|n| compose(&stack[..n])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn here_import(components: &[&str], file: &str) -> Import {
        Import {
            hash: None,
            target: ImportTarget::Local(
                FilePrefix::Here,
                File {
                    directory: Directory {
                        components: components.iter().map(|c| c.to_string()).collect(),
                    },
                    file: file.to_string(),
                },
            ),
            mode: ImportMode::Code,
        }
    }

    #[test]
    fn root_import_of_relative_dir() {
        let root = root_import(Path::new("."));
        match &root.target {
            ImportTarget::Local(FilePrefix::Here, file) => {
                assert!(file.directory.components.is_empty());
                assert_eq!(file.file, ".");
            }
            other => panic!("expected a local root, got {:?}", other),
        }
    }

    #[test]
    fn root_import_of_absolute_dir() {
        let root = root_import(Path::new("/srv/config"));
        match &root.target {
            ImportTarget::Local(FilePrefix::Absolute, file) => {
                assert_eq!(
                    file.directory.components,
                    vec!["srv".to_string(), "config".to_string()]
                );
            }
            other => panic!("expected an absolute root, got {:?}", other),
        }
    }

    #[test]
    fn compose_resolves_relative_chains() {
        let stack = vec![
            root_import(Path::new("/srv")),
            here_import(&["pkg"], "main"),
            here_import(&[".."], "sibling"),
        ];
        let composed = compose(&stack);
        match composed.target {
            ImportTarget::Local(FilePrefix::Absolute, file) => {
                assert_eq!(file.directory.components, vec!["srv".to_string()]);
                assert_eq!(file.file, "sibling");
            }
            other => panic!("expected an absolute identity, got {:?}", other),
        }
    }

    #[test]
    fn same_leaf_under_different_parents_has_different_identities() {
        let base = root_import(Path::new("/srv"));
        let from_a = compose(&[
            base.clone(),
            here_import(&["a"], "main"),
            here_import(&[], "shared"),
        ]);
        let from_b = compose(&[
            base,
            here_import(&["b"], "main"),
            here_import(&[], "shared"),
        ]);
        assert_ne!(from_a, from_b);
    }

    #[test]
    fn ancestor_identities_cover_every_prefix() {
        let stack = vec![
            root_import(Path::new("/srv")),
            here_import(&[], "a"),
            here_import(&[], "b"),
        ];
        let identities = ancestor_identities(&stack);
        assert_eq!(identities.len(), 3);
        assert_eq!(identities[1], compose(&stack[..2]));
    }
}
