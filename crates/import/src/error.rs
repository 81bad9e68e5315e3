//! The import failure taxonomy and the chain-wrapping policy.
//!
//! Every failure the resolver raises while working on a specific import is
//! raised exactly once as `MissingImports([Imported { chain, cause }])`:
//! the one-element envelope is what the `?` operator catches and merges,
//! and the `Imported` wrapper carries the stack of enclosing imports for
//! diagnostics. The `missing` locator raises an *empty* `MissingImports`,
//! which contributes nothing when alternatives accumulate failures.

use std::fmt;
use std::path::PathBuf;

use timbre_core::{DecodeError, EncodeError, Import, ParseError, TypeError};

#[derive(Debug)]
pub enum ImportError {
    /// A local import pointed at a file that does not exist (or cannot be
    /// read as UTF-8 text).
    MissingFile(PathBuf),
    MissingEnvironmentVariable(String),
    /// Remote imports are compiled out of this build.
    CannotImportHttpUrl(String),
    /// The HTTP request failed: transport error or non-2xx status.
    HttpFetch { url: String, detail: String },
    /// A `using` headers import did not produce a usable header list.
    InvalidHeaders { url: String, detail: String },
    /// The import, composed against its ancestors, is already being
    /// resolved further up the stack.
    Cycle(Import),
    /// A local import reached from a non-local parent: the dependency
    /// could never be retrieved by a remote consumer.
    ReferentiallyOpaque(Import),
    HashMismatch { expected: String, actual: String },
    Parse(ParseError),
    Typecheck(TypeError),
    Encode(EncodeError),
    /// An on-disk cache entry whose bytes matched the hash but did not
    /// decode as a canonical expression.
    Decode { hash: String, cause: DecodeError },
    /// The aggregate the `?` operator catches and merges. Length 0 comes
    /// only from `missing`; every other failure arrives as length 1.
    MissingImports(Vec<ImportError>),
    /// A failure annotated with the chain of enclosing imports, outermost
    /// first.
    Imported {
        chain: Vec<Import>,
        cause: Box<ImportError>,
    },
}

impl ImportError {
    /// Raise a primitive failure in the envelope the `?` operator
    /// understands, annotated with the current chain.
    pub(crate) fn raise(chain: &[Import], cause: ImportError) -> ImportError {
        ImportError::MissingImports(vec![Self::attach(chain, cause)])
    }

    /// Annotate a cause with the chain unless it already carries one (the
    /// chain captured at the point of first raise is the deepest) or there
    /// is no chain to report.
    fn attach(chain: &[Import], cause: ImportError) -> ImportError {
        match cause {
            already @ ImportError::Imported { .. } => already,
            cause if chain.is_empty() => cause,
            cause => ImportError::Imported {
                chain: chain.to_vec(),
                cause: Box::new(cause),
            },
        }
    }

    /// Re-apply the wrapping policy at a recursion boundary: an empty
    /// `MissingImports` passes through untouched so `?` can keep searching,
    /// a non-empty one has each element annotated, and anything else is
    /// annotated bare (and stays invisible to `?`).
    pub(crate) fn rewrap(self, chain: &[Import]) -> ImportError {
        match self {
            ImportError::MissingImports(errors) if errors.is_empty() => {
                ImportError::MissingImports(errors)
            }
            ImportError::MissingImports(errors) => ImportError::MissingImports(
                errors
                    .into_iter()
                    .map(|e| Self::attach(chain, e))
                    .collect(),
            ),
            other => Self::attach(chain, other),
        }
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::MissingFile(path) => write!(f, "missing file {}", path.display()),
            ImportError::MissingEnvironmentVariable(name) => {
                write!(f, "missing environment variable {}", name)
            }
            ImportError::CannotImportHttpUrl(url) => {
                write!(f, "cannot import {}: remote imports are disabled in this build", url)
            }
            ImportError::HttpFetch { url, detail } => {
                write!(f, "failed to fetch {}: {}", url, detail)
            }
            ImportError::InvalidHeaders { url, detail } => {
                write!(f, "invalid request headers for {}: {}", url, detail)
            }
            ImportError::Cycle(import) => write!(f, "import cycle detected: {}", import),
            ImportError::ReferentiallyOpaque(import) => {
                write!(
                    f,
                    "referentially opaque import: a remote expression may not depend on {}",
                    import
                )
            }
            ImportError::HashMismatch { expected, actual } => {
                write!(
                    f,
                    "integrity check failed: expected sha256:{}, got sha256:{}",
                    expected, actual
                )
            }
            ImportError::Parse(e) => write!(f, "{}", e),
            ImportError::Typecheck(e) => write!(f, "type error in resolved import: {}", e),
            ImportError::Encode(e) => write!(f, "{}", e),
            ImportError::Decode { hash, cause } => {
                write!(f, "corrupt cache entry sha256:{}: {}", hash, cause)
            }
            ImportError::MissingImports(errors) => match errors.as_slice() {
                [] => write!(f, "no import to resolve"),
                [single] => write!(f, "{}", single),
                many => {
                    write!(f, "every alternative failed:")?;
                    for e in many {
                        write!(f, "\n  - {}", e)?;
                    }
                    Ok(())
                }
            },
            ImportError::Imported { chain, cause } => {
                write!(f, "while importing ")?;
                for (i, import) in chain.iter().enumerate() {
                    if i > 0 {
                        write!(f, " → ")?;
                    }
                    write!(f, "{}", import)?;
                }
                write!(f, ": {}", cause)
            }
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Imported { cause, .. } => Some(cause.as_ref()),
            ImportError::Parse(e) => Some(e),
            ImportError::Typecheck(e) => Some(e),
            ImportError::Encode(e) => Some(e),
            ImportError::Decode { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timbre_core::{Directory, File, FilePrefix, ImportMode, ImportTarget};

    fn here(file: &str) -> Import {
        Import {
            hash: None,
            target: ImportTarget::Local(
                FilePrefix::Here,
                File {
                    directory: Directory::default(),
                    file: file.to_string(),
                },
            ),
            mode: ImportMode::Code,
        }
    }

    #[test]
    fn raise_produces_one_element_envelope() {
        let err = ImportError::raise(&[here("a")], ImportError::Cycle(here("b")));
        match err {
            ImportError::MissingImports(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(matches!(&errors[0], ImportError::Imported { chain, .. } if chain.len() == 1));
            }
            other => panic!("expected an envelope, got {:?}", other),
        }
    }

    #[test]
    fn raise_with_empty_chain_skips_the_wrapper() {
        let err = ImportError::raise(&[], ImportError::MissingEnvironmentVariable("X".into()));
        match err {
            ImportError::MissingImports(errors) => {
                assert!(matches!(
                    &errors[0],
                    ImportError::MissingEnvironmentVariable(_)
                ));
            }
            other => panic!("expected an envelope, got {:?}", other),
        }
    }

    #[test]
    fn rewrap_leaves_empty_envelope_untouched() {
        let err = ImportError::MissingImports(Vec::new()).rewrap(&[here("a")]);
        assert!(matches!(err, ImportError::MissingImports(es) if es.is_empty()));
    }

    #[test]
    fn rewrap_does_not_double_wrap() {
        let inner = ImportError::Imported {
            chain: vec![here("deep"), here("deeper")],
            cause: Box::new(ImportError::MissingFile(PathBuf::from("/x"))),
        };
        let err = ImportError::MissingImports(vec![inner]).rewrap(&[here("outer")]);
        match err {
            ImportError::MissingImports(errors) => match &errors[0] {
                ImportError::Imported { chain, .. } => {
                    assert_eq!(chain.len(), 2);
                    assert_eq!(chain[0], here("deep"));
                }
                other => panic!("expected the original wrapper, got {:?}", other),
            },
            other => panic!("expected an envelope, got {:?}", other),
        }
    }

    #[test]
    fn display_chain_joins_with_arrows() {
        let err = ImportError::Imported {
            chain: vec![here("foo"), here("bar")],
            cause: Box::new(ImportError::Cycle(here("foo"))),
        };
        assert_eq!(
            err.to_string(),
            "while importing ./foo → ./bar: import cycle detected: ./foo"
        );
    }
}
