//! Fetching: one backend per locator kind.
//!
//! The [`Fetcher`] trait is the seam the resolver goes through for all
//! outside-world access, so tests can substitute an in-memory double. The
//! default [`SystemFetcher`] reads local files, process environment
//! variables, and (behind the `http` feature) remote URLs.
//!
//! The resolver hands the fetcher the *composed* import before pushing the
//! child onto the session stack; a remote import's `using` headers import
//! is therefore resolved against the enclosing (parent) context, which is
//! what keeps a remote-supplied headers reference from tripping the
//! referential-opacity check against the remote import itself.

use std::path::PathBuf;

use timbre_core::{Expr, File, FilePrefix, Import, ImportTarget};

use crate::error::ImportError;
use crate::resolve::Status;

/// Source text plus the display path used for parse-error framing.
pub struct Fetched {
    pub display_path: String,
    pub text: String,
}

/// Turns a composed import into source text. Failures are reported as bare
/// causes; the resolver wraps them into the missing-imports envelope.
pub trait Fetcher {
    fn fetch(&self, status: &mut Status, here: &Import) -> Result<Fetched, ImportError>;
}

/// The production fetcher: filesystem, environment, HTTP.
pub struct SystemFetcher;

impl Fetcher for SystemFetcher {
    fn fetch(&self, status: &mut Status, here: &Import) -> Result<Fetched, ImportError> {
        match &here.target {
            ImportTarget::Local(prefix, file) => fetch_local(prefix, file),
            ImportTarget::Remote(_) => fetch_remote(status, here),
            ImportTarget::Env(name) => fetch_env(name),
            ImportTarget::Missing => Err(ImportError::MissingImports(Vec::new())),
        }
    }
}

// ── Local files ──────────────────────────────────────────────────────

fn fetch_local(prefix: &FilePrefix, file: &File) -> Result<Fetched, ImportError> {
    let path = filesystem_path(prefix, file)?;
    if !path.is_file() {
        return Err(ImportError::MissingFile(path));
    }
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(Fetched {
            display_path: path.display().to_string(),
            text,
        }),
        Err(_) => Err(ImportError::MissingFile(path)),
    }
}

fn filesystem_path(prefix: &FilePrefix, file: &File) -> Result<PathBuf, ImportError> {
    let mut path = match prefix {
        FilePrefix::Absolute => PathBuf::from("/"),
        FilePrefix::Here => PathBuf::from("."),
        FilePrefix::Parent => PathBuf::from(".."),
        FilePrefix::Home => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home),
            None => return Err(ImportError::MissingEnvironmentVariable("HOME".to_string())),
        },
    };
    for component in &file.directory.components {
        path.push(component);
    }
    path.push(&file.file);
    Ok(path)
}

// ── Environment variables ────────────────────────────────────────────

fn fetch_env(name: &str) -> Result<Fetched, ImportError> {
    match std::env::var(name) {
        Ok(text) => Ok(Fetched {
            display_path: format!("env:{}", name),
            text,
        }),
        Err(_) => Err(ImportError::MissingEnvironmentVariable(name.to_string())),
    }
}

// ── Remote URLs ──────────────────────────────────────────────────────

/// The request URL: scheme, authority, path, and query. The fragment is
/// client-side only and the headers import is not part of the URL proper.
fn request_url(import: &Import) -> String {
    match &import.target {
        ImportTarget::Remote(url) => {
            let mut rendered = format!("{}://{}{}", url.scheme, url.authority, url.path);
            if let Some(query) = &url.query {
                rendered.push('?');
                rendered.push_str(query);
            }
            rendered
        }
        other => other.to_string(),
    }
}

#[cfg(feature = "http")]
fn fetch_remote(status: &mut Status, here: &Import) -> Result<Fetched, ImportError> {
    let url = request_url(here);
    let headers = match &here.target {
        ImportTarget::Remote(remote) => match &remote.headers {
            Some(headers_import) => resolve_headers(status, headers_import, &url)?,
            None => Vec::new(),
        },
        _ => Vec::new(),
    };

    let agent = status.http_agent().clone();
    let mut request = agent.get(&url);
    for (name, value) in &headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let response = request.call().map_err(|e| ImportError::HttpFetch {
        url: url.clone(),
        detail: e.to_string(),
    })?;
    let text = response
        .into_body()
        .read_to_string()
        .map_err(|e| ImportError::HttpFetch {
            url: url.clone(),
            detail: e.to_string(),
        })?;
    Ok(Fetched {
        display_path: url,
        text,
    })
}

#[cfg(not(feature = "http"))]
fn fetch_remote(_status: &mut Status, here: &Import) -> Result<Fetched, ImportError> {
    Err(ImportError::CannotImportHttpUrl(request_url(here)))
}

/// Resolve a `using` headers import in the enclosing context, check it
/// against the expected `List { header : Text, value : Text }`, and lower
/// it to name/value pairs with lowercased names.
#[cfg(feature = "http")]
fn resolve_headers(
    status: &mut Status,
    headers_import: &Import,
    url: &str,
) -> Result<Vec<(String, String)>, ImportError> {
    let resolved =
        crate::resolve::load_with(status, Expr::Embed((*headers_import).clone()))?;
    let annotated = Expr::Annot(Box::new(resolved.clone()), Box::new(headers_type()));
    timbre_core::type_with(status.starting_context(), &annotated)
        .map_err(ImportError::Typecheck)?;
    to_header_pairs(&resolved, url)
}

/// The type a headers import must resolve to.
fn headers_type() -> Expr {
    let fields = vec![
        ("header".to_string(), Expr::Text),
        ("value".to_string(), Expr::Text),
    ];
    Expr::App(Box::new(Expr::List), Box::new(Expr::RecordType(fields)))
}

/// The resolved headers expression is β/η-normal and type-checked; anything
/// other than a ground list of text records means it still mentions free
/// variables from the starting context.
pub(crate) fn to_header_pairs(
    expr: &Expr,
    url: &str,
) -> Result<Vec<(String, String)>, ImportError> {
    let not_ground = || ImportError::InvalidHeaders {
        url: url.to_string(),
        detail: "headers did not normalize to a literal list of records".to_string(),
    };
    let items = match expr {
        Expr::ListLit(_, items) => items,
        _ => return Err(not_ground()),
    };
    let mut pairs = Vec::with_capacity(items.len());
    for item in items {
        let fields = match item {
            Expr::RecordLit(fields) => fields,
            _ => return Err(not_ground()),
        };
        let field = |name: &str| {
            fields
                .iter()
                .find(|(label, _)| label == name)
                .map(|(_, v)| v)
        };
        let (name, value) = match (field("header"), field("value")) {
            (Some(Expr::TextLit(name)), Some(Expr::TextLit(value))) => (name, value),
            _ => return Err(not_ground()),
        };
        pairs.push((name.to_lowercase(), value.clone()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_pairs_lowercase_names() {
        let record = vec![
            (
                "header".to_string(),
                Expr::TextLit("Authorization".to_string()),
            ),
            ("value".to_string(), Expr::TextLit("token abc".to_string())),
        ];
        let list = Expr::ListLit(None, vec![Expr::RecordLit(record)]);
        let pairs = to_header_pairs(&list, "https://example.com").expect("well-shaped headers");
        assert_eq!(
            pairs,
            vec![("authorization".to_string(), "token abc".to_string())]
        );
    }

    #[test]
    fn non_ground_headers_are_rejected() {
        let err = to_header_pairs(&Expr::Bool, "https://example.com").unwrap_err();
        assert!(matches!(err, ImportError::InvalidHeaders { .. }));
    }

    #[test]
    fn request_url_omits_fragment_and_headers() {
        use timbre_core::{Directory, ImportMode, Scheme, Url};
        let import = Import {
            hash: None,
            target: ImportTarget::Remote(Url {
                scheme: Scheme::Https,
                authority: "example.com".to_string(),
                path: File {
                    directory: Directory {
                        components: vec!["pkg".to_string()],
                    },
                    file: "main".to_string(),
                },
                query: Some("tag=v1".to_string()),
                fragment: Some("section".to_string()),
                headers: None,
            }),
            mode: ImportMode::Code,
        };
        assert_eq!(request_url(&import), "https://example.com/pkg/main?tag=v1");
    }
}
