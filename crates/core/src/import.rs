//! Import data model and path algebra.
//!
//! An [`Import`] is a triple of optional integrity hash, locator
//! ([`ImportTarget`]), and interpretation mode ([`ImportMode`]). Two imports
//! denote the same resolution target exactly when their canonical forms are
//! equal, so everything here derives `Eq`/`Hash` and canonicalization is
//! idempotent.
//!
//! Composition (`Import::chain`) resolves a child import written inside a
//! parent expression against that parent's locator: `./b` inside `./a/x`
//! becomes `./a/b`, `./b` inside `https://host/a/x` becomes
//! `https://host/a/b`, and everything that is not current-directory-relative
//! ignores its parent.

use std::fmt;

/// How a local path is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilePrefix {
    /// `/…` -- filesystem root
    Absolute,
    /// `./…` -- interpreted against the process working directory
    Here,
    /// `../…` -- a relative path whose leading `..` survives canonicalization
    Parent,
    /// `~/…` -- the user's home directory
    Home,
}

/// An ordered sequence of path components, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Directory {
    pub components: Vec<String>,
}

impl Directory {
    /// Drop `.` components and cancel `..` against the innermost preceding
    /// component; a leading run of `..` is retained. Idempotent.
    pub fn canonicalize(&self) -> Directory {
        let mut canon: Vec<String> = Vec::new();
        for component in &self.components {
            match component.as_str() {
                "." => {}
                ".." => match canon.last().map(String::as_str) {
                    None | Some("..") => canon.push("..".to_string()),
                    Some(_) => {
                        canon.pop();
                    }
                },
                _ => canon.push(component.clone()),
            }
        }
        Directory { components: canon }
    }
}

/// A directory plus a final file component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct File {
    pub directory: Directory,
    pub file: String,
}

impl File {
    pub fn canonicalize(&self) -> File {
        File {
            directory: self.directory.canonicalize(),
            file: self.file.clone(),
        }
    }

    /// Interpret `child` relative to this file's directory: the directories
    /// concatenate and the child's filename wins.
    fn chain(&self, child: &File) -> File {
        let mut components = self.directory.components.clone();
        components.extend(child.directory.components.iter().cloned());
        File {
            directory: Directory { components },
            file: child.file.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// A remote locator. The optional `headers` import must resolve to a value
/// of type `List { header : Text, value : Text }` and is attached to the
/// request when the URL is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Url {
    pub scheme: Scheme,
    pub authority: String,
    pub path: File,
    pub query: Option<String>,
    pub fragment: Option<String>,
    pub headers: Option<Box<Import>>,
}

impl Url {
    fn canonicalize(&self) -> Url {
        Url {
            scheme: self.scheme,
            authority: self.authority.clone(),
            path: self.path.canonicalize(),
            query: self.query.clone(),
            fragment: self.fragment.clone(),
            headers: self
                .headers
                .as_ref()
                .map(|h| Box::new(h.canonicalize())),
        }
    }
}

/// Where an import's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportTarget {
    Local(FilePrefix, File),
    Remote(Url),
    Env(String),
    /// The `missing` sentinel; fetching it always fails with an empty
    /// missing-imports set, which makes it the unit of the `?` operator.
    Missing,
}

/// Whether fetched text is parsed as an expression or wrapped verbatim as a
/// text literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportMode {
    Code,
    RawText,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Import {
    /// Expected SHA-256 of the canonical encoding of the resolved,
    /// normalized expression, as lowercase hex.
    pub hash: Option<String>,
    pub target: ImportTarget,
    pub mode: ImportMode,
}

impl Import {
    /// Local, environment, and `missing` imports are local; remote URLs are
    /// not. A local import may not be reached from a non-local parent.
    pub fn is_local(&self) -> bool {
        !matches!(self.target, ImportTarget::Remote(_))
    }

    /// Canonicalize the locator's path components; hash and mode are kept.
    pub fn canonicalize(&self) -> Import {
        let target = match &self.target {
            ImportTarget::Local(prefix, file) => {
                ImportTarget::Local(*prefix, file.canonicalize())
            }
            ImportTarget::Remote(url) => ImportTarget::Remote(url.canonicalize()),
            ImportTarget::Env(name) => ImportTarget::Env(name.clone()),
            ImportTarget::Missing => ImportTarget::Missing,
        };
        Import {
            hash: self.hash.clone(),
            target,
            mode: self.mode,
        }
    }

    /// Resolve `child` against `parent`, yielding the child's effective
    /// locator. Only current-directory-relative children compose; absolute,
    /// home, parent-relative, remote, environment, and `missing` children
    /// stand on their own. The child's hash and mode always win.
    pub fn chain(parent: &Import, child: &Import) -> Import {
        let target = match (&parent.target, &child.target) {
            (ImportTarget::Local(prefix, parent_file), ImportTarget::Local(FilePrefix::Here, f)) => {
                ImportTarget::Local(*prefix, parent_file.chain(f))
            }
            (ImportTarget::Remote(url), ImportTarget::Local(FilePrefix::Here, f)) => {
                let mut url = url.clone();
                url.path = url.path.chain(f);
                ImportTarget::Remote(url)
            }
            _ => child.target.clone(),
        };
        Import {
            hash: child.hash.clone(),
            target,
            mode: child.mode,
        }
    }
}

// ── Rendering ────────────────────────────────────────────────────────

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.directory, self.file)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)?;
        if let Some(q) = &self.query {
            write!(f, "?{}", q)?;
        }
        if let Some(fr) = &self.fragment {
            write!(f, "#{}", fr)?;
        }
        if let Some(h) = &self.headers {
            write!(f, " using {}", h)?;
        }
        Ok(())
    }
}

impl fmt::Display for ImportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportTarget::Local(FilePrefix::Absolute, file) => write!(f, "{}", file),
            ImportTarget::Local(FilePrefix::Here, file) => write!(f, ".{}", file),
            ImportTarget::Local(FilePrefix::Parent, file) => write!(f, "..{}", file),
            ImportTarget::Local(FilePrefix::Home, file) => write!(f, "~{}", file),
            ImportTarget::Remote(url) => write!(f, "{}", url),
            ImportTarget::Env(name) => write!(f, "env:{}", name),
            ImportTarget::Missing => write!(f, "missing"),
        }
    }
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)?;
        if let Some(hash) = &self.hash {
            write!(f, " sha256:{}", hash)?;
        }
        if self.mode == ImportMode::RawText {
            write!(f, " as Text")?;
        }
        Ok(())
    }
}
