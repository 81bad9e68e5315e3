//! Content-addressed on-disk cache for hashed imports.
//!
//! Layout: `$XDG_CACHE_HOME/timbre/<hex sha256>` (falling back to
//! `$HOME/.cache/timbre`), one file per expected digest, containing the
//! canonical encoding of the α-normalized β/η-normal expression. The cache is
//! shared between sessions and processes: a present file is re-verified
//! against its digest before use, and writes go through an atomic rename so
//! a racing reader never observes a partial file.
//!
//! The cache degrades to "unavailable" rather than failing resolution:
//! unreadable roots, non-private directories, and write errors all fall
//! through to uncached fetching, with a warning.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;

use timbre_core::{
    alpha_normalize, decode_expression, encode_expression, normalize, type_with, Context, Expr,
    ProtocolVersion,
};

use crate::error::ImportError;

/// Outcome of probing the cache for an expected digest.
pub(crate) enum CacheLookup {
    /// The entry existed, its bytes matched the digest, and they decoded.
    Hit(Expr),
    /// No entry; the path is where a freshly resolved expression should be
    /// persisted.
    Miss(PathBuf),
    /// No usable cache directory; resolve without the disk cache.
    Unavailable,
}

/// Probe the cache in read mode. A present entry whose bytes do not hash to
/// `expected` is an integrity failure, not a miss.
pub(crate) fn fetch_from_cache(
    version: ProtocolVersion,
    expected: &str,
) -> Result<CacheLookup, ImportError> {
    let Some(root) = ensure_cache_directory() else {
        return Ok(CacheLookup::Unavailable);
    };
    let path = root.join(expected);
    if !path.is_file() {
        return Ok(CacheLookup::Miss(path));
    }
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("unreadable cache entry {}: {}", path.display(), e);
            return Ok(CacheLookup::Unavailable);
        }
    };
    let actual = format!("{:x}", Sha256::digest(&bytes));
    if actual != expected {
        return Err(ImportError::HashMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    let expr = decode_expression(version, &bytes).map_err(|cause| ImportError::Decode {
        hash: expected.to_string(),
        cause,
    })?;
    Ok(CacheLookup::Hit(expr))
}

/// Persist verified canonical bytes with an atomic rename. Failures leave
/// the session uncached.
pub(crate) fn persist(path: &Path, bytes: &[u8]) {
    let Some(parent) = path.parent() else {
        return;
    };
    match tempfile::NamedTempFile::new_in(parent) {
        Ok(mut staged) => {
            if let Err(e) = staged.write_all(bytes) {
                warn!("could not stage cache entry {}: {}", path.display(), e);
                return;
            }
            if let Err(e) = staged.persist(path) {
                warn!("could not persist cache entry {}: {}", path.display(), e);
            }
        }
        Err(e) => warn!(
            "could not create a staging file next to {}: {}",
            path.display(),
            e
        ),
    }
}

/// Normalize, encode, and store `expr` under its own digest, returning the
/// lowercase hex digest on success. An expression that fails to type-check
/// is silently skipped (the cache only ever holds well-typed entries).
pub fn write_expression_to_cache(
    version: ProtocolVersion,
    context: &Context,
    expr: &Expr,
) -> Option<String> {
    if type_with(context, expr).is_err() {
        return None;
    }
    let normalized = alpha_normalize(&normalize(expr));
    let bytes = encode_expression(version, &normalized).ok()?;
    let digest = format!("{:x}", Sha256::digest(&bytes));
    let root = ensure_cache_directory()?;
    persist(&root.join(&digest), &bytes);
    Some(digest)
}

// ── Cache directory discovery ────────────────────────────────────────

fn cache_root() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CACHE_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg).join("timbre"));
        }
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache").join("timbre"))
}

/// The cache directory, created owner-only if needed. `None` when no root
/// can be derived or an existing directory on the path is not
/// owner-accessible.
pub(crate) fn ensure_cache_directory() -> Option<PathBuf> {
    let root = cache_root()?;
    match ensure_private_directory(&root) {
        Ok(()) => Some(root),
        Err(e) => {
            warn!("import cache unavailable at {}: {}", root.display(), e);
            None
        }
    }
}

/// Create `dir` (and missing ancestors) with owner-only permissions. Every
/// directory already on the path must grant its owner read, write, and
/// search, or the cache is refused.
fn ensure_private_directory(dir: &Path) -> std::io::Result<()> {
    match fs::metadata(dir) {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(std::io::Error::other(format!(
                    "{} is not a directory",
                    dir.display()
                )));
            }
            check_owner_accessible(dir, &metadata)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = dir.parent() {
                if !parent.as_os_str().is_empty() {
                    ensure_private_directory(parent)?;
                }
            }
            match create_private_dir(dir) {
                Ok(()) => Ok(()),
                // racing writer got there first; verify what it made
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let metadata = fs::metadata(dir)?;
                    check_owner_accessible(dir, &metadata)
                }
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir(dir)
}

#[cfg(unix)]
fn check_owner_accessible(dir: &Path, metadata: &fs::Metadata) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = metadata.permissions().mode();
    if mode & 0o700 == 0o700 {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!(
                "{} is not owner-accessible (mode {:o})",
                dir.display(),
                mode & 0o777
            ),
        ))
    }
}

#[cfg(not(unix))]
fn check_owner_accessible(_dir: &Path, _metadata: &fs::Metadata) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `XDG_CACHE_HOME` is process-global; tests that redirect it serialize
    // here.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn write_expression_to_cache_stores_under_its_own_digest() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let tmp = tempfile::TempDir::new().expect("tempdir");
        std::env::set_var("XDG_CACHE_HOME", tmp.path());

        let expr = Expr::BoolAnd(
            Box::new(Expr::BoolLit(true)),
            Box::new(Expr::BoolLit(false)),
        );
        let digest = write_expression_to_cache(ProtocolVersion::V1, &Context::new(), &expr)
            .expect("well-typed expressions are written");

        let entry = tmp.path().join("timbre").join(&digest);
        assert!(entry.is_file(), "entry written under its digest");

        let bytes = fs::read(&entry).expect("readable entry");
        assert_eq!(format!("{:x}", Sha256::digest(&bytes)), digest);
        let decoded = decode_expression(ProtocolVersion::V1, &bytes).expect("canonical bytes");
        assert_eq!(decoded, alpha_normalize(&normalize(&expr)));

        std::env::remove_var("XDG_CACHE_HOME");
    }

    #[test]
    fn write_expression_to_cache_silently_skips_ill_typed_expressions() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let tmp = tempfile::TempDir::new().expect("tempdir");
        std::env::set_var("XDG_CACHE_HOME", tmp.path());

        // True applied to False is not a function application that checks
        let ill_typed = Expr::App(
            Box::new(Expr::BoolLit(true)),
            Box::new(Expr::BoolLit(false)),
        );
        let written =
            write_expression_to_cache(ProtocolVersion::V1, &Context::new(), &ill_typed);
        assert!(written.is_none(), "the write is skipped, not reported");
        assert!(
            !tmp.path().join("timbre").exists(),
            "nothing is created for a skipped write"
        );

        std::env::remove_var("XDG_CACHE_HOME");
    }

    #[test]
    fn written_entries_satisfy_a_cache_read() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let tmp = tempfile::TempDir::new().expect("tempdir");
        std::env::set_var("XDG_CACHE_HOME", tmp.path());

        let expr = Expr::TextLit("pre-seeded".to_string());
        let digest = write_expression_to_cache(ProtocolVersion::V1, &Context::new(), &expr)
            .expect("writes");
        match fetch_from_cache(ProtocolVersion::V1, &digest).expect("no integrity failure") {
            CacheLookup::Hit(found) => assert_eq!(found, expr),
            _ => panic!("expected the pre-seeded entry to hit"),
        }

        std::env::remove_var("XDG_CACHE_HOME");
    }

    #[test]
    fn creates_missing_directories_owner_only() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let target = tmp.path().join("a").join("b").join("timbre");
        ensure_private_directory(&target).expect("should create the chain");
        assert!(target.is_dir());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&target).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn ensure_is_idempotent() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let target = tmp.path().join("timbre");
        ensure_private_directory(&target).expect("first");
        ensure_private_directory(&target).expect("second");
    }

    #[cfg(unix)]
    #[test]
    fn refuses_non_private_existing_directory() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let target = tmp.path().join("locked");
        fs::create_dir(&target).unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o500)).unwrap();
        let err = ensure_private_directory(&target).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::PermissionDenied);
        // restore so the tempdir can be cleaned up
        fs::set_permissions(&target, fs::Permissions::from_mode(0o700)).unwrap();
    }

    #[test]
    fn persist_is_atomic_replace() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = tmp.path().join("entry");
        persist(&path, b"first");
        persist(&path, b"second");
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }
}
