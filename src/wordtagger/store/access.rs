//! # Access Tokens
//!
//! A storage root is only usable through an [`AccessToken`]: a renewable grant
//! bound to a directory the user approved. Sandboxed platforms back this with
//! their own bookmark machinery; [`PathGrantor`] is the plain implementation
//! for platforms without sandboxing, where a token is stale only when its
//! directory disappeared.
//!
//! ## Scoped Acquisition
//!
//! Access is opened right before a single I/O operation and closed right after
//! it. [`AccessScope`] is the guard: it starts access on creation and stops it
//! on drop, so an early return or `?` cannot leak an open grant.
//!
//! ## Sensitive Paths
//!
//! [`is_sensitive_path`] is a hard safety check applied before any grant,
//! save, or load. It rejects system directories by exact match or prefix,
//! and any path with a component containing a denylisted name, regardless of
//! actual write permission.

use crate::error::{Result, WordTaggerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Matches the path itself or anything below it.
const PROTECTED_PREFIXES: &[&str] = &[
    "/System",
    "/Library",
    "/Applications",
    "/bin",
    "/sbin",
    "/usr",
    "/etc",
    "/dev",
    "/proc",
    "/sys",
    "/boot",
    "/private/etc",
    "/private/var/db",
];

/// Matches the path itself only.
const PROTECTED_EXACT: &[&str] = &["/", "/Users", "/home", "/var", "/private", "/Volumes"];

/// Matches any path component containing one of these (case-insensitive).
const PROTECTED_NAMES: &[&str] = &[".trash", "keychains", ".ssh", ".gnupg", "coreservices"];

/// How a root may be used. A root re-derived from a bare path string, without
/// a grant, is read-only until the user selects it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// Serializable form of a grant, persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub path: PathBuf,
    pub granted_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            granted_at: Utc::now(),
        }
    }
}

pub trait AccessToken: Send + Sync + fmt::Debug {
    fn path(&self) -> &Path;

    /// A stale token must be renewed before use.
    fn is_stale(&self) -> bool;

    /// Opens an access window. Returns `false` when access is refused.
    fn start_access(&self) -> bool;

    fn stop_access(&self);

    fn bookmark(&self) -> Bookmark;
}

pub trait AccessGrantor: Send + Sync {
    /// Grants access to a path the user just chose.
    fn grant(&self, path: &Path) -> Result<Arc<dyn AccessToken>>;

    /// Rebuilds a token from a persisted bookmark.
    fn resolve(&self, bookmark: &Bookmark) -> Result<Arc<dyn AccessToken>>;

    fn renew(&self, token: &dyn AccessToken) -> Result<Arc<dyn AccessToken>> {
        self.resolve(&token.bookmark())
    }
}

/// Open access window on a token; closed on drop.
pub struct AccessScope<'a> {
    token: &'a dyn AccessToken,
}

impl<'a> AccessScope<'a> {
    pub fn acquire(token: &'a dyn AccessToken) -> Result<Self> {
        if !token.start_access() {
            return Err(WordTaggerError::AccessDenied(format!(
                "could not start access to {}",
                token.path().display()
            )));
        }
        Ok(Self { token })
    }
}

impl Drop for AccessScope<'_> {
    fn drop(&mut self) {
        self.token.stop_access();
    }
}

/// Runs `f` against the token's path inside an access window.
pub fn with_access<R>(
    token: &dyn AccessToken,
    f: impl FnOnce(&Path) -> Result<R>,
) -> Result<R> {
    let _scope = AccessScope::acquire(token)?;
    f(token.path())
}

#[derive(Debug)]
pub struct PathToken {
    bookmark: Bookmark,
    open: AtomicUsize,
}

impl PathToken {
    pub fn new(bookmark: Bookmark) -> Self {
        Self {
            bookmark,
            open: AtomicUsize::new(0),
        }
    }

    /// Number of access windows currently open.
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

impl AccessToken for PathToken {
    fn path(&self) -> &Path {
        &self.bookmark.path
    }

    fn is_stale(&self) -> bool {
        !self.bookmark.path.is_dir()
    }

    fn start_access(&self) -> bool {
        if self.is_stale() {
            return false;
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn stop_access(&self) {
        let _ = self
            .open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn bookmark(&self) -> Bookmark {
        self.bookmark.clone()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PathGrantor;

impl AccessGrantor for PathGrantor {
    fn grant(&self, path: &Path) -> Result<Arc<dyn AccessToken>> {
        let path = normalize_path(path);
        if is_sensitive_path(&path) {
            return Err(WordTaggerError::AccessDenied(format!(
                "{} is a protected system location",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(WordTaggerError::InvalidPath(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        Ok(Arc::new(PathToken::new(Bookmark::new(path))))
    }

    fn resolve(&self, bookmark: &Bookmark) -> Result<Arc<dyn AccessToken>> {
        if is_sensitive_path(&bookmark.path) {
            return Err(WordTaggerError::AccessDenied(format!(
                "{} is a protected system location",
                bookmark.path.display()
            )));
        }
        Ok(Arc::new(PathToken::new(bookmark.clone())))
    }
}

/// Absolute form of `path`: canonical when it exists, lexically cleaned otherwise.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

pub fn is_sensitive_path(path: &Path) -> bool {
    let candidates = [path.to_path_buf(), normalize_path(path)];
    candidates.iter().any(|p| matches_denylist(p))
}

fn matches_denylist(path: &Path) -> bool {
    if PROTECTED_EXACT.iter().any(|exact| path == Path::new(exact)) {
        return true;
    }
    if PROTECTED_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        return true;
    }
    path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy().to_lowercase();
        PROTECTED_NAMES.iter().any(|deny| name.contains(deny))
    })
}
