//! Root confinement for filesystem and repository paths.

use crate::error::{GatewayError, ToolError};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

const OUTSIDE_ROOTS: &str = "path outside allowed roots";

#[derive(Debug, Clone)]
struct Root {
    lexical: PathBuf,
    /// Symlink-resolved form, when the root existed at startup.
    canonical: Option<PathBuf>,
}

impl Root {
    fn real(&self) -> &Path {
        self.canonical.as_deref().unwrap_or(&self.lexical)
    }
}

/// A set of absolute directories that candidate paths must stay inside.
///
/// Containment is component-wise (`/data` contains `/data/x` but not `/data-other`), checked on
/// the lexically normalized path and, for paths that exist, again on the symlink-resolved path.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    roots: Vec<Root>,
}

impl PathSandbox {
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if no roots are given or a root is not absolute.
    pub fn new<I, P>(roots: I) -> Result<Self, GatewayError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut out = Vec::new();
        for root in roots {
            let root = root.as_ref();
            if !root.is_absolute() {
                return Err(GatewayError::Config(format!(
                    "root '{}' must be an absolute path",
                    root.display()
                )));
            }
            let lexical = normalize(root);
            let canonical = std::fs::canonicalize(&lexical).ok();
            if canonical.is_none() {
                warn!(root = %lexical.display(), "configured root does not exist");
            }
            out.push(Root { lexical, canonical });
        }
        if out.is_empty() {
            return Err(GatewayError::Config("at least one root is required".into()));
        }
        Ok(Self { roots: out })
    }

    /// Parse a comma-separated root list.
    ///
    /// # Errors
    ///
    /// See [`PathSandbox::new`].
    pub fn from_csv(raw: &str) -> Result<Self, GatewayError> {
        Self::new(raw.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }

    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|r| r.lexical.as_path())
    }

    /// Resolve a caller-supplied path. Relative paths are taken relative to the first root.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArgs`] for an empty candidate and [`ToolError::Policy`] if
    /// the resolved path is not inside any root.
    pub fn resolve(&self, candidate: &str) -> Result<PathBuf, ToolError> {
        if candidate.trim().is_empty() {
            return Err(ToolError::InvalidArgs("path required".into()));
        }
        if candidate.contains('\0') {
            return Err(ToolError::InvalidArgs("path contains NUL".into()));
        }

        let candidate = Path::new(candidate);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.roots[0].lexical.join(candidate)
        };
        let resolved = normalize(&joined);

        if !self.roots.iter().any(|r| resolved.starts_with(&r.lexical)) {
            return Err(ToolError::Policy(OUTSIDE_ROOTS.into()));
        }

        if let Some(real) = resolve_existing_prefix(&resolved) {
            let inside = self.roots.iter().any(|r| real.starts_with(r.real()));
            if !inside {
                return Err(ToolError::Policy(OUTSIDE_ROOTS.into()));
            }
        }

        Ok(resolved)
    }

    /// `true` if an already-resolved path (e.g. a glob hit) is inside a root after symlink
    /// resolution.
    #[must_use]
    pub fn contains_real(&self, path: &Path) -> bool {
        std::fs::canonicalize(path)
            .is_ok_and(|real| self.roots.iter().any(|r| real.starts_with(r.real())))
    }
}

/// Lexically normalize an absolute path: drop `.`, apply `..` (never above `/`).
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor of `path` and re-append the rest.
///
/// Returns `None` only when not even the filesystem root can be resolved.
fn resolve_existing_prefix(path: &Path) -> Option<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut rest: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if let Ok(real) = std::fs::canonicalize(&existing) {
            let mut real = real;
            for part in rest.iter().rev() {
                real.push(part);
            }
            return Some(real);
        }
        let name = existing.file_name()?.to_os_string();
        rest.push(name);
        if !existing.pop() {
            return None;
        }
    }
}
