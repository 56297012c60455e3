use crate::error::Rejection;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Current user's home directory, from `$HOME`
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

/// Expand a leading `~` or `~/` to the home directory
///
/// `~user` forms are left alone; they will fail canonicalization later.
pub fn expand_home(raw: &str) -> PathBuf {
    let Some(home) = home_dir() else {
        return PathBuf::from(raw);
    };

    if raw == "~" {
        home
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(raw)
    }
}

/// Confines caller-supplied paths to the configured allowed roots
///
/// Roots are canonicalized when the guard is built, and the guard is built
/// per request, so symlinks that change on disk between requests are
/// re-evaluated every time. A root that no longer exists is dropped rather
/// than compared as a raw string.
#[derive(Debug, Clone)]
pub struct PathGuard {
    roots: Vec<PathBuf>,
    home: Option<PathBuf>,
}

impl PathGuard {
    pub fn new<P: AsRef<Path>>(allowed_roots: &[P]) -> Self {
        let roots = allowed_roots
            .iter()
            .filter_map(|root| match root.as_ref().canonicalize() {
                Ok(canonical) => Some(canonical),
                Err(e) => {
                    debug!(root = %root.as_ref().display(), error = %e, "skipping unresolvable allowed root");
                    None
                }
            })
            .collect();

        let home = home_dir().and_then(|home| home.canonicalize().ok());

        Self { roots, home }
    }

    /// Canonical roots this guard accepts
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolve a raw path to a canonical directory inside an allowed root
    ///
    /// Nonexistent paths are rejected outright; there is no fallback to the
    /// raw string.
    pub fn resolve(&self, raw_path: &str) -> Result<PathBuf, Rejection> {
        // Blank is rejected; anything else is resolved exactly as given.
        if raw_path.trim().is_empty() {
            return Err(Rejection::PathNotAllowed(raw_path.to_string()));
        }

        let resolved = expand_home(raw_path)
            .canonicalize()
            .map_err(|_| Rejection::PathNotAllowed(raw_path.to_string()))?;

        // The home directory itself is never a target, even under a root.
        if self.home.as_deref() == Some(resolved.as_path()) {
            return Err(Rejection::PathNotAllowed(raw_path.to_string()));
        }

        if !resolved.is_dir() || !self.contains(&resolved) {
            return Err(Rejection::PathNotAllowed(raw_path.to_string()));
        }

        Ok(resolved)
    }

    /// Resolve a path-shaped argument relative to an already-resolved base
    ///
    /// The result must exist and stay inside `base`.
    pub fn resolve_within(&self, raw_path: &str, base: &Path) -> Result<PathBuf, Rejection> {
        let expanded = expand_home(raw_path);
        let candidate = if expanded.is_absolute() {
            expanded
        } else {
            base.join(expanded)
        };

        let resolved = candidate
            .canonicalize()
            .map_err(|_| Rejection::PathNotAllowed(raw_path.to_string()))?;

        if resolved.starts_with(base) && self.contains(&resolved) {
            Ok(resolved)
        } else {
            Err(Rejection::PathNotAllowed(raw_path.to_string()))
        }
    }

    /// Whether a canonical path equals or descends from an allowed root
    ///
    /// `Path::starts_with` compares whole components, so `/srv/app2` is not
    /// inside `/srv/app`.
    pub fn contains(&self, canonical: &Path) -> bool {
        self.roots.iter().any(|root| canonical.starts_with(root))
    }
}
