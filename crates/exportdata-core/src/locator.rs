//! Finding the container file for an import path.
//!
//! Artifacts live under search roots at `<root>/<import path>.a` (or `.o`).
//! Before the plain lookup, aliases rewrite the import path and vendor
//! directories next to the importing directory are tried, innermost first:
//!
//! ```text
//! origin  <root>/app/cmd/tool
//! probes  <root>/app/cmd/tool/vendor/<path>.a
//!         <root>/app/cmd/vendor/<path>.a
//!         <root>/app/vendor/<path>.a
//!         <root>/vendor/<path>.a
//!         <root>/<path>.a
//! ```
//!
//! Local imports (`./x`, `../x`) are resolved against the origin directory
//! and name the artifact by directory: `<dir>.a`.

use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

/// Artifact file extensions, in lookup order
pub const ARTIFACT_EXTENSIONS: &[&str] = &["a", "o"];

const VENDOR_DIR: &str = "vendor";

/// A located artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    /// Container file holding the export data
    pub file: PathBuf,
    /// Import path after vendor and alias resolution
    pub canonical_path: String,
}

/// Search roots plus import path rewrite rules
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    roots: Vec<PathBuf>,
    aliases: Vec<(String, String)>,
}

impl SearchPath {
    /// Creates an empty search path
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a search root; earlier roots win
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Adds a prefix rewrite: imports of `from` or `from/...` are looked up
    /// as `to` or `to/...`. The longest matching prefix applies.
    pub fn with_alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.aliases.push((from.into(), to.into()));
        self
    }

    /// Returns the search roots
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Returns the alias rules
    pub fn aliases(&self) -> &[(String, String)] {
        &self.aliases
    }

    /// Finds the artifact for `import_path` as imported from `origin_dir`.
    ///
    /// Returns `None` when no artifact exists. Relative origin directories
    /// are taken relative to the current directory.
    pub fn find(&self, import_path: &str, origin_dir: Option<&Path>) -> Option<Found> {
        if import_path.is_empty() {
            return None;
        }
        let origin = origin_dir.and_then(absolute);

        if is_local(import_path) {
            let dir = normalize(&origin?.join(import_path));
            let canonical_path = dir.to_str()?.to_string();
            return probe(&dir).map(|file| found(file, canonical_path));
        }

        let path = self.rewrite(import_path);

        if let Some(origin) = &origin {
            if let Some(found) = self.find_vendored(&path, origin) {
                return Some(found);
            }
        }

        for root in &self.roots {
            if let Some(file) = probe(&root.join(&path)) {
                return Some(found(file, path));
            }
        }

        trace!("no artifact for '{}'", import_path);
        None
    }

    fn rewrite(&self, import_path: &str) -> String {
        let rule = self
            .aliases
            .iter()
            .filter(|(from, _)| has_path_prefix(import_path, from))
            .max_by_key(|(from, _)| from.len());

        match rule {
            Some((from, to)) => {
                let rewritten = format!("{to}{}", &import_path[from.len()..]);
                trace!("alias '{}' -> '{}'", import_path, rewritten);
                rewritten
            }
            None => import_path.to_string(),
        }
    }

    fn find_vendored(&self, path: &str, origin: &Path) -> Option<Found> {
        for root in &self.roots {
            let root = match absolute(root) {
                Some(root) => normalize(&root),
                None => continue,
            };
            let Ok(rel) = origin.strip_prefix(&root) else {
                continue;
            };

            let mut parts: Vec<&str> = rel
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => s.to_str(),
                    _ => None,
                })
                .collect();

            loop {
                let mut canonical = parts.join("/");
                if !canonical.is_empty() {
                    canonical.push('/');
                }
                canonical.push_str(VENDOR_DIR);
                canonical.push('/');
                canonical.push_str(path);

                if let Some(file) = probe(&root.join(&canonical)) {
                    return Some(found(file, canonical));
                }
                if parts.pop().is_none() {
                    break;
                }
            }
        }
        None
    }
}

fn found(file: PathBuf, canonical_path: String) -> Found {
    debug!("found '{}' at {}", canonical_path, file.display());
    Found {
        file,
        canonical_path,
    }
}

/// Tries each artifact extension on `base`
fn probe(base: &Path) -> Option<PathBuf> {
    ARTIFACT_EXTENSIONS.iter().find_map(|ext| {
        let mut name = base.as_os_str().to_owned();
        name.push(".");
        name.push(ext);
        let candidate = PathBuf::from(name);
        trace!("probing {}", candidate.display());
        candidate.is_file().then_some(candidate)
    })
}

fn is_local(import_path: &str) -> bool {
    import_path == "."
        || import_path == ".."
        || import_path.starts_with("./")
        || import_path.starts_with("../")
}

fn has_path_prefix(path: &str, prefix: &str) -> bool {
    !prefix.is_empty()
        && path.starts_with(prefix)
        && (path.len() == prefix.len() || path.as_bytes()[prefix.len()] == b'/')
}

fn absolute(path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        Some(normalize(path))
    } else {
        std::env::current_dir().ok().map(|cwd| normalize(&cwd.join(path)))
    }
}

/// Removes `.` and `..` components without touching the file system
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
