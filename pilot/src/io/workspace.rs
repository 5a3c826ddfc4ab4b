//! File access confined to a single project root.
//!
//! Every path coming from a plan is resolved against the root and rejected if
//! it lands outside it, before any filesystem call is made.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

/// Failure of a workspace operation.
#[derive(Debug)]
pub enum WorkspaceError {
    /// The path resolves outside the workspace root.
    PathTraversal { path: String },
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for WorkspaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceError::PathTraversal { path } => {
                write!(f, "path escapes the workspace root: {path}")
            }
            WorkspaceError::Io { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl std::error::Error for WorkspaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkspaceError::PathTraversal { .. } => None,
            WorkspaceError::Io { source, .. } => Some(source),
        }
    }
}

/// Read/write/delete/list access to files under one root directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open a workspace rooted at an existing directory.
    pub fn open(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("resolve workspace root {}", root.display()))?;
        if !root.is_dir() {
            anyhow::bail!("workspace root is not a directory: {}", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `rel` to an absolute path under the root.
    ///
    /// Resolution is lexical: `.` and `..` are folded without consulting the
    /// filesystem, so nothing is touched for a rejected path.
    pub fn resolve(&self, rel: &str) -> Result<PathBuf, WorkspaceError> {
        let mut resolved = self.root.clone();
        for component in Path::new(rel).components() {
            match component {
                Component::Prefix(prefix) => resolved = PathBuf::from(prefix.as_os_str()),
                Component::RootDir => resolved.push(Component::RootDir.as_os_str()),
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(part) => resolved.push(part),
            }
        }
        if !resolved.starts_with(&self.root) {
            warn!(path = rel, "rejected path outside workspace");
            return Err(WorkspaceError::PathTraversal {
                path: rel.to_string(),
            });
        }
        Ok(resolved)
    }

    #[instrument(skip(self))]
    pub fn read(&self, rel: &str) -> Result<String, WorkspaceError> {
        let path = self.resolve(rel)?;
        fs::read_to_string(&path).map_err(|source| WorkspaceError::Io { path, source })
    }

    /// Write `content` to `rel`, creating parent directories. Existing files
    /// are overwritten.
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub fn write(&self, rel: &str, content: &str) -> Result<(), WorkspaceError> {
        let path = self.resolve(rel)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, content).map_err(|source| WorkspaceError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "wrote file");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete(&self, rel: &str) -> Result<(), WorkspaceError> {
        let path = self.resolve(rel)?;
        fs::remove_file(&path).map_err(|source| WorkspaceError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "deleted file");
        Ok(())
    }

    /// Entry names of directory `rel` (the root when `None`), sorted.
    #[instrument(skip(self))]
    pub fn list(&self, rel: Option<&str>) -> Result<Vec<String>, WorkspaceError> {
        let path = self.resolve(rel.unwrap_or("."))?;
        let entries = fs::read_dir(&path).map_err(|source| WorkspaceError::Io {
            path: path.clone(),
            source,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| WorkspaceError::Io {
                path: path.clone(),
                source,
            })?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
