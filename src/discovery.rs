use crate::config::Config;
use crate::error::{MemoptError, Result};
use globset::Glob;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// A loaded memory document. Content is read once per phase.
#[derive(Serialize, Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    #[serde(skip)]
    pub content: String,
    pub bytes: usize,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            bytes: content.len(),
            content,
        }
    }

    pub fn file_name(&self) -> String {
        file_name(&self.path)
    }
}

/// Result of loading the candidate files.
#[derive(Debug, Default)]
pub struct Loaded {
    pub documents: Vec<Document>,
    pub warnings: Vec<String>,
}

/// Workspace facts that feed the score bonuses.
#[derive(Serialize, Debug, Clone, Copy, Default)]
pub struct WorkspaceLayout {
    pub has_memory_dir: bool,
    pub has_primary: bool,
}

impl WorkspaceLayout {
    pub fn probe(workspace: &Path, config: &Config) -> Self {
        Self {
            has_memory_dir: workspace.join(&config.memory_dir).is_dir(),
            has_primary: workspace.join(&config.primary_document).is_file(),
        }
    }
}

/// Resolve the workspace root, failing when it does not exist.
pub fn resolve_workspace(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Err(MemoptError::WorkspaceNotFound(path.to_path_buf()));
    }
    Ok(fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
}

/// Candidate files: the primary document, then the other root documents,
/// then `memory_dir/*.md` sorted by name.
pub fn discover(workspace: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    let root_names = std::iter::once(&config.primary_document).chain(config.root_documents.iter());
    for name in root_names {
        let p = workspace.join(name);
        if p.is_file() && !found.contains(&p) {
            found.push(p);
        }
    }

    let memory_dir = workspace.join(&config.memory_dir);
    if memory_dir.is_dir() {
        let matcher = Glob::new(&config.memory_glob)
            .map_err(|e| MemoptError::InvalidConfig(format!("memory_glob: {}", e)))?
            .compile_matcher();

        let read_dir = fs::read_dir(&memory_dir).map_err(|source| MemoptError::Read {
            path: memory_dir.clone(),
            source,
        })?;

        let mut notes: Vec<PathBuf> = read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| p.file_name().map(|n| matcher.is_match(n)).unwrap_or(false))
            .collect();
        notes.sort_by_key(|p| file_name(p));
        found.extend(notes);
    }

    tracing::debug!(count = found.len(), "discovered candidate files");
    Ok(found)
}

/// Read every candidate. Invalid UTF-8 is replaced; I/O failures become
/// warnings and the file is left out.
pub fn load_documents(paths: &[PathBuf]) -> Loaded {
    let mut loaded = Loaded::default();

    for path in paths {
        match fs::read(path) {
            Ok(raw) => {
                let content = String::from_utf8_lossy(&raw).into_owned();
                loaded.documents.push(Document::new(path.clone(), content));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                loaded.warnings.push(format!("Could not read {}: {}", path.display(), e));
            }
        }
    }

    tracing::debug!(
        files = loaded.documents.len(),
        bytes = loaded.documents.iter().map(|d| d.bytes).sum::<usize>(),
        "loaded documents"
    );
    loaded
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
