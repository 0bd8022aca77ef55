//! Picks the document shown when the editor column would otherwise be empty.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use pochi_commons::file_name_key;
use serde::{Deserialize, Serialize};
use tracing::trace;
use url::Url;

use crate::error::LayoutError;

/// Well-known files, most descriptive first.
pub const PRIORITY_FILES: &[&str] = &[
    // Project description
    "README.md",
    "readme.md",
    "README.txt",
    "readme.txt",
    "README",
    "readme",
    "package.json",
    // Entry points
    "index.html",
    "index.htm",
    "index.js",
    "index.ts",
    "main.js",
    "main.ts",
    "app.js",
    "app.ts",
    "src/index.js",
    "src/index.ts",
    "src/main.js",
    "src/main.ts",
    "src/app.js",
    "src/app.ts",
    "main.py",
    "app.py",
    "src/main.py",
    "app/main.py",
    "main.go",
    "src/main.go",
    "lib/main.rs",
    "src/main.rs",
    "src/lib.rs",
    "index.php",
    "src/index.php",
    "public/index.php",
    "Program.cs",
    "Startup.cs",
    "main.swift",
    "Package.swift",
    "Dockerfile",
];

/// Suffixes of files worth opening when no well-known file exists.
pub const TEXT_FILE_EXTENSIONS: &[&str] = &[
    ".md", ".txt", ".js", ".jsx", ".ts", ".tsx", ".c", ".cpp", ".h", ".hpp", ".cs", ".java",
    ".py", ".rb", ".go", ".rs", ".swift", ".kt", ".kts", ".scala", ".groovy", ".php", ".lua",
    ".r", ".dart", ".sh", ".bash", ".zsh", ".ps1", ".sql", ".html", ".htm", ".css", ".scss",
    ".sass", ".less", ".vue", ".svelte", ".json", ".xml", ".yml", ".yaml", ".toml", ".ini",
    ".cfg",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DefaultDocument {
    /// Existing file, relative to the workspace root.
    File { path: PathBuf },
    /// Blank plaintext document.
    Untitled,
}

impl DefaultDocument {
    /// URI the document opens under. `cwd` must be absolute.
    pub fn uri(&self, cwd: &Path) -> Result<String, LayoutError> {
        match self {
            Self::File { path } => {
                let path = cwd.join(path);
                Url::from_file_path(&path)
                    .map(String::from)
                    .map_err(|()| LayoutError::InvalidDocumentPath { path })
            }
            Self::Untitled => Ok("untitled:Untitled-1".to_string()),
        }
    }
}

/// Picks a document from workspace-relative `files` (forward slashes, listing order).
pub fn resolve_default_document<S: AsRef<str>>(files: &[S]) -> DefaultDocument {
    if let Some(found) = PRIORITY_FILES
        .iter()
        .find(|candidate| files.iter().any(|file| file.as_ref() == **candidate))
    {
        return DefaultDocument::File {
            path: PathBuf::from(found),
        };
    }

    files
        .iter()
        .map(AsRef::as_ref)
        .find(|file| TEXT_FILE_EXTENSIONS.iter().any(|ext| file.ends_with(ext)))
        .map_or(DefaultDocument::Untitled, |file| DefaultDocument::File {
            path: PathBuf::from(file),
        })
}

/// Lists up to `limit` files under `cwd`, honouring ignore files.
pub fn list_workspace_files(cwd: &Path, limit: usize) -> Result<Vec<String>, LayoutError> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(cwd)
        .sort_by_file_path(Ord::cmp)
        .require_git(false)
        .build();

    for entry in walker {
        let entry = entry.map_err(|source| LayoutError::WorkspaceListing {
            path: cwd.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(cwd) else {
            continue;
        };
        files.push(file_name_key(relative));
        if files.len() >= limit {
            break;
        }
    }
    Ok(files)
}

/// Resolves the default document for a workspace on disk.
pub async fn find_default_document(
    cwd: &Path,
    limit: usize,
) -> Result<DefaultDocument, LayoutError> {
    let root = cwd.to_path_buf();
    let files = tokio::task::spawn_blocking(move || list_workspace_files(&root, limit))
        .await
        .map_err(|error| LayoutError::Other(error.into()))??;
    let document = resolve_default_document(&files);
    trace!(cwd = %cwd.display(), scanned = files.len(), ?document, "resolved default document");
    Ok(document)
}
