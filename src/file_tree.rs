//! In-memory project file tree.
//!
//! The tree is the unit exchanged with the sandbox mount call. Its serialized
//! shape is the usual web-container layout:
//!
//! ```text
//! {
//!   "package.json": { "file": { "contents": "..." } },
//!   "src": { "directory": { "App.tsx": { "file": { "contents": "..." } } } }
//! }
//! ```
//!
//! Names are map keys, so they are unique within a directory. Binary contents
//! serialize as a byte array and come back as bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::constants::IGNORED_PROJECT_DIRS;

/// Contents of a file node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileContents {
    /// UTF-8 text.
    Text(String),
    /// Arbitrary bytes.
    Binary(Vec<u8>),
}

impl FileContents {
    /// Text view, `None` for binary contents.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Raw bytes of the contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(e) => Self::Binary(e.into_bytes()),
        }
    }
}

/// A file or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSystemNode {
    /// Regular file.
    File {
        /// File contents.
        contents: FileContents,
    },
    /// Directory with its children.
    Directory(FileTree),
}

/// Errors from path-based tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTreeError {
    /// Path is empty, absolute-escaping, or contains `..`.
    InvalidPath(String),
    /// A parent directory along the path does not exist.
    MissingParent(String),
    /// The path names a directory (or traverses a file).
    NotAFile(String),
}

impl fmt::Display for FileTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPath(path) => write!(f, "Invalid path: {path}"),
            Self::MissingParent(path) => write!(f, "Parent directory missing for: {path}"),
            Self::NotAFile(path) => write!(f, "Not a file: {path}"),
        }
    }
}

impl std::error::Error for FileTreeError {}

/// Split a project-relative path into segments.
///
/// Accepts `a/b`, `./a/b` and `/a/b`; rejects empty paths and `..`.
pub fn split_path(path: &str) -> Result<Vec<&str>, FileTreeError> {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.is_empty() || segments.contains(&"..") {
        return Err(FileTreeError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Recursive mapping from name to file or directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTree(BTreeMap<String, FileSystemNode>);

impl FileTree {
    /// Empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of direct entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the tree has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Direct entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &FileSystemNode)> {
        self.0.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Look up a node by path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileSystemNode> {
        let segments = split_path(path).ok()?;
        let (last, parents) = segments.split_last()?;
        let mut dir = self;
        for segment in parents {
            match dir.0.get(*segment)? {
                FileSystemNode::Directory(children) => dir = children,
                FileSystemNode::File { .. } => return None,
            }
        }
        dir.0.get(*last)
    }

    /// Text contents of the file at `path`.
    #[must_use]
    pub fn read_text(&self, path: &str) -> Option<&str> {
        match self.get(path)? {
            FileSystemNode::File { contents } => contents.as_text(),
            FileSystemNode::Directory(_) => None,
        }
    }

    /// Replace or create the file at `path`. Parent directories must exist.
    pub fn write_text(&mut self, path: &str, contents: &str) -> Result<(), FileTreeError> {
        let segments = split_path(path)?;
        let dir = self.parent_dir_mut(&segments, false, path)?;
        let name = segments[segments.len() - 1];
        if matches!(dir.0.get(name), Some(FileSystemNode::Directory(_))) {
            return Err(FileTreeError::NotAFile(path.to_string()));
        }
        dir.0.insert(
            name.to_string(),
            FileSystemNode::File {
                contents: FileContents::Text(contents.to_string()),
            },
        );
        Ok(())
    }

    /// Insert a file, creating missing parent directories.
    pub fn insert_file(
        &mut self,
        path: &str,
        contents: FileContents,
    ) -> Result<(), FileTreeError> {
        let segments = split_path(path)?;
        let dir = self.parent_dir_mut(&segments, true, path)?;
        let name = segments[segments.len() - 1];
        if matches!(dir.0.get(name), Some(FileSystemNode::Directory(_))) {
            return Err(FileTreeError::NotAFile(path.to_string()));
        }
        dir.0
            .insert(name.to_string(), FileSystemNode::File { contents });
        Ok(())
    }

    fn parent_dir_mut(
        &mut self,
        segments: &[&str],
        create: bool,
        path: &str,
    ) -> Result<&mut FileTree, FileTreeError> {
        let mut dir = self;
        for segment in &segments[..segments.len() - 1] {
            if create && !dir.0.contains_key(*segment) {
                dir.0.insert(
                    (*segment).to_string(),
                    FileSystemNode::Directory(FileTree::new()),
                );
            }
            dir = match dir.0.get_mut(*segment) {
                Some(FileSystemNode::Directory(children)) => children,
                Some(FileSystemNode::File { .. }) => {
                    return Err(FileTreeError::NotAFile(path.to_string()))
                }
                None => return Err(FileTreeError::MissingParent(path.to_string())),
            };
        }
        Ok(dir)
    }

    /// All files as `(path, contents)`, depth-first in name order.
    #[must_use]
    pub fn files(&self) -> Vec<(String, &FileContents)> {
        let mut out = Vec::new();
        self.collect_files("", &mut out);
        out
    }

    fn collect_files<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a FileContents)>) {
        for (name, node) in &self.0 {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            match node {
                FileSystemNode::File { contents } => out.push((path, contents)),
                FileSystemNode::Directory(children) => children.collect_files(&path, out),
            }
        }
    }

    /// Load a project directory, skipping dependency and build folders.
    pub fn from_dir(dir: &Path) -> io::Result<Self> {
        let mut tree = Self::new();
        let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(fs::DirEntry::file_name);
        for entry in entries {
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if IGNORED_PROJECT_DIRS.contains(&name.as_str()) {
                    continue;
                }
                let children = Self::from_dir(&entry.path())?;
                tree.0.insert(name, FileSystemNode::Directory(children));
            } else if file_type.is_file() {
                let contents = FileContents::from_bytes(fs::read(entry.path())?);
                tree.0.insert(name, FileSystemNode::File { contents });
            }
        }
        Ok(tree)
    }

    /// Materialize the tree under `dir`, creating directories as needed.
    pub fn write_to_dir(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        for (name, node) in &self.0 {
            let path = dir.join(name);
            match node {
                FileSystemNode::File { contents } => fs::write(&path, contents.as_bytes())?,
                FileSystemNode::Directory(children) => children.write_to_dir(&path)?,
            }
        }
        Ok(())
    }

    /// Default project: a minimal Vite + React + TypeScript app.
    #[must_use]
    pub fn vite_react_template() -> Self {
        let mut tree = Self::new();
        let files: [(&str, &str); 5] = [
            ("package.json", TEMPLATE_PACKAGE_JSON),
            ("index.html", TEMPLATE_INDEX_HTML),
            ("vite.config.ts", TEMPLATE_VITE_CONFIG),
            ("src/main.tsx", TEMPLATE_MAIN_TSX),
            ("src/App.tsx", TEMPLATE_APP_TSX),
        ];
        for (path, contents) in files {
            // Template paths are static and valid
            let _ = tree.insert_file(path, FileContents::Text(contents.to_string()));
        }
        tree
    }
}

const TEMPLATE_PACKAGE_JSON: &str = r#"{
  "name": "preview-app",
  "private": true,
  "version": "0.0.0",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "vite build"
  },
  "dependencies": {
    "react": "^18.3.1",
    "react-dom": "^18.3.1"
  },
  "devDependencies": {
    "@vitejs/plugin-react": "^4.3.1",
    "typescript": "^5.5.3",
    "vite": "^5.4.1"
  }
}
"#;

const TEMPLATE_INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Preview</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.tsx"></script>
  </body>
</html>
"#;

const TEMPLATE_VITE_CONFIG: &str = r"import { defineConfig } from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({
  plugins: [react()],
})
";

const TEMPLATE_MAIN_TSX: &str = r"import { StrictMode } from 'react'
import { createRoot } from 'react-dom/client'
import App from './App'

createRoot(document.getElementById('root')!).render(
  <StrictMode>
    <App />
  </StrictMode>,
)
";

const TEMPLATE_APP_TSX: &str = r#"import { useState } from 'react'

function App() {
  const [count, setCount] = useState<number>(0)

  return (
    <>
      <h1 className="title">Vite + React</h1>
      <div className="card">
        <button onClick={() => setCount((count) => count + 1)}>
          count is {count}
        </button>
        <p>
          Edit <code>src/App.tsx</code> and save to test HMR
        </p>
      </div>
    </>
  )
}

export default App
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_tree() -> FileTree {
        let mut tree = FileTree::new();
        tree.insert_file("package.json", FileContents::Text("{}".to_string()))
            .unwrap();
        tree.insert_file("src/App.tsx", FileContents::Text("<div/>".to_string()))
            .unwrap();
        tree.insert_file("public/logo.png", FileContents::Binary(vec![0x89, 0xff, 0x00]))
            .unwrap();
        tree
    }

    #[test]
    fn test_serializes_in_exchange_format() {
        let tree = sample_tree();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            json["src"]["directory"]["App.tsx"]["file"]["contents"],
            "<div/>"
        );
        assert_eq!(json["package.json"]["file"]["contents"], "{}");

        let parsed: FileTree = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn test_read_and_write_text() {
        let mut tree = sample_tree();
        assert_eq!(tree.read_text("src/App.tsx"), Some("<div/>"));
        assert_eq!(tree.read_text("./src/App.tsx"), Some("<div/>"));
        assert_eq!(tree.read_text("public/logo.png"), None);
        assert_eq!(tree.read_text("src"), None);

        tree.write_text("src/App.tsx", "<span/>").unwrap();
        assert_eq!(tree.read_text("src/App.tsx"), Some("<span/>"));
    }

    #[test]
    fn test_write_text_requires_parent() {
        let mut tree = sample_tree();
        assert_eq!(
            tree.write_text("lib/util.ts", "x"),
            Err(FileTreeError::MissingParent("lib/util.ts".to_string()))
        );
        assert_eq!(
            tree.write_text("src", "x"),
            Err(FileTreeError::NotAFile("src".to_string()))
        );
        assert!(matches!(
            tree.write_text("../etc/passwd", "x"),
            Err(FileTreeError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_files_lists_depth_first_sorted() {
        let tree = sample_tree();
        let paths: Vec<String> = tree.files().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["package.json", "public/logo.png", "src/App.tsx"]);
    }

    #[test]
    fn test_disk_roundtrip_is_lossless() {
        let tree = sample_tree();
        let temp_dir = TempDir::new().unwrap();
        tree.write_to_dir(temp_dir.path()).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("node_modules/react")).unwrap();

        let loaded = FileTree::from_dir(temp_dir.path()).unwrap();
        assert_eq!(loaded, tree);
    }

    #[test]
    fn test_template_has_entry_file() {
        let tree = FileTree::vite_react_template();
        assert!(tree.read_text("src/App.tsx").unwrap().contains("className=\"card\""));
        assert!(tree.read_text("package.json").is_some());
    }
}
