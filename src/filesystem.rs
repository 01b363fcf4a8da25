//! In-memory view of one library's files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// A library file's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub content: Vec<u8>,
}

impl File {
    pub fn new(content: Vec<u8>) -> Self {
        Self { content }
    }

    pub fn from_string(content: &str) -> Self {
        Self::new(content.as_bytes().to_vec())
    }

    /// The content as UTF-8 text
    pub fn as_str(&self, path: &Path) -> Result<&str> {
        std::str::from_utf8(&self.content).map_err(|_| Error::Processor {
            path: path.display().to_string(),
            message: "file is not valid UTF-8".to_string(),
        })
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Read-only snapshot of a library's files, keyed by path relative to the
/// library root. Iteration is ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryFs {
    name: String,
    files: BTreeMap<PathBuf, File>,
}

impl LibraryFs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: BTreeMap::new(),
        }
    }

    /// The label used for this library in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add or replace a file
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P, file: File) {
        self.files.insert(normalize(path.as_ref()), file);
    }

    pub fn add_file_string<P: AsRef<Path>>(&mut self, path: P, content: &str) {
        self.add_file(path, File::from_string(content));
    }

    /// Builder form of [`add_file_string`](Self::add_file_string)
    pub fn with_file<P: AsRef<Path>>(mut self, path: P, content: &str) -> Self {
        self.add_file_string(path, content);
        self
    }

    pub fn get_file<P: AsRef<Path>>(&self, path: P) -> Option<&File> {
        self.files.get(&normalize(path.as_ref()))
    }

    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.files.contains_key(&normalize(path.as_ref()))
    }

    /// All paths, sorted
    pub fn list_files(&self) -> Vec<&Path> {
        self.files.keys().map(PathBuf::as_path).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over all files as (path, file) pairs, sorted by path
    pub fn files(&self) -> impl Iterator<Item = (&Path, &File)> {
        self.files.iter().map(|(path, file)| (path.as_path(), file))
    }
}

/// Strip `./` prefixes so `a.json` and `./a.json` are the same file.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get_file() {
        let mut fs = LibraryFs::new("platform");
        fs.add_file_string("policy_definitions/deny.alz_policy_definition.json", "{}");

        assert_eq!(fs.name(), "platform");
        assert!(fs.exists("policy_definitions/deny.alz_policy_definition.json"));
        assert!(fs.exists("./policy_definitions/deny.alz_policy_definition.json"));
        assert_eq!(fs.get_file("policy_definitions/deny.alz_policy_definition.json").unwrap().size(), 2);
        assert!(fs.get_file("missing.json").is_none());
    }

    #[test]
    fn test_list_files_sorted() {
        let fs = LibraryFs::new("lib")
            .with_file("b.json", "{}")
            .with_file("a/z.json", "{}")
            .with_file("a/a.json", "{}");

        assert_eq!(
            fs.list_files(),
            vec![Path::new("a/a.json"), Path::new("a/z.json"), Path::new("b.json")]
        );
        assert_eq!(fs.len(), 3);
    }

    #[test]
    fn test_as_str_rejects_invalid_utf8() {
        let file = File::new(vec![0xff, 0xfe]);
        let result = file.as_str(Path::new("bad.json"));
        assert!(matches!(result, Err(Error::Processor { path, .. }) if path == "bad.json"));
    }
}
