//! Library sources.
//!
//! A library source hands the orchestrator a read-only snapshot of a
//! library's files. Where the files come from (a directory, an unpacked
//! archive, a test fixture) is the source's business.

use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::filesystem::{File, LibraryFs};

/// Anything that can produce a library's files.
pub trait LibrarySource: Send + Sync {
    /// Label used in logs and in `Error::Library`.
    fn name(&self) -> String;

    /// Snapshot the library's files.
    fn load(&self) -> Result<LibraryFs>;
}

impl<T: LibrarySource + ?Sized> LibrarySource for Box<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn load(&self) -> Result<LibraryFs> {
        (**self).load()
    }
}

impl LibrarySource for LibraryFs {
    fn name(&self) -> String {
        LibraryFs::name(self).to_string()
    }

    fn load(&self) -> Result<LibraryFs> {
        Ok(self.clone())
    }
}

/// A library in a directory on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalLibrary {
    root: PathBuf,
}

impl LocalLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl LibrarySource for LocalLibrary {
    fn name(&self) -> String {
        self.root.display().to_string()
    }

    fn load(&self) -> Result<LibraryFs> {
        if !self.root.is_dir() {
            return Err(Error::Configuration {
                message: format!("library directory {} does not exist", self.root.display()),
            });
        }

        let mut fs = LibraryFs::new(self.name());
        for entry in walkdir::WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git")
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).map_err(|_| Error::Configuration {
                message: format!("{} is outside library {}", entry.path().display(), self.root.display()),
            })?;
            fs.add_file(relative, File::new(std::fs::read(entry.path())?));
        }

        debug!("Loaded {} files from library {}", fs.len(), self.root.display());
        Ok(fs)
    }
}
