/// Cursor readers and primitive types shared by the format parsers
pub mod parser_utils;
/// Wrappers around file sources
pub mod wrappers;

use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::LoadError;

/// Source of whole asset files.
///
/// The returned buffer owns (or borrows for `'static`) the complete file
/// contents. Anything decoded from it borrows that buffer, so callers keep it
/// alive until the decoded meshes have been uploaded.
pub trait DataFileLoader {
    fn read_whole_file(&self, path: &str) -> Result<Cow<'static, [u8]>, LoadError>;
}

pub struct DataFileWithCallback<F> {
    callback: F,
}

impl<F> DataFileWithCallback<F>
where
    F: Fn(&str) -> Result<Cow<'static, [u8]>, LoadError>,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> DataFileLoader for DataFileWithCallback<F>
where
    F: Fn(&str) -> Result<Cow<'static, [u8]>, LoadError>,
{
    fn read_whole_file(&self, path: &str) -> Result<Cow<'static, [u8]>, LoadError> {
        (self.callback)(path)
    }
}

/// Reads files relative to a root directory on the local file system.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DataFileLoader for DirectoryLoader {
    fn read_whole_file(&self, path: &str) -> Result<Cow<'static, [u8]>, LoadError> {
        let full_path = self.root.join(path);
        match std::fs::read(&full_path) {
            Ok(data) => Ok(Cow::Owned(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(LoadError::FileNotFound(full_path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(feature = "vfs")]
impl DataFileLoader for vfs::VfsPath {
    fn read_whole_file(&self, path: &str) -> Result<Cow<'static, [u8]>, LoadError> {
        use std::io::Read;

        let file_path = self
            .join(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if !file_path.exists().unwrap_or(false) {
            return Err(LoadError::FileNotFound(file_path.as_str().to_owned()));
        }
        let mut data = Vec::new();
        file_path
            .open_file()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
            .read_to_end(&mut data)?;
        Ok(Cow::Owned(data))
    }
}
