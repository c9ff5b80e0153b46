use std::fs;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

use crate::app::placeholder::{substitute, Environment, ProcessEnv};

#[derive(Debug, Error)]
pub enum FsError {
    #[error("failed to open file {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to stat file {name}: {source}")]
    Stat {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read file {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{name} is not a directory")]
    NotADirectory { name: String },

    #[error("file is closed")]
    Closed,
}

impl FsError {
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            FsError::Open { source, .. }
            | FsError::Stat { source, .. }
            | FsError::Read { source, .. } => source.kind(),
            FsError::NotADirectory { .. } => io::ErrorKind::InvalidInput,
            FsError::Closed => io::ErrorKind::Other,
        }
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        io::Error::new(err.kind(), err)
    }
}

/// Metadata of an opened entry or a directory child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
}

impl FileInfo {
    pub fn from_metadata(name: impl Into<String>, metadata: &fs::Metadata) -> Self {
        Self {
            name: name.into(),
            size: metadata.len(),
            is_dir: metadata.is_dir(),
            modified: metadata.modified().ok(),
        }
    }
}

/// An open handle: readable, seekable, statable and, for directories, listable.
pub trait File: Read + Seek + Send {
    fn stat(&self) -> io::Result<FileInfo>;

    /// Lists a directory's children; fails for anything else.
    fn read_dir(&mut self) -> io::Result<Vec<FileInfo>>;

    /// Releases the handle. A second call is a no-op.
    fn close(&mut self) -> io::Result<()>;

    fn is_dir(&self) -> bool;
}

pub trait FileSystem: Send + Sync {
    fn open(&self, name: &str) -> io::Result<Box<dyn File>>;
}

/// Serves files below `root`. Request names are cleaned so they never
/// escape it.
#[derive(Debug, Clone)]
pub struct DirFileSystem {
    root: PathBuf,
}

impl DirFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let mut clean = PathBuf::new();
        for component in Path::new(name).components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::ParentDir => {
                    clean.pop();
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        self.root.join(clean)
    }
}

impl FileSystem for DirFileSystem {
    fn open(&self, name: &str) -> io::Result<Box<dyn File>> {
        let path = self.resolve(name);
        let file = fs::File::open(&path)?;
        let metadata = file.metadata()?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string());
        Ok(Box::new(OsFile {
            file: Some(file),
            info: FileInfo::from_metadata(display_name, &metadata),
            path,
        }))
    }
}

/// A real file or directory on disk.
pub struct OsFile {
    file: Option<fs::File>,
    info: FileInfo,
    path: PathBuf,
}

impl OsFile {
    fn handle(&mut self) -> io::Result<&mut fs::File> {
        self.file.as_mut().ok_or_else(|| FsError::Closed.into())
    }
}

impl Read for OsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handle()?.read(buf)
    }
}

impl Seek for OsFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.handle()?.seek(pos)
    }
}

impl File for OsFile {
    fn stat(&self) -> io::Result<FileInfo> {
        let file = self.file.as_ref().ok_or(FsError::Closed)?;
        let metadata = file.metadata()?;
        Ok(FileInfo::from_metadata(self.info.name.clone(), &metadata))
    }

    fn read_dir(&mut self) -> io::Result<Vec<FileInfo>> {
        self.handle()?;
        if !self.info.is_dir {
            return Err(FsError::NotADirectory {
                name: self.info.name.clone(),
            }
            .into());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(FileInfo::from_metadata(
                entry.file_name().to_string_lossy(),
                &metadata,
            ));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.take();
        Ok(())
    }

    fn is_dir(&self) -> bool {
        self.info.is_dir
    }
}

/// A regular file whose content was rewritten on open.
///
/// Owns the underlying handle until `close`; the rewritten buffer is dropped
/// at the same time.
pub struct EnvFile {
    inner: Option<Box<dyn File>>,
    content: Cursor<Vec<u8>>,
    info: FileInfo,
}

impl EnvFile {
    fn new(inner: Box<dyn File>, info: FileInfo, content: Vec<u8>) -> Self {
        let info = FileInfo {
            size: content.len() as u64,
            ..info
        };
        Self {
            inner: Some(inner),
            content: Cursor::new(content),
            info,
        }
    }

    fn ensure_open(&self) -> Result<(), FsError> {
        if self.inner.is_none() {
            return Err(FsError::Closed);
        }
        Ok(())
    }
}

impl Read for EnvFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        self.content.read(buf)
    }
}

impl Seek for EnvFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.ensure_open()?;
        self.content.seek(pos)
    }
}

impl File for EnvFile {
    /// Reports the rewritten length, not the on-disk one.
    fn stat(&self) -> io::Result<FileInfo> {
        self.ensure_open()?;
        Ok(self.info.clone())
    }

    fn read_dir(&mut self) -> io::Result<Vec<FileInfo>> {
        self.ensure_open()?;
        Err(FsError::NotADirectory {
            name: self.info.name.clone(),
        }
        .into())
    }

    fn close(&mut self) -> io::Result<()> {
        match self.inner.take() {
            Some(mut inner) => {
                self.content = Cursor::new(Vec::new());
                inner.close()
            }
            None => Ok(()),
        }
    }

    fn is_dir(&self) -> bool {
        false
    }
}

/// Serves a default file when the requested one does not exist.
///
/// An absolute default (`/index.html`) always names the same asset. A relative
/// one (`index.html`) is looked up in the request's directory and then in
/// each parent up to the root.
pub struct FallbackFileSystem<F> {
    fs: F,
    default_path: String,
}

impl<F: FileSystem> FallbackFileSystem<F> {
    pub fn new(fs: F, default_path: impl Into<String>) -> Self {
        Self {
            fs,
            default_path: default_path.into(),
        }
    }

    fn candidates(&self, name: &str) -> Vec<String> {
        if self.default_path.starts_with('/') {
            return vec![self.default_path.clone()];
        }

        let mut candidates = Vec::new();
        let mut dir = name.trim_end_matches('/');
        loop {
            dir = dir.rsplit_once('/').map_or("", |(parent, _)| parent);
            candidates.push(format!("{}/{}", dir, self.default_path));
            if dir.is_empty() {
                return candidates;
            }
        }
    }
}

impl<F: FileSystem> FileSystem for FallbackFileSystem<F> {
    fn open(&self, name: &str) -> io::Result<Box<dyn File>> {
        let err = match self.fs.open(name) {
            Ok(file) => return Ok(file),
            Err(err) if err.kind() == io::ErrorKind::NotFound => err,
            Err(err) => return Err(err),
        };

        for candidate in self.candidates(name) {
            match self.fs.open(&candidate) {
                Ok(file) if !file.is_dir() => {
                    log::debug!("Serving {} in place of {}", candidate, name);
                    return Ok(file);
                }
                Ok(mut dir) => {
                    dir.close()?;
                }
                Err(next) if next.kind() == io::ErrorKind::NotFound => {}
                Err(next) => return Err(next),
            }
        }
        Err(err)
    }
}

/// Decorates a `FileSystem` with placeholder substitution.
pub struct EnvFileSystem<F, E = ProcessEnv> {
    fs: F,
    env: E,
}

impl<F: FileSystem> EnvFileSystem<F> {
    pub fn new(fs: F) -> Self {
        Self::with_env(fs, ProcessEnv)
    }
}

impl<F: FileSystem, E: Environment> EnvFileSystem<F, E> {
    pub fn with_env(fs: F, env: E) -> Self {
        Self { fs, env }
    }

    /// Opens `name`, rewriting regular files. The underlying handle is
    /// closed on every failure path.
    pub fn try_open(&self, name: &str) -> Result<Box<dyn File>, FsError> {
        let mut file = self.fs.open(name).map_err(|source| FsError::Open {
            name: name.to_string(),
            source,
        })?;

        let info = match file.stat() {
            Ok(info) => info,
            Err(source) => {
                let _ = file.close();
                return Err(FsError::Stat {
                    name: name.to_string(),
                    source,
                });
            }
        };

        if info.is_dir || file.is_dir() {
            return Ok(file);
        }

        let mut data = Vec::with_capacity(info.size as usize);
        if let Err(source) = file.read_to_end(&mut data) {
            let _ = file.close();
            return Err(FsError::Read {
                name: name.to_string(),
                source,
            });
        }

        let content = substitute(&data, &self.env);
        log::debug!(
            "Rewrote {} ({} -> {} bytes)",
            name,
            data.len(),
            content.len()
        );
        Ok(Box::new(EnvFile::new(file, info, content)))
    }
}

impl<F: FileSystem, E: Environment + Send + Sync> FileSystem for EnvFileSystem<F, E> {
    fn open(&self, name: &str) -> io::Result<Box<dyn File>> {
        self.try_open(name).map_err(io::Error::from)
    }
}
