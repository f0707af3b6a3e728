//! Virtual file system - read documents by location
//!
//! A location is either a local path (optionally `file://`) or an
//! `http(s)://` URL. "Not found" is reported separately from other read
//! failures so callers can fall back instead of failing.

use std::fs;
use std::io;
use std::path::Path;

/// Errors reading a location.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    /// Nothing exists at the location.
    #[error("file not found: {location}")]
    NotFound { location: String },

    /// The location exists (or may exist) but could not be read.
    #[error("error reading {location}: {source}")]
    Read {
        location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Remote locations are disabled.
    #[error("{location} is remote, and remote reads are disabled")]
    Offline { location: String },
}

impl VfsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Something that can read a document by location.
pub trait Vfs: Send + Sync {
    fn read_file(&self, location: &str) -> Result<String, VfsError>;
}

/// Local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileVfs;

impl Vfs for FileVfs {
    fn read_file(&self, location: &str) -> Result<String, VfsError> {
        let path = Path::new(location.strip_prefix("file://").unwrap_or(location));
        fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound {
                location: location.to_string(),
            },
            _ => VfsError::Read {
                location: location.to_string(),
                source: Box::new(e),
            },
        })
    }
}

/// HTTP(S) over a blocking agent.
pub struct HttpVfs {
    agent: ureq::Agent,
}

impl HttpVfs {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpVfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs for HttpVfs {
    fn read_file(&self, location: &str) -> Result<String, VfsError> {
        log::debug!("GET {location}");
        let read_error = |source: ureq::Error| VfsError::Read {
            location: location.to_string(),
            source: Box::new(source),
        };

        match self
            .agent
            .get(location)
            .header("User-Agent", "upup")
            .call()
        {
            Ok(mut response) => response.body_mut().read_to_string().map_err(read_error),
            Err(ureq::Error::StatusCode(404)) => Err(VfsError::NotFound {
                location: location.to_string(),
            }),
            Err(e) => Err(read_error(e)),
        }
    }
}

/// Routes each location to the right implementation by scheme.
pub struct VfsContext {
    file: FileVfs,
    http: Option<HttpVfs>,
}

impl VfsContext {
    /// Local files and HTTP(S)
    pub fn new() -> Self {
        Self {
            file: FileVfs,
            http: Some(HttpVfs::new()),
        }
    }

    /// Local files only; remote locations fail with [`VfsError::Offline`]
    pub fn offline() -> Self {
        Self {
            file: FileVfs,
            http: None,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.http.is_none()
    }
}

impl Default for VfsContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs for VfsContext {
    fn read_file(&self, location: &str) -> Result<String, VfsError> {
        if !is_remote(location) {
            return self.file.read_file(location);
        }
        match &self.http {
            Some(http) => http.read_file(location),
            None => Err(VfsError::Offline {
                location: location.to_string(),
            }),
        }
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}
