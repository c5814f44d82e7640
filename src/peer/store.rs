//! Client store: one `<name>.conf` per client in the WireGuard directory

use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::validate_name;
use crate::error::{Error, Result};

/// File extension of client configurations
pub const ARTIFACT_EXTENSION: &str = "conf";

/// Directory-backed client store
#[derive(Debug, Clone)]
pub struct ClientStore {
    dir: PathBuf,
    /// File stem that belongs to the server interface, never a client
    reserved: Option<String>,
}

impl ClientStore {
    /// Open the store, creating the directory if it does not exist
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| Error::store(dir.display().to_string(), e))?;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
            debug!("Created client directory {:?}", dir);
        }
        Ok(Self {
            dir,
            reserved: None,
        })
    }

    /// Hide the server's own `<interface>.conf` from the store
    pub fn with_reserved(mut self, interface: impl Into<String>) -> Self {
        self.reserved = Some(interface.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether `name` is the reserved server config stem
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.as_deref() == Some(name)
    }

    /// Path of the file for `name`
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, ARTIFACT_EXTENSION))
    }

    /// Client names in the store, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| Error::store(self.dir.display().to_string(), e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::store(self.dir.display().to_string(), e))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = self.client_name(file_name) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Whether a client file exists for `name`
    pub fn exists(&self, name: &str) -> bool {
        !self.is_reserved(name) && self.path_for(name).is_file()
    }

    /// Read the configuration for `name`
    pub fn read(&self, name: &str) -> Result<String> {
        if self.is_reserved(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        match fs::read_to_string(self.path_for(name)) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(name.to_string())),
            Err(e) => Err(Error::store(name, e)),
        }
    }

    /// Atomically create the file for `name` with owner-only permissions.
    /// Fails with `AlreadyExists` rather than replacing an existing client.
    pub fn write(&self, name: &str, contents: &str) -> Result<()> {
        if self.is_reserved(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(".wolfgate-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| Error::store(name, e))?;

        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::store(name, e))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| Error::store(name, e))?;
        tmp.as_file().sync_all().map_err(|e| Error::store(name, e))?;

        tmp.persist_noclobber(self.path_for(name)).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                Error::AlreadyExists(name.to_string())
            } else {
                Error::store(name, e.error)
            }
        })?;

        debug!("Wrote client config {:?}", self.path_for(name));
        Ok(())
    }

    /// Remove the file for `name`
    pub fn delete(&self, name: &str) -> Result<()> {
        if self.is_reserved(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(name.to_string())),
            Err(e) => Err(Error::store(name, e)),
        }
    }

    /// All clients with their configuration text. Unreadable files are skipped.
    pub fn scan(&self) -> Result<Vec<(String, String)>> {
        let mut clients = Vec::new();
        for name in self.list()? {
            match self.read(&name) {
                Ok(text) => clients.push((name, text)),
                Err(e) => tracing::warn!("Skipping unreadable client config {}: {}", name, e),
            }
        }
        Ok(clients)
    }

    fn client_name<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let stem = file_name.strip_suffix(ARTIFACT_EXTENSION)?.strip_suffix('.')?;
        // Only names that read and delete accept
        if validate_name(stem).is_err() || self.is_reserved(stem) {
            return None;
        }
        Some(stem)
    }
}
