/*
 *  storage/mod.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Storage card adapter with exclusive filesystem / raw mount modes
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fmt;
use std::io::{Read, Write};

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

pub mod dircard;

#[cfg(test)]
pub mod mock;

pub use dircard::DirCard;

/// Which driver configuration currently owns the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    Unmounted,
    Filesystem,
    Raw,
}

impl fmt::Display for MountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountMode::Unmounted => write!(f, "unmounted"),
            MountMode::Filesystem => write!(f, "filesystem mode"),
            MountMode::Raw => write!(f, "raw mode"),
        }
    }
}

/// Card level failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("card mount failed: {0}")]
    Mount(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
    #[error("card I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation needs {expected} but the card is in {found}")]
    WrongMode { expected: MountMode, found: MountMode },
}

/// One directory entry as the filesystem driver enumerates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Hierarchical filesystem view of a mounted card.
pub trait FilesystemVolume: Send {
    /// Root directory entries in driver enumeration order
    fn list(&mut self) -> Result<Vec<DirEntry>, StorageError>;

    fn open_read(&mut self, name: &str) -> Result<Box<dyn Read + Send>, StorageError>;

    /// Create `name`, truncating any existing file
    fn create_truncate(&mut self, name: &str) -> Result<Box<dyn Write + Send>, StorageError>;

    fn remove(&mut self, name: &str) -> Result<(), StorageError>;

    fn exists(&mut self, name: &str) -> bool;
}

/// Raw sequential-read view of a mounted card.
pub trait RawVolume: Send {
    fn open_sequential(&mut self, name: &str) -> Result<Box<dyn Read + Send>, StorageError>;
}

/// The physical card. Hands out at most one mounted volume at a time; the
/// adapter enforces that.
pub trait CardDriver: Send {
    /// Short label for logs
    fn label(&self) -> &str;

    fn mount_filesystem(&mut self) -> Result<Box<dyn FilesystemVolume>, StorageError>;

    fn mount_raw(&mut self) -> Result<Box<dyn RawVolume>, StorageError>;

    /// Called after the volume for `mode` has been dropped
    fn unmount(&mut self, mode: MountMode);
}

/// The mounted state owns the volume, so a filesystem handle and a raw handle
/// can never exist together.
enum Mount {
    Unmounted,
    Filesystem(Box<dyn FilesystemVolume>),
    Raw(Box<dyn RawVolume>),
}

impl Mount {
    fn mode(&self) -> MountMode {
        match self {
            Mount::Unmounted => MountMode::Unmounted,
            Mount::Filesystem(_) => MountMode::Filesystem,
            Mount::Raw(_) => MountMode::Raw,
        }
    }
}

/// Storage driver adapter. Lives inside the bus, so every call below already
/// runs with the arbiter held.
pub struct StorageAdapter {
    card: Box<dyn CardDriver>,
    mount: Mount,
    mode_tx: watch::Sender<MountMode>,
}

impl StorageAdapter {
    pub fn new(card: Box<dyn CardDriver>) -> Self {
        let (mode_tx, _) = watch::channel(MountMode::Unmounted);
        Self { card, mount: Mount::Unmounted, mode_tx }
    }

    pub fn mode(&self) -> MountMode {
        self.mount.mode()
    }

    /// Lock-free view of the mount mode for status readers
    pub fn subscribe_mode(&self) -> watch::Receiver<MountMode> {
        self.mode_tx.subscribe()
    }

    fn publish(&self) {
        self.mode_tx.send_replace(self.mount.mode());
    }

    /// Mount the filesystem driver. Already mounted is fine; raw mode must be
    /// unmounted first.
    pub fn mount_filesystem(&mut self) -> Result<(), StorageError> {
        match self.mount {
            Mount::Filesystem(_) => return Ok(()),
            Mount::Raw(_) => {
                return Err(StorageError::Mount(
                    "card is mounted in raw mode, unmount first".to_string(),
                ))
            }
            Mount::Unmounted => {}
        }
        let volume = self.card.mount_filesystem()?;
        self.mount = Mount::Filesystem(volume);
        self.publish();
        info!("{}: mounted in filesystem mode", self.card.label());
        Ok(())
    }

    pub fn mount_raw(&mut self) -> Result<(), StorageError> {
        match self.mount {
            Mount::Raw(_) => return Ok(()),
            Mount::Filesystem(_) => {
                return Err(StorageError::Mount(
                    "card is mounted in filesystem mode, unmount first".to_string(),
                ))
            }
            Mount::Unmounted => {}
        }
        let volume = self.card.mount_raw()?;
        self.mount = Mount::Raw(volume);
        self.publish();
        info!("{}: mounted in raw mode", self.card.label());
        Ok(())
    }

    pub fn unmount(&mut self) {
        let previous = std::mem::replace(&mut self.mount, Mount::Unmounted);
        let mode = previous.mode();
        drop(previous);
        if mode != MountMode::Unmounted {
            self.card.unmount(mode);
            self.publish();
            info!("{}: unmounted {}", self.card.label(), mode);
        }
    }

    /// Unmount whatever is mounted, then mount `target`. Callers run this as
    /// one batch under a single arbiter hold.
    pub fn switch_to(&mut self, target: MountMode) -> Result<(), StorageError> {
        if self.mode() == target {
            return Ok(());
        }
        debug!("{}: switching {} -> {}", self.card.label(), self.mode(), target);
        self.unmount();
        match target {
            MountMode::Filesystem => self.mount_filesystem(),
            MountMode::Raw => self.mount_raw(),
            MountMode::Unmounted => Ok(()),
        }
    }

    fn filesystem(&mut self) -> Result<&mut Box<dyn FilesystemVolume>, StorageError> {
        let found = self.mount.mode();
        match &mut self.mount {
            Mount::Filesystem(volume) => Ok(volume),
            _ => Err(StorageError::WrongMode { expected: MountMode::Filesystem, found }),
        }
    }

    /// Enumerate regular files accepted by `predicate`, in driver order.
    pub fn list_entries<P>(&mut self, predicate: P) -> Result<Vec<String>, StorageError>
    where
        P: Fn(&str) -> bool,
    {
        let entries = self.filesystem()?.list()?;
        Ok(entries
            .into_iter()
            .filter(|e| !e.is_dir && predicate(&e.name))
            .map(|e| e.name)
            .collect())
    }

    pub fn open_for_read(&mut self, name: &str) -> Result<Box<dyn Read + Send>, StorageError> {
        self.filesystem()?.open_read(name)
    }

    pub fn open_for_write_truncate(&mut self, name: &str) -> Result<Box<dyn Write + Send>, StorageError> {
        self.filesystem()?.create_truncate(name)
    }

    pub fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        let volume = self.filesystem()?;
        if !volume.exists(name) {
            return Err(StorageError::NotFound(name.to_string()));
        }
        volume.remove(name)
    }

    pub fn exists(&mut self, name: &str) -> Result<bool, StorageError> {
        Ok(self.filesystem()?.exists(name))
    }

    /// Raw mode only
    pub fn open_sequential(&mut self, name: &str) -> Result<Box<dyn Read + Send>, StorageError> {
        let found = self.mount.mode();
        match &mut self.mount {
            Mount::Raw(volume) => volume.open_sequential(name),
            _ => Err(StorageError::WrongMode { expected: MountMode::Raw, found }),
        }
    }
}

impl Drop for StorageAdapter {
    fn drop(&mut self) {
        if self.mode() != MountMode::Unmounted {
            warn!("{}: adapter dropped while mounted, unmounting", self.card.label());
            self.unmount();
        }
    }
}

/// Card file names are flat, root-level names. Anything that could walk out of
/// the card root is refused.
pub fn validate_name(name: &str) -> Result<&str, StorageError> {
    let trimmed = name.trim_start_matches('/');
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains('\0')
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}
