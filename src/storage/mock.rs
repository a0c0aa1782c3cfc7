/*
 *  storage/mock.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  In-memory card for testing without hardware
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

use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use super::{CardDriver, DirEntry, FilesystemVolume, MountMode, RawVolume, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountEvent {
    Mounted(MountMode),
    Unmounted(MountMode),
}

#[derive(Debug, Clone)]
pub struct MockFile {
    pub name: String,
    pub data: Vec<u8>,
    pub is_dir: bool,
}

/// Shared state, inspectable from tests while the card sits inside the bus
#[derive(Debug)]
pub struct MockCardState {
    /// Files in enumeration order
    pub files: Vec<MockFile>,
    /// Every mount/unmount in order
    pub events: Vec<MountEvent>,
    pub present: bool,
    /// Number of upcoming filesystem mounts that fail
    pub fail_filesystem_mounts: usize,
    pub fail_raw_mounts: usize,
    /// Currently mounted mode as the card sees it
    pub mounted: MountMode,
    /// Set if a mount was ever requested while another mode was live
    pub overlap_detected: bool,
}

impl Default for MockCardState {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            events: Vec::new(),
            present: true,
            fail_filesystem_mounts: 0,
            fail_raw_mounts: 0,
            mounted: MountMode::Unmounted,
            overlap_detected: false,
        }
    }
}

/// Mock card driver. Each file's content defaults to its own name so painters
/// can tell which entry they were handed.
#[derive(Debug, Clone, Default)]
pub struct MockCard {
    state: Arc<Mutex<MockCardState>>,
}

impl MockCard {
    pub fn with_files(names: &[&str]) -> Self {
        let card = Self::default();
        for name in names {
            card.add_file(name, name.as_bytes());
        }
        card
    }

    pub fn add_file(&self, name: &str, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.files.retain(|f| f.name != name);
        state.files.push(MockFile { name: name.to_string(), data: data.to_vec(), is_dir: false });
    }

    pub fn add_dir(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.files.push(MockFile { name: name.to_string(), data: Vec::new(), is_dir: true });
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.files.iter().find(|f| f.name == name && !f.is_dir).map(|f| f.data.clone())
    }

    pub fn state(&self) -> Arc<Mutex<MockCardState>> {
        Arc::clone(&self.state)
    }

    fn mount(&self, mode: MountMode) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        if !state.present {
            return Err(StorageError::Mount("no card".to_string()));
        }
        let failures = match mode {
            MountMode::Filesystem => &mut state.fail_filesystem_mounts,
            _ => &mut state.fail_raw_mounts,
        };
        if *failures > 0 {
            *failures -= 1;
            return Err(StorageError::Mount(format!("simulated {} failure", mode)));
        }
        if state.mounted != MountMode::Unmounted {
            state.overlap_detected = true;
        }
        state.mounted = mode;
        state.events.push(MountEvent::Mounted(mode));
        Ok(())
    }
}

impl CardDriver for MockCard {
    fn label(&self) -> &str {
        "mock-card"
    }

    fn mount_filesystem(&mut self) -> Result<Box<dyn FilesystemVolume>, StorageError> {
        self.mount(MountMode::Filesystem)?;
        Ok(Box::new(MockVolume { state: Arc::clone(&self.state) }))
    }

    fn mount_raw(&mut self) -> Result<Box<dyn RawVolume>, StorageError> {
        self.mount(MountMode::Raw)?;
        Ok(Box::new(MockVolume { state: Arc::clone(&self.state) }))
    }

    fn unmount(&mut self, mode: MountMode) {
        let mut state = self.state.lock().unwrap();
        state.mounted = MountMode::Unmounted;
        state.events.push(MountEvent::Unmounted(mode));
    }
}

struct MockVolume {
    state: Arc<Mutex<MockCardState>>,
}

impl MockVolume {
    fn read(&self, name: &str) -> Result<Box<dyn Read + Send>, StorageError> {
        let state = self.state.lock().unwrap();
        state
            .files
            .iter()
            .find(|f| f.name == name && !f.is_dir)
            .map(|f| Box::new(Cursor::new(f.data.clone())) as Box<dyn Read + Send>)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}

impl FilesystemVolume for MockVolume {
    fn list(&mut self) -> Result<Vec<DirEntry>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .map(|f| DirEntry { name: f.name.clone(), is_dir: f.is_dir })
            .collect())
    }

    fn open_read(&mut self, name: &str) -> Result<Box<dyn Read + Send>, StorageError> {
        self.read(name)
    }

    fn create_truncate(&mut self, name: &str) -> Result<Box<dyn Write + Send>, StorageError> {
        {
            let mut state = self.state.lock().unwrap();
            state.files.retain(|f| f.name != name);
            state.files.push(MockFile { name: name.to_string(), data: Vec::new(), is_dir: false });
        }
        Ok(Box::new(MockWriter { state: Arc::clone(&self.state), name: name.to_string() }))
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        let before = state.files.len();
        state.files.retain(|f| f.name != name);
        if state.files.len() == before {
            return Err(StorageError::NotFound(name.to_string()));
        }
        Ok(())
    }

    fn exists(&mut self, name: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.files.iter().any(|f| f.name == name && !f.is_dir)
    }
}

impl RawVolume for MockVolume {
    fn open_sequential(&mut self, name: &str) -> Result<Box<dyn Read + Send>, StorageError> {
        self.read(name)
    }
}

struct MockWriter {
    state: Arc<Mutex<MockCardState>>,
    name: String,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if let Some(file) = state.files.iter_mut().find(|f| f.name == self.name) {
            file.data.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
