/*
 *  storage/dircard.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Card driver backed by the directory the card is mounted on
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

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::{validate_name, CardDriver, DirEntry, FilesystemVolume, MountMode, RawVolume, StorageError};

/// A card exposed by the OS as a directory (e.g. `/media/sdcard`).
///
/// Enumeration order is by file name so ordinals are stable across rescans
/// regardless of the host filesystem's hashing.
#[derive(Debug, Clone)]
pub struct DirCard {
    root: PathBuf,
    label: String,
}

impl DirCard {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        let label = format!("card@{}", root.display());
        Self { root, label }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_present(&self) -> Result<(), StorageError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::Mount(format!("{} is not a directory", self.root.display()))),
            Err(e) => Err(StorageError::Mount(format!("no card at {}: {}", self.root.display(), e))),
        }
    }
}

impl CardDriver for DirCard {
    fn label(&self) -> &str {
        &self.label
    }

    fn mount_filesystem(&mut self) -> Result<Box<dyn FilesystemVolume>, StorageError> {
        self.check_present()?;
        Ok(Box::new(DirVolume { root: self.root.clone() }))
    }

    fn mount_raw(&mut self) -> Result<Box<dyn RawVolume>, StorageError> {
        self.check_present()?;
        Ok(Box::new(DirRawVolume { root: self.root.clone() }))
    }

    fn unmount(&mut self, mode: MountMode) {
        debug!("{}: released {}", self.label, mode);
    }
}

fn resolve(root: &Path, name: &str) -> Result<PathBuf, StorageError> {
    Ok(root.join(validate_name(name)?))
}

fn not_found_or_io(name: &str, err: io::Error) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(name.to_string())
    } else {
        StorageError::Io(err)
    }
}

struct DirVolume {
    root: PathBuf,
}

impl FilesystemVolume for DirVolume {
    fn list(&mut self) -> Result<Vec<DirEntry>, StorageError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    // could never be opened or removed by name again
                    warn!("skipping non UTF-8 name {:?}", raw);
                    continue;
                }
            };
            let is_dir = entry.file_type()?.is_dir();
            entries.push(DirEntry { name, is_dir });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn open_read(&mut self, name: &str) -> Result<Box<dyn Read + Send>, StorageError> {
        let path = resolve(&self.root, name)?;
        let file = File::open(&path).map_err(|e| not_found_or_io(name, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn create_truncate(&mut self, name: &str) -> Result<Box<dyn Write + Send>, StorageError> {
        let path = resolve(&self.root, name)?;
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(&path)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        let path = resolve(&self.root, name)?;
        fs::remove_file(&path).map_err(|e| not_found_or_io(name, e))
    }

    fn exists(&mut self, name: &str) -> bool {
        resolve(&self.root, name).map(|p| p.is_file()).unwrap_or(false)
    }
}

struct DirRawVolume {
    root: PathBuf,
}

impl RawVolume for DirRawVolume {
    fn open_sequential(&mut self, name: &str) -> Result<Box<dyn Read + Send>, StorageError> {
        let path = resolve(&self.root, name)?;
        let file = File::open(&path).map_err(|e| not_found_or_io(name, e))?;
        Ok(Box::new(BufReader::with_capacity(4096, file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_root_is_mount_error() {
        let mut card = DirCard::new("/definitely/not/a/card");
        assert!(matches!(card.mount_filesystem(), Err(StorageError::Mount(_))));
        assert!(matches!(card.mount_raw(), Err(StorageError::Mount(_))));
    }

    #[test]
    fn test_list_is_sorted_and_marks_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.jpg"), b"b").unwrap();
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let mut card = DirCard::new(dir.path());
        let mut volume = card.mount_filesystem().unwrap();
        let entries = volume.list().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "sub"]);
        assert!(entries[2].is_dir);
    }

    #[test]
    fn test_list_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.jpg")), b"x").unwrap();

        let mut card = DirCard::new(dir.path());
        let mut volume = card.mount_filesystem().unwrap();
        let names: Vec<_> = volume.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a.jpg"]);
    }

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut card = DirCard::new(dir.path());
        let mut volume = card.mount_filesystem().unwrap();

        {
            let mut w = volume.create_truncate("/new.jpg").unwrap();
            w.write_all(b"hello").unwrap();
            w.flush().unwrap();
        }
        assert!(volume.exists("new.jpg"));

        let mut s = String::new();
        volume.open_read("new.jpg").unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "hello");

        volume.remove("new.jpg").unwrap();
        assert!(matches!(volume.open_read("new.jpg"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut card = DirCard::new(dir.path());
        let mut volume = card.mount_filesystem().unwrap();
        assert!(matches!(volume.create_truncate("../x.jpg"), Err(StorageError::InvalidName(_))));
        assert!(!volume.exists("../x.jpg"));
    }
}
