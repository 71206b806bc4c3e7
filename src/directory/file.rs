//! JSON file backed instance directory.

use std::io;
use std::sync::{Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};

use super::{
    DirectoryError, Entries, InstanceDirectory, ServiceInstance, entry_mut, insert_entry,
    remove_entry,
};

#[derive(Debug, Default, Deserialize, Serialize)]
struct Document {
    #[serde(default)]
    instances: Vec<ServiceInstance>,
}

/// Directory persisted as a JSON document.
///
/// The whole document is read and rewritten on every mutation. A missing
/// file reads as an empty directory and is created on the first write.
#[derive(Debug)]
pub struct FileDirectory {
    path: Utf8PathBuf,
    write_lock: Mutex<()>,
}

impl FileDirectory {
    /// Creates a directory stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Entries, DirectoryError> {
        let Some(contents) = read_document(&self.path)? else {
            return Ok(Entries::new());
        };
        if contents.trim().is_empty() {
            return Ok(Entries::new());
        }
        let document: Document =
            serde_json::from_str(&contents).map_err(|err| DirectoryError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        Ok(document
            .instances
            .into_iter()
            .map(|instance| (instance.name.clone(), instance))
            .collect())
    }

    fn save(&self, entries: Entries) -> Result<(), DirectoryError> {
        let document = Document {
            instances: entries.into_values().collect(),
        };
        let rendered =
            serde_json::to_string_pretty(&document).map_err(|err| DirectoryError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        write_document(&self.path, &rendered)
    }

    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Entries) -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        let outcome = change(&mut entries)?;
        self.save(entries)?;
        Ok(outcome)
    }
}

impl InstanceDirectory for FileDirectory {
    fn store(&self, instance: ServiceInstance) -> Result<(), DirectoryError> {
        self.mutate(|entries| insert_entry(entries, instance))
    }

    fn retrieve(&self, name: &str) -> Result<ServiceInstance, DirectoryError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        remove_entry(&mut entries, name)
    }

    fn record_address(&self, name: &str, address: &str) -> Result<(), DirectoryError> {
        self.mutate(|entries| {
            entry_mut(entries, name)?.address = Some(address.to_owned());
            Ok(())
        })
    }

    fn remove(&self, name: &str) -> Result<ServiceInstance, DirectoryError> {
        self.mutate(|entries| remove_entry(entries, name))
    }

    fn list(&self) -> Result<Vec<ServiceInstance>, DirectoryError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.into_values().collect())
    }
}

fn split_path(path: &Utf8Path) -> Result<(&Utf8Path, &str), DirectoryError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| DirectoryError::InvalidStructure {
            path: path.to_path_buf(),
            message: String::from("directory path is missing a filename"),
        })?;
    Ok((parent, file_name))
}

fn read_document(path: &Utf8Path) -> Result<Option<String>, DirectoryError> {
    let (parent, file_name) = split_path(path)?;
    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(DirectoryError::Io {
                path: parent.to_path_buf(),
                message: err.to_string(),
            });
        }
    };

    match dir.read_to_string(file_name) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(DirectoryError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn write_document(path: &Utf8Path, contents: &str) -> Result<(), DirectoryError> {
    let (parent, file_name) = split_path(path)?;
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| {
        DirectoryError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }
    })?;
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| DirectoryError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        })?;

    // Readers see either the old document or the new one, never a partial write.
    let staged = staging_name(file_name);
    dir.write(&staged, contents)
        .and_then(|()| dir.rename(&staged, &dir, file_name))
        .map_err(|err| {
            drop(dir.remove_file(&staged));
            DirectoryError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        })
}

fn staging_name(file_name: &str) -> String {
    format!(".{file_name}.{}.tmp", std::process::id())
}
