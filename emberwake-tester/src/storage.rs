//! Save slots kept as JSON files, one per slot.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use emberwake_game::SaveStorage;

#[derive(Debug, Clone)]
pub struct FileSlotStorage {
    root: PathBuf,
}

impl FileSlotStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn slot_path(&self, slot: u8) -> PathBuf {
        self.root.join(format!("slot-{slot}.json"))
    }
}

impl SaveStorage for FileSlotStorage {
    type Error = io::Error;

    fn read_slot(&self, slot: u8) -> Result<Option<String>, Self::Error> {
        match fs::read_to_string(self.slot_path(slot)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write_slot(&self, slot: u8, data: &str) -> Result<(), Self::Error> {
        fs::create_dir_all(&self.root)?;
        // Staged beside the slot, then renamed over it.
        let staging = self.root.join(format!("slot-{slot}.json.tmp"));
        fs::write(&staging, data)?;
        fs::rename(&staging, self.slot_path(slot))
    }

    fn delete_slot(&self, slot: u8) -> Result<(), Self::Error> {
        match fs::remove_file(self.slot_path(slot)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}
