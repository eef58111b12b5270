use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use heating_common::{store::check_bounds, Eeprom, StorageError};
use tracing::info;

#[derive(Debug)]
pub struct FileEeprom {
    file: File,
    path: PathBuf,
    len: usize,
}

impl FileEeprom {
    pub fn open(path: impl AsRef<Path>, len: usize) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open eeprom image {}", path.display()))?;

        let existing = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);
        if existing < len {
            file.set_len(len as u64)
                .with_context(|| format!("failed to size eeprom image {}", path.display()))?;
            file.sync_all()?;
            info!(
                "eeprom image {} extended from {existing} to {len} bytes",
                path.display()
            );
        }

        Ok(Self {
            file,
            path,
            len: existing.max(len),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Eeprom for FileEeprom {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(offset, buf.len(), self.len)?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset as u64)).map_err(io_error)?;
        file.read_exact(buf).map_err(io_error)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(offset, data.len(), self.len)?;
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(io_error)?;
        self.file.write_all(data).map_err(io_error)?;
        self.file.sync_data().map_err(io_error)
    }
}

fn io_error(err: std::io::Error) -> StorageError {
    StorageError::Io(err.to_string())
}
