//! Default [`ArchiveHook`] implementation (spec §6 "Archive hook"): two
//! paired files, a data file the record bytes are appended to and a
//! fixed-width offset/length index file, the shape spec §6 describes
//! without mandating. The core never reads this format back; it exists
//! so the hook is usable out of the box rather than only as a trait a
//! caller must implement themselves.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use log::{error, trace};

use crate::datastore::ArchiveHook;
use crate::error::Result;

struct State {
    data: BufWriter<File>,
    index: BufWriter<File>,
    offset: u64,
}

/// Appends every archived record to `<path>.data`, and its
/// `(offset, length)` as two little-endian `u64`s to `<path>.index`.
pub struct FileArchiver {
    state: Mutex<State>,
}

impl FileArchiver {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileArchiver> {
        let path = path.as_ref();
        let data = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.with_extension("data"))?;
        let index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.with_extension("index"))?;
        let offset = data.metadata()?.len();
        Ok(FileArchiver {
            state: Mutex::new(State {
                data: BufWriter::new(data),
                index: BufWriter::new(index),
                offset,
            }),
        })
    }
}

impl ArchiveHook for FileArchiver {
    fn write(&self, bytes: &[u8]) -> bool {
        let mut state = self.state.lock().unwrap();
        let offset = state.offset;
        let len = bytes.len() as u64;
        let write_result = (|| -> std::io::Result<()> {
            state.data.write_all(bytes)?;
            state.index.write_all(&offset.to_le_bytes())?;
            state.index.write_all(&len.to_le_bytes())?;
            state.data.flush()?;
            state.index.flush()?;
            Ok(())
        })();
        match write_result {
            Ok(()) => {
                state.offset += len;
                trace!("archived {} bytes at offset {}", len, offset);
                true
            }
            Err(err) => {
                error!("archive write failed: {}", err);
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "archive_test.rs"]
mod archive_test;
