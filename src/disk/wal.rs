//! Write-ahead log: full page images appended as checksummed frames, followed by a commit frame.
//!
//! Layout of `<db>.wal`: a header (magic, version, page size) and a sequence of frames,
//! each frame being a header (page id, frame number, checksum, flags) and one page image.
//! Frames are only applied on recovery if a commit frame follows them. A torn or damaged
//! tail is treated as never written.

use crate::api::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;
use log::{debug, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8] = b"ORDKVWAL";
const VERSION: u16 = 1;
pub(crate) const HEAD: usize = 32;
const FRAME: usize = 16;

const FLAG_COMMIT: u32 = 0x1;

pub(crate) struct Wal {
    file: fs::File,
    page_bytes: u32,
    next_frame: u32,
    sync: bool,
}

impl Wal {
    /// Open the log next to the given database file. An existing log keeps the page size
    /// recorded in its header (recovery needs it), otherwise a fresh header is written.
    pub(crate) fn open(db_path: &Path, page_bytes: u32, sync: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(wal_path(db_path))?;

        let mut wal = Self {
            file,
            page_bytes,
            next_frame: 1,
            sync,
        };

        if wal.file.metadata()?.len() < HEAD as u64 {
            wal.reset()?;
        } else {
            wal.page_bytes = wal.read_head()?;
        }
        Ok(wal)
    }

    pub(crate) fn page_bytes(&self) -> u32 {
        self.page_bytes
    }

    pub(crate) fn append(&mut self, page_id: u32, page: &[u8]) -> Result<()> {
        self.append_frame(page_id, 0, page)
    }

    pub(crate) fn commit(&mut self) -> Result<()> {
        let zeros = vec![0u8; self.page_bytes as usize];
        self.append_frame(0, FLAG_COMMIT, &zeros)?;
        self.sync()
    }

    fn append_frame(&mut self, page_id: u32, flags: u32, page: &[u8]) -> Result<()> {
        if page.len() != self.page_bytes as usize {
            return Err(Error::Other(format!(
                "WAL frame size {} does not match page size {}",
                page.len(),
                self.page_bytes
            )));
        }

        let checksum = checksum(page_id, self.next_frame, flags, page);
        let mut buf = BytesMut::with_capacity(FRAME + page.len());
        buf.put_u32(page_id);
        buf.put_u32(self.next_frame);
        buf.put_u32(checksum);
        buf.put_u32(flags);
        buf.put_slice(page);

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(buf.as_ref())?;
        self.next_frame += 1;
        Ok(())
    }

    pub(crate) fn sync(&mut self) -> Result<()> {
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Truncate the log to an empty one (header only).
    pub(crate) fn reset(&mut self) -> Result<()> {
        let mut buf = BytesMut::with_capacity(HEAD);
        buf.put_slice(MAGIC);
        buf.put_u16(VERSION);
        buf.put_u16(0);
        buf.put_u32(self.page_bytes);
        buf.put_bytes(0, HEAD - buf.len());

        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(buf.as_ref())?;
        self.next_frame = 1;
        self.sync()
    }

    /// Re-initialize an empty log with a different page size.
    pub(crate) fn resize(&mut self, page_bytes: u32) -> Result<()> {
        self.page_bytes = page_bytes;
        self.reset()
    }

    pub(crate) fn is_empty(&self) -> Result<bool> {
        Ok(self.file.metadata()?.len() <= HEAD as u64)
    }

    /// Pass every committed frame to `apply` in log order. Returns number of frames applied.
    pub(crate) fn replay<F>(&mut self, mut apply: F) -> Result<u32>
    where
        F: FnMut(u32, &[u8]) -> Result<()>,
    {
        self.file.seek(SeekFrom::Start(HEAD as u64))?;
        let mut head = [0u8; FRAME];
        let mut page = vec![0u8; self.page_bytes as usize];
        let mut pending: Vec<(u32, Vec<u8>)> = Vec::new();
        let mut applied = 0u32;
        let mut expected = 1u32;

        loop {
            if !self.read_exact_or_eof(&mut head)? || !self.read_exact_or_eof(&mut page)? {
                break;
            }
            let mut buf = &head[..];
            let page_id = buf.get_u32();
            let frame = buf.get_u32();
            let crc = buf.get_u32();
            let flags = buf.get_u32();

            if frame != expected || crc != checksum(page_id, frame, flags, &page) {
                warn!("WAL frame {} is damaged, ignoring the tail of the log", expected);
                break;
            }
            expected += 1;

            if flags & FLAG_COMMIT != 0 {
                for (id, data) in pending.drain(..) {
                    apply(id, &data)?;
                    applied += 1;
                }
            } else {
                pending.push((page_id, page.clone()));
            }
        }

        if !pending.is_empty() {
            debug!("WAL: discarded {} uncommitted frames", pending.len());
        }
        Ok(applied)
    }

    fn read_head(&mut self) -> Result<u32> {
        let mut head = [0u8; HEAD];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut head)?;

        let mut buf = &head[..];
        let mut magic = [0u8; 8];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(Error::Corruption(0, format!("WAL magic mismatch: {:?}", magic)));
        }
        let version = buf.get_u16();
        if version != VERSION {
            return Err(Error::Corruption(0, format!("WAL version {} unsupported", version)));
        }
        buf.get_u16();
        Ok(buf.get_u32())
    }

    fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.file.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn checksum(page_id: u32, frame: u32, flags: u32, page: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&page_id.to_be_bytes());
    hasher.update(&frame.to_be_bytes());
    hasher.update(&flags.to_be_bytes());
    hasher.update(page);
    hasher.finalize()
}

pub(crate) fn wal_path(db_path: &Path) -> PathBuf {
    let mut path = db_path.as_os_str().to_owned();
    path.push(".wal");
    PathBuf::from(path)
}
