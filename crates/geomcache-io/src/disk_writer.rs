use std::io::{Seek, SeekFrom, Write};

use geomcache_core::status::{Status, StatusResult};

/// Sole owner of the output handle.
///
/// Sequential writes append at the end of the file. A positioned write
/// patches earlier bytes and leaves the cursor at the end again, so the
/// offsets handed out by sequential writes only ever grow.
pub struct DiskWriter<W: Write + Seek> {
    inner: W,
    end: u64,
}

impl<W: Write + Seek> DiskWriter<W> {
    pub fn new(mut inner: W) -> StatusResult<Self> {
        let end = inner.seek(SeekFrom::End(0))?;
        Ok(Self { inner, end })
    }

    /// Writes `data` at `at`, or appends when `at` is `None`. Returns the
    /// absolute offset of the first byte written.
    pub fn write(&mut self, data: &[u8], at: Option<SeekFrom>) -> StatusResult<u64> {
        match at {
            None => {
                let offset = self.end;
                self.inner.write_all(data)?;
                self.end += data.len() as u64;
                Ok(offset)
            }
            Some(position) => {
                let offset = self.inner.seek(position)?;
                self.inner.write_all(data)?;
                self.end = self.end.max(offset + data.len() as u64);
                self.inner.seek(SeekFrom::Start(self.end))?;
                Ok(offset)
            }
        }
    }

    /// Offset the next sequential write lands at.
    pub fn position(&self) -> u64 {
        self.end
    }

    pub fn flush(&mut self) -> Status {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
