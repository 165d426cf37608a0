//! Disk writer thread.
//!
//! `ThreadedWriter` is a [`FrameSink`] that forwards assembled blocks over a
//! bounded channel to a thread owning a [`GeomCacheWriter`]. The encoder keeps
//! compressing and writing off its own thread; a full channel blocks the
//! encoder until the disk catches up.

use std::io::{Seek, Write};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use log::{debug, warn};

use geomcache_core::status::{GeomCacheError, Status, StatusResult};

use crate::geom_cache_writer::GeomCacheWriter;
use crate::traits::{EncodedFrame, FrameSink, WriterStats};

/// Frames queued between the encoder and the disk writer thread.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

enum WriteCommand {
    StaticData(Vec<u8>),
    Frame(EncodedFrame),
    Finish,
}

pub struct ThreadedWriter {
    sender: Option<Sender<WriteCommand>>,
    handle: Option<JoinHandle<StatusResult<WriterStats>>>,
}

impl ThreadedWriter {
    pub fn spawn<W>(writer: GeomCacheWriter<W>) -> StatusResult<Self>
    where
        W: Write + Seek + Send + 'static,
    {
        Self::with_capacity(writer, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity<W>(writer: GeomCacheWriter<W>, capacity: usize) -> StatusResult<Self>
    where
        W: Write + Seek + Send + 'static,
    {
        let (sender, receiver) = bounded::<WriteCommand>(capacity.max(1));

        let handle = thread::Builder::new()
            .name("geomcache-writer".to_string())
            .spawn(move || {
                let mut writer = writer;
                for command in receiver {
                    match command {
                        WriteCommand::StaticData(payload) => writer.write_static_data(payload)?,
                        WriteCommand::Frame(frame) => writer.write_frame(frame)?,
                        WriteCommand::Finish => return writer.finish(),
                    }
                }
                // Closed without finish: keep what was written, signature stays zero
                writer.flush()?;
                Err(GeomCacheError::FrameSequence(
                    "write pipeline closed before finish".to_string(),
                ))
            })?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn send(&mut self, command: WriteCommand) -> Status {
        let sent = match &self.sender {
            Some(sender) => sender.send(command).is_ok(),
            None => false,
        };
        if sent {
            return Ok(());
        }
        // The thread stopped early; its result says why
        self.sender = None;
        match self.join()? {
            Ok(_) => Err(GeomCacheError::Internal(
                "disk writer thread finished early".to_string(),
            )),
            Err(err) => Err(err),
        }
    }

    fn join(&mut self) -> StatusResult<StatusResult<WriterStats>> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| GeomCacheError::Internal("write pipeline is closed".to_string()))?;
        handle
            .join()
            .map_err(|_| GeomCacheError::Internal("disk writer thread panicked".to_string()))
    }
}

impl FrameSink for ThreadedWriter {
    fn write_static_data(&mut self, payload: Vec<u8>) -> Status {
        self.send(WriteCommand::StaticData(payload))
    }

    fn write_frame(&mut self, frame: EncodedFrame) -> Status {
        debug!("Queueing frame {} ({} bytes)", frame.index, frame.payload.len());
        self.send(WriteCommand::Frame(frame))
    }

    fn finish(mut self) -> StatusResult<WriterStats> {
        self.send(WriteCommand::Finish)?;
        self.sender = None;
        self.join()?
    }
}

impl Drop for ThreadedWriter {
    fn drop(&mut self) {
        self.sender = None;
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Err(err)) => debug!("Disk writer stopped: {}", err),
                Err(_) => warn!("Disk writer thread panicked"),
                Ok(Ok(_)) => {}
            }
        }
    }
}
