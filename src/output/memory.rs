use anyhow::Result;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::output::OutputTracker;

/// Collects all output in a shared in-memory buffer.
///
/// Cloning shares the buffer, so a test can keep one handle and give the other
/// to a scheduler.
#[derive(Clone, Debug, Default)]
pub struct MemoryOutputTracker {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryOutputTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of everything written so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    #[must_use]
    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }
}

struct BufferWriter<'a> {
    tracker: &'a MemoryOutputTracker,
}

impl Write for BufferWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tracker.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl OutputTracker for MemoryOutputTracker {
    type Staged = Vec<u8>;

    fn direct(&self) -> Result<Box<dyn Write + '_>> {
        Ok(Box::new(BufferWriter { tracker: self }))
    }

    fn stage(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn merge(&self, staged: Vec<u8>) -> Result<()> {
        self.lock().extend_from_slice(&staged);
        Ok(())
    }
}
