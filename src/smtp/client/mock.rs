//! Scripted stream double for connection tests

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{Arc, Mutex},
};

/// A stream that replays queued server payloads, one per read call, and
/// records everything the client writes.
///
/// Handles are cheap clones sharing the same state, so a test can keep one
/// for inspection while the connection owns another.
#[derive(Clone, Debug, Default)]
pub(crate) struct MockStream {
    replies: Arc<Mutex<VecDeque<Vec<u8>>>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    pub(crate) fn new<I, P>(script: I) -> MockStream
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        MockStream {
            replies: Arc::new(Mutex::new(script.into_iter().map(Into::into).collect())),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of everything written so far
    pub(crate) fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut replies = self.replies.lock().unwrap();
        match replies.pop_front() {
            None => Ok(0),
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    replies.push_front(chunk[n..].to_vec());
                }
                Ok(n)
            }
        }
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
