//! In-memory tail of recent log output.
//!
//! `LogBuffer` plugs into `tracing_subscriber::fmt` as a writer and keeps the
//! last `capacity` lines so a front end can replay history on demand.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug)]
struct Lines {
    lines: VecDeque<String>,
    capacity: usize,
    partial: String,
}

impl Lines {
    fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }
}

#[derive(Clone, Debug)]
pub struct LogBuffer {
    inner: Arc<Mutex<Lines>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Lines {
                lines: VecDeque::with_capacity(capacity),
                capacity,
                partial: String::new(),
            })),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffered lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().lines.iter().cloned().collect()
    }

    /// Buffered lines joined with newlines, ready to print.
    pub fn contents(&self) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        for line in &inner.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

pub struct LogBufferWriter {
    inner: Arc<Mutex<Lines>>,
}

impl io::Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        inner.partial.push_str(&String::from_utf8_lossy(buf));
        while let Some(pos) = inner.partial.find('\n') {
            let line: String = inner.partial.drain(..=pos).collect();
            inner.push(line.trim_end_matches(['\n', '\r']).to_owned());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            inner: Arc::clone(&self.inner),
        }
    }
}
