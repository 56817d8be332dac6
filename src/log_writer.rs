//! Background file writer for the log layer
//!
//! Formatted lines go through a bounded channel to one consumer thread that
//! owns the file. Producers never wait for disk: when the queue is full an
//! entry below ERROR is dropped and counted, an ERROR entry waits for room.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

pub const LOG_FILE: &str = "strata.log";

enum Message {
    Line(Vec<u8>),
    Shutdown { dropped: u64 },
}

/// [`MakeWriter`] handed to the file layer.
#[derive(Clone)]
pub struct BackgroundWriter {
    sender: Sender<Message>,
    dropped: Arc<AtomicU64>,
}

/// Flushes and stops the consumer thread when dropped.
pub struct WriterGuard {
    sender: Sender<Message>,
    dropped: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl WriterGuard {
    /// Entries discarded so far because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        let dropped = self.dropped();
        if self.sender.send(Message::Shutdown { dropped }).is_err() {
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                eprintln!("strata: log writer thread panicked");
            }
        }
    }
}

/// Open (append) `path` and start the consumer thread.
pub fn spawn(path: impl AsRef<Path>, capacity: usize) -> io::Result<(BackgroundWriter, WriterGuard)> {
    let file = OpenOptions::new().create(true).append(true).open(path.as_ref())?;
    let (sender, receiver) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));

    let handle = std::thread::Builder::new()
        .name("strata-log".to_string())
        .spawn(move || consume(receiver, BufWriter::new(file)))?;

    let writer = BackgroundWriter {
        sender: sender.clone(),
        dropped: Arc::clone(&dropped),
    };
    let guard = WriterGuard {
        sender,
        dropped,
        handle: Some(handle),
    };
    Ok((writer, guard))
}

fn consume(receiver: Receiver<Message>, mut out: BufWriter<File>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Line(line) => {
                if let Err(e) = out.write_all(&line) {
                    eprintln!("strata: failed to write log file: {e}");
                }
                if receiver.is_empty() {
                    let _ = out.flush();
                }
            }
            Message::Shutdown { dropped } => {
                if dropped > 0 {
                    let _ = writeln!(out, "{dropped} log entries dropped while the queue was full");
                }
                break;
            }
        }
    }
    let _ = out.flush();
}

/// Buffers one formatted event and queues it on drop.
pub struct LineWriter {
    buffer: Vec<u8>,
    sender: Sender<Message>,
    dropped: Arc<AtomicU64>,
    blocking: bool,
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let line = Message::Line(std::mem::take(&mut self.buffer));
        if self.blocking {
            // fails only after shutdown
            let _ = self.sender.send(line);
            return;
        }
        match self.sender.try_send(line) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl BackgroundWriter {
    fn writer(&self, blocking: bool) -> LineWriter {
        LineWriter {
            buffer: Vec::with_capacity(256),
            sender: self.sender.clone(),
            dropped: Arc::clone(&self.dropped),
            blocking,
        }
    }
}

impl<'a> MakeWriter<'a> for BackgroundWriter {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer(false)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.writer(*meta.level() == Level::ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_line(writer: &BackgroundWriter, blocking: bool, text: &str) {
        let mut line = writer.writer(blocking);
        writeln!(line, "{text}").unwrap();
    }

    #[test]
    fn test_lines_reach_file_after_guard_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOG_FILE);
        let (writer, guard) = spawn(&path, 16).unwrap();

        write_line(&writer, false, "first");
        write_line(&writer, true, "second");
        drop(guard);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_saturated_queue_drops_and_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOG_FILE);
        let (writer, guard) = spawn(&path, 1).unwrap();

        for i in 0..500 {
            write_line(&writer, false, &format!("info {i}"));
        }
        write_line(&writer, true, "error kept");
        let dropped = guard.dropped();
        drop(guard);

        let content = std::fs::read_to_string(&path).unwrap();
        let info_lines = content.lines().filter(|l| l.starts_with("info ")).count() as u64;
        assert_eq!(info_lines + dropped, 500);
        assert!(content.contains("error kept"));
        if dropped > 0 {
            assert!(content.contains(&format!("{dropped} log entries dropped")));
        }
    }

    #[test]
    fn test_empty_writer_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOG_FILE);
        let (writer, guard) = spawn(&path, 4).unwrap();
        drop(writer.writer(false));
        drop(guard);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
