//! Bounded log ring buffer plus the `log::Log` adapter that sits in front
//! of it.
//!
//! Pushing drops the oldest entry on overflow rather than blocking or
//! growing; draining happens outside interrupt/critical-section context via
//! [`service`]. Mirrors `original_source/logger.c`'s `LogBuffer`.

use core::fmt::Write as _;

use log::{Level, Log, Metadata, Record};

use crate::kernel::critical;
use crate::kernel::serial::SERIAL_PORT;

const CAPACITY: usize = 64;
const MODULE_LEN: usize = 24;
const MESSAGE_LEN: usize = 96;

#[derive(Clone, Copy)]
struct LogEntry {
    level: Level,
    module: [u8; MODULE_LEN],
    module_len: u8,
    message: [u8; MESSAGE_LEN],
    message_len: u8,
}

impl LogEntry {
    const fn blank() -> Self {
        LogEntry {
            level: Level::Info,
            module: [0; MODULE_LEN],
            module_len: 0,
            message: [0; MESSAGE_LEN],
            message_len: 0,
        }
    }
}

struct RingBuffer {
    entries: [LogEntry; CAPACITY],
    head: usize,
    tail: usize,
    count: usize,
}

impl RingBuffer {
    const fn new() -> Self {
        RingBuffer {
            entries: [LogEntry::blank(); CAPACITY],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    fn push(&mut self, entry: LogEntry) {
        if self.count >= CAPACITY {
            self.head = (self.head + 1) % CAPACITY;
            self.count -= 1;
        }
        self.entries[self.tail] = entry;
        self.tail = (self.tail + 1) % CAPACITY;
        self.count += 1;
    }

    fn pop(&mut self) -> Option<LogEntry> {
        if self.count == 0 {
            return None;
        }
        let entry = self.entries[self.head];
        self.head = (self.head + 1) % CAPACITY;
        self.count -= 1;
        Some(entry)
    }
}

static BUFFER: spin::Mutex<RingBuffer> = spin::Mutex::new(RingBuffer::new());

struct BoundedWriter<'a> {
    buf: &'a mut [u8],
    written: usize,
}

impl core::fmt::Write for BoundedWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for &b in s.as_bytes() {
            if self.written >= self.buf.len() {
                break;
            }
            self.buf[self.written] = b;
            self.written += 1;
        }
        Ok(())
    }
}

fn push_record(level: Level, module: &str, args: core::fmt::Arguments) {
    let mut entry = LogEntry::blank();
    entry.level = level;

    let mod_bytes = module.as_bytes();
    let mod_len = mod_bytes.len().min(MODULE_LEN);
    entry.module[..mod_len].copy_from_slice(&mod_bytes[..mod_len]);
    entry.module_len = mod_len as u8;

    let mut writer = BoundedWriter { buf: &mut entry.message, written: 0 };
    let _ = writer.write_fmt(args);
    entry.message_len = writer.written as u8;

    critical::with(|| BUFFER.lock().push(entry));
}

/// `log::Log` implementation backed by the ring buffer above.
pub struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        push_record(record.level(), record.target(), *record.args());
    }

    fn flush(&self) {
        service();
    }
}

static LOGGER: KernelLogger = KernelLogger;

/// Installs the logger as the global `log` facade sink. Call once at boot.
pub fn init() {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Trace))
        .ok();
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => "INFO",
        Level::Warn => "WARN",
        Level::Error => "ERROR",
    }
}

/// Drains every pending entry to the serial sink. Must run outside
/// interrupt context; does not itself take the critical section beyond the
/// brief pop of each entry.
pub fn service() {
    loop {
        let popped = critical::with(|| BUFFER.lock().pop());
        let Some(entry) = popped else { break };

        let module = core::str::from_utf8(&entry.module[..entry.module_len as usize]).unwrap_or("?");
        let message = core::str::from_utf8(&entry.message[..entry.message_len as usize]).unwrap_or("?");

        unsafe {
            SERIAL_PORT.write_str("[");
            SERIAL_PORT.write_str(level_str(entry.level));
            SERIAL_PORT.write_str("] ");
            SERIAL_PORT.write_str(module);
            SERIAL_PORT.write_str(": ");
            SERIAL_PORT.write_str(message);
            SERIAL_PORT.write_str("\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_fifo() {
        let mut ring = RingBuffer::new();
        let mut a = LogEntry::blank();
        a.message[0] = b'a';
        a.message_len = 1;
        let mut b = LogEntry::blank();
        b.message[0] = b'b';
        b.message_len = 1;

        ring.push(a);
        ring.push(b);

        assert_eq!(ring.pop().unwrap().message[0], b'a');
        assert_eq!(ring.pop().unwrap().message[0], b'b');
        assert!(ring.pop().is_none());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut ring = RingBuffer::new();
        for i in 0..(CAPACITY + 6) {
            let mut e = LogEntry::blank();
            e.message[0] = (i % 256) as u8;
            e.message_len = 1;
            ring.push(e);
        }
        assert_eq!(ring.count, CAPACITY);
        // the oldest surviving entry is #6 (0-indexed), the first 6 were dropped
        assert_eq!(ring.pop().unwrap().message[0], 6);
    }

    #[test]
    fn count_never_exceeds_capacity() {
        let mut ring = RingBuffer::new();
        for _ in 0..1000 {
            ring.push(LogEntry::blank());
            assert!(ring.count <= CAPACITY);
        }
    }
}
