//! Kernel log facility for the thread subsystem.
//!
//! Log lines carry a timer-tick timestamp and a severity badge. Output
//! goes to a byte sink registered by the embedding kernel (typically its
//! serial console); every line is also kept in a fixed-size ring buffer
//! so post-mortem debugging can recover the tail of the log even when no
//! sink was registered. Filtering is a single atomic level check, cheap
//! enough for the scheduler hot path.

use core::fmt::{self, Write};
use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use spin::{Mutex, Once};

// Static buffer pool for log lines: formatting must not allocate and must
// not push large arrays on the (4 KiB) kernel thread stacks.
static mut LOG_BUFFER_POOL: [[u8; 512]; 2] = [[0; 512]; 2];
static LOG_BUFFER_IN_USE: AtomicBool = AtomicBool::new(false);

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info.priority());
static LAST_TICK: AtomicU64 = AtomicU64::new(0);

/// Ring buffer holding the most recent log bytes (16 KiB).
const RINGBUF_SIZE: usize = 16384;
static RINGBUF: Mutex<RingBuffer> = Mutex::new(RingBuffer::new());

static SINK: Once<&'static dyn LogSink> = Once::new();

/// Destination for formatted log lines, supplied by the embedding kernel.
pub trait LogSink: Sync {
    fn write_bytes(&self, bytes: &[u8]);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Panic,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Panic => "PANIC",
            LogLevel::Fatal => "FATAL",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    const fn priority(self) -> u8 {
        match self {
            LogLevel::Panic => 0,
            LogLevel::Fatal => 1,
            LogLevel::Error => 2,
            LogLevel::Warn => 3,
            LogLevel::Info => 4,
            LogLevel::Debug => 5,
            LogLevel::Trace => 6,
        }
    }

    fn from_priority(value: u8) -> Self {
        match value {
            0 => LogLevel::Panic,
            1 => LogLevel::Fatal,
            2 => LogLevel::Error,
            3 => LogLevel::Warn,
            4 => LogLevel::Info,
            5 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("panic") {
            Some(LogLevel::Panic)
        } else if value.eq_ignore_ascii_case("fatal") {
            Some(LogLevel::Fatal)
        } else if value.eq_ignore_ascii_case("error") {
            Some(LogLevel::Error)
        } else if value.eq_ignore_ascii_case("warn") || value.eq_ignore_ascii_case("warning") {
            Some(LogLevel::Warn)
        } else if value.eq_ignore_ascii_case("info") {
            Some(LogLevel::Info)
        } else if value.eq_ignore_ascii_case("debug") {
            Some(LogLevel::Debug)
        } else if value.eq_ignore_ascii_case("trace") {
            Some(LogLevel::Trace)
        } else {
            None
        }
    }
}

/// Register the output sink. Later registrations are ignored.
pub fn set_sink(sink: &'static dyn LogSink) {
    SINK.call_once(|| sink);
}

/// Publish the current timer tick; stamped onto subsequent log lines.
pub fn note_tick(tick: u64) {
    LAST_TICK.store(tick, Ordering::Relaxed);
}

pub fn set_max_level(level: LogLevel) {
    LOG_LEVEL.store(level.priority(), Ordering::Relaxed);
}

pub fn max_level() -> LogLevel {
    LogLevel::from_priority(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Scan a kernel command line for a `log=LEVEL` or `loglevel=LEVEL` token.
pub fn parse_level_directive(cmdline: &str) -> Option<LogLevel> {
    for token in cmdline.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            if key.eq_ignore_ascii_case("log") || key.eq_ignore_ascii_case("loglevel") {
                if let Some(level) = LogLevel::from_str(value) {
                    return Some(level);
                }
            }
        }
    }
    None
}

pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    let current = LOG_LEVEL.load(Ordering::Relaxed);
    if level.priority() > current {
        return;
    }

    let tick = LAST_TICK.load(Ordering::Relaxed);
    let Some(buffer) = build_log_line(level, tick, args) else {
        return;
    };

    if let Some(sink) = SINK.get() {
        sink.write_bytes(buffer.as_bytes());
    }

    let mut ringbuf = RINGBUF.lock();
    ringbuf.write_bytes(buffer.as_bytes());
}

/// Copy out the ring buffer and its write position.
pub fn read_ringbuffer() -> ([u8; RINGBUF_SIZE], usize) {
    let ringbuf = RINGBUF.lock();
    (ringbuf.buf, ringbuf.write_pos)
}

fn build_log_line(level: LogLevel, tick: u64, args: fmt::Arguments<'_>) -> Option<LogLineBuffer> {
    let mut buffer = LogLineBuffer::new();
    if write!(
        buffer,
        "[{timestamp}] [{level}] ",
        timestamp = TickDisplay(tick),
        level = LevelDisplay(level)
    )
    .is_err()
    {
        return None;
    }
    if fmt::write(&mut buffer, args).is_err() {
        return None;
    }
    if buffer.write_str("\n").is_err() {
        return None;
    }
    Some(buffer)
}

struct TickDisplay(u64);

impl fmt::Display for TickDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", self.0)
    }
}

struct LevelDisplay(LogLevel);

impl fmt::Display for LevelDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<5}", self.0.as_str())
    }
}

struct LogLineBuffer {
    buf: &'static mut [u8; 512],
    len: usize,
    pooled: bool,
}

impl LogLineBuffer {
    fn new() -> Self {
        if LOG_BUFFER_IN_USE
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            // SAFETY: the in-use flag grants exclusive access to buffer 0.
            let buf_ptr = unsafe { addr_of_mut!(LOG_BUFFER_POOL[0]) };
            Self {
                buf: unsafe { &mut *buf_ptr },
                len: 0,
                pooled: true,
            }
        } else {
            // Pool busy: this is a log emitted while formatting another log
            // line (e.g. from an assertion). Buffer 1 is reserved for that
            // single level of nesting.
            let buf_ptr = unsafe { addr_of_mut!(LOG_BUFFER_POOL[1]) };
            Self {
                buf: unsafe { &mut *buf_ptr },
                len: 0,
                pooled: false,
            }
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Drop for LogLineBuffer {
    fn drop(&mut self) {
        if self.pooled {
            LOG_BUFFER_IN_USE.store(false, Ordering::Release);
        }
    }
}

impl fmt::Write for LogLineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

struct RingBuffer {
    buf: [u8; RINGBUF_SIZE],
    write_pos: usize,
}

impl RingBuffer {
    const fn new() -> Self {
        Self {
            buf: [0; RINGBUF_SIZE],
            write_pos: 0,
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.buf[self.write_pos] = byte;
            self.write_pos += 1;
            if self.write_pos >= RINGBUF_SIZE {
                self.write_pos = 0;
            }
        }
    }
}
