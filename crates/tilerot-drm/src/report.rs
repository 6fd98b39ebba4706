//! Cleanup report.
//!
//! Cleanup may run inside a fatal-signal handler, where the locked stderr
//! logger is off limits. Each step therefore pushes a `Copy` event into a
//! lock-free queue allocated up front; when the steps are done the report
//! is flushed either through the regular logger (exit hook) or line by line
//! through a stack buffer and raw `write(2)` (signal handler).

use std::fmt::{self, Write as _};
use std::os::raw::c_int;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;
use tilerot_core::kprint::LogLevel;

use crate::cleanup::Trigger;

/// One line of the cleanup report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupEvent {
    Started(Trigger),
    DescriptorClosed { fd: RawFd, ret: c_int },
    FramebufferRemoved { channel: RawFd, fb_id: u32, ret: c_int, errno: i32 },
    BufferDestroyed { channel: RawFd, handle: u32, ret: c_int, errno: i32 },
    /// The tables were locked by the interrupted code; tracked objects skipped
    TablesBusy,
}

impl CleanupEvent {
    pub fn level(&self) -> LogLevel {
        match self {
            CleanupEvent::FramebufferRemoved { ret, .. } | CleanupEvent::BufferDestroyed { ret, .. }
                if *ret != 0 =>
            {
                LogLevel::Warn
            }
            CleanupEvent::TablesBusy => LogLevel::Warn,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for CleanupEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupEvent::Started(trigger) => write!(f, "cleaning up after {}", trigger),
            CleanupEvent::DescriptorClosed { fd, ret } => {
                write!(f, "cleanup close {}, ret={}", fd, ret)
            }
            CleanupEvent::FramebufferRemoved { channel, fb_id, ret, errno } => {
                write!(f, "cleanup remove {} {}, ret={}", channel, fb_id, ret)?;
                if *ret != 0 {
                    write!(f, " errno={}", errno)?;
                }
                Ok(())
            }
            CleanupEvent::BufferDestroyed { channel, handle, ret, errno } => {
                write!(f, "cleanup destroy {} {}, ret={}", channel, handle, ret)?;
                if *ret != 0 {
                    write!(f, " errno={}", errno)?;
                }
                Ok(())
            }
            CleanupEvent::TablesBusy => {
                write!(f, "tracking tables busy, tracked objects left to the kernel")
            }
        }
    }
}

/// Bounded event queue, sized so a full drain of every table fits
pub struct CleanupReport {
    events: ArrayQueue<CleanupEvent>,
    dropped: AtomicUsize,
}

impl CleanupReport {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Room for three full tables plus the bookkeeping lines
    pub fn with_table_capacity(table_capacity: usize) -> Self {
        Self::new(table_capacity * 3 + 4)
    }

    /// Record an event; never blocks or allocates
    pub fn push(&self, event: CleanupEvent) {
        if self.events.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn pop(&self) -> Option<CleanupEvent> {
        self.events.pop()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events that did not fit
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Fixed-size line buffer for formatting without allocation
///
/// Output past the buffer's end is truncated.
pub struct LineBuf {
    buf: [u8; 192],
    len: usize,
}

impl LineBuf {
    pub const fn new() -> Self {
        Self { buf: [0; 192], len: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for LineBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len() - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

/// Format one event as a full log line into `line`
pub fn render_line(line: &mut LineBuf, event: &CleanupEvent) {
    line.clear();
    let _ = writeln!(line, "{} {}", event.level().prefix(), event);
}
