//! Frame encoder producing the wire format read by [`crate::decoder`]
//!
//! Used to build synthetic traces for tests, benchmarks and fuzz seeds.
//! Methods chain so a whole scenario reads top to bottom:
//!
//! ```
//! use lockgraph::encoder::FrameEncoder;
//!
//! let mut enc = FrameEncoder::default();
//! enc.new_thread(1, "T1", "")
//!     .new_thread(2, "T2", "")
//!     .new_monitor(9, "java.lang.Object")
//!     .set_current_thread(1)
//!     .monitor_entry(100, 9, 2)
//!     .monitor_exit(150, 9);
//! assert!(!enc.as_bytes().is_empty());
//! ```

use crate::config::{Charset, DecoderConfig};
use crate::wire::{EventTag, Timestamps, TIMESTAMP_BYTES, TIMESTAMP_MAX};

#[derive(Debug, Clone, Default)]
pub struct FrameEncoder {
    config: DecoderConfig,
    buf: Vec<u8>,
}

impl FrameEncoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            buf: Vec::new(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Take the encoded bytes, leaving the encoder empty for the next buffer
    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub fn reset(&mut self) -> &mut Self {
        self.tag(EventTag::Reset);
        self
    }

    pub fn set_current_thread(&mut self, thread: u16) -> &mut Self {
        self.tag(EventTag::SetCurrentThread);
        self.buf.extend_from_slice(&thread.to_be_bytes());
        self
    }

    pub fn new_thread(&mut self, thread: u16, name: &str, class_name: &str) -> &mut Self {
        self.tag(EventTag::NewThread);
        self.buf.extend_from_slice(&thread.to_be_bytes());
        self.lstring(name);
        self.lstring(class_name);
        self
    }

    pub fn new_monitor(&mut self, monitor: i32, class_name: &str) -> &mut Self {
        self.tag(EventTag::NewMonitor);
        self.buf.extend_from_slice(&monitor.to_be_bytes());
        self.lstring(class_name);
        self
    }

    pub fn profile_point_hit(&mut self, point: u16, timestamp: u64, thread: u16) -> &mut Self {
        self.tag(EventTag::ProfilePointHit);
        self.buf.extend_from_slice(&point.to_be_bytes());
        self.timestamps(Timestamps::wall(timestamp));
        self.buf.extend_from_slice(&thread.to_be_bytes());
        self
    }

    pub fn monitor_entry(&mut self, timestamp: u64, monitor: i32, owner: i32) -> &mut Self {
        self.monitor_entry_at(Timestamps::wall(timestamp), monitor, owner)
    }

    pub fn monitor_entry_with_cpu(
        &mut self,
        wall: u64,
        cpu: u64,
        monitor: i32,
        owner: i32,
    ) -> &mut Self {
        self.monitor_entry_at(Timestamps::with_cpu(wall, cpu), monitor, owner)
    }

    fn monitor_entry_at(&mut self, timestamp: Timestamps, monitor: i32, owner: i32) -> &mut Self {
        self.tag(EventTag::MonitorEntry);
        self.timestamps(timestamp);
        self.buf.extend_from_slice(&monitor.to_be_bytes());
        self.buf.extend_from_slice(&owner.to_be_bytes());
        self
    }

    pub fn monitor_exit(&mut self, timestamp: u64, monitor: i32) -> &mut Self {
        self.tag(EventTag::MonitorExit);
        self.timestamps(Timestamps::wall(timestamp));
        self.buf.extend_from_slice(&monitor.to_be_bytes());
        self
    }

    pub fn adjust_time(&mut self, diff: u64) -> &mut Self {
        self.tag(EventTag::AdjustTime);
        self.timestamps(Timestamps::wall(diff));
        self
    }

    pub fn adjust_time_with_cpu(&mut self, wall: u64, cpu: u64) -> &mut Self {
        self.tag(EventTag::AdjustTime);
        self.timestamps(Timestamps::with_cpu(wall, cpu));
        self
    }

    /// Append raw bytes (for corrupt-stream tests)
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    fn tag(&mut self, tag: EventTag) {
        self.buf.push(tag as u8);
    }

    // The CPU stamp is written only in two-timestamp mode (0 if absent)
    fn timestamps(&mut self, ts: Timestamps) {
        self.timestamp(ts.wall);
        if self.config.two_timestamps {
            self.timestamp(ts.cpu.unwrap_or(0));
        }
    }

    fn timestamp(&mut self, value: u64) {
        let bytes = (value & TIMESTAMP_MAX).to_be_bytes();
        self.buf.extend_from_slice(&bytes[8 - TIMESTAMP_BYTES..]);
    }

    // Strings longer than u16::MAX bytes are cut at the last whole character
    fn lstring(&mut self, s: &str) {
        let max = usize::from(u16::MAX);
        let mut bytes = self.config.charset.encode(s);
        if bytes.len() > max {
            let cut = match self.config.charset {
                Charset::Utf8 => (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0),
                Charset::Latin1 => max,
            };
            bytes.truncate(cut);
        }
        let len = bytes.len() as u16;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(&bytes);
    }
}
