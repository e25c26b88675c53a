//! Binary frame decoder for lock-contention event buffers
//!
//! A buffer holds zero or more complete frames. Each frame starts with a
//! one-byte [`EventTag`](crate::wire::EventTag); the field layout depends on
//! the tag (see [`crate::wire`]).
//!
//! Decoding is stateless per call: the decoder keeps only the session-wide
//! [`DecoderConfig`] and never looks at previous buffers. An unknown tag or a
//! truncated frame ends decoding of that buffer; there is no attempt to
//! resynchronize, since the remaining bytes cannot be trusted to start on a
//! frame boundary.
//!
//! # Example
//!
//! ```
//! use lockgraph::config::DecoderConfig;
//! use lockgraph::decoder::{FrameDecoder, TraceEvent};
//! use lockgraph::encoder::FrameEncoder;
//!
//! let config = DecoderConfig::default();
//! let mut enc = FrameEncoder::new(config);
//! enc.set_current_thread(1).monitor_entry(100, 9, 2);
//!
//! let decoder = FrameDecoder::new(config);
//! let events: Vec<_> = decoder.frames(enc.as_bytes()).collect();
//! assert_eq!(events.len(), 2);
//! assert!(matches!(events[1], Ok(TraceEvent::MonitorEntry { monitor: 9, owner: 2, .. })));
//! ```

use crate::config::DecoderConfig;
use crate::error::{FrameError, Result};
use crate::registry::{MonitorId, ThreadId};
use crate::wire::{EventTag, Timestamps, TIMESTAMP_BYTES};
use tracing::warn;

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Reset,
    ProfilePointHit {
        point: u16,
        timestamp: Timestamps,
        thread: ThreadId,
    },
    SetCurrentThread {
        thread: ThreadId,
    },
    NewThread {
        thread: ThreadId,
        name: String,
        class_name: String,
    },
    NewMonitor {
        monitor: MonitorId,
        class_name: String,
    },
    MonitorEntry {
        timestamp: Timestamps,
        monitor: MonitorId,
        /// Raw owner id from the wire; negative means no usable owner
        owner: i32,
    },
    MonitorExit {
        timestamp: Timestamps,
        monitor: MonitorId,
    },
    AdjustTime {
        diff: Timestamps,
    },
}

/// Receiver of decoded events, one callback per frame
///
/// Every handler defaults to a no-op so a sink only implements what it
/// consumes. An `Err` from any handler stops the decode of the current
/// buffer and is returned from [`FrameDecoder::decode`].
pub trait EventSink {
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    fn profile_point_hit(
        &mut self,
        _point: u16,
        _timestamp: Timestamps,
        _thread: ThreadId,
    ) -> Result<()> {
        Ok(())
    }

    fn set_current_thread(&mut self, _thread: ThreadId) -> Result<()> {
        Ok(())
    }

    fn new_thread(&mut self, _thread: ThreadId, _name: String, _class_name: String) -> Result<()> {
        Ok(())
    }

    fn new_monitor(&mut self, _monitor: MonitorId, _class_name: String) -> Result<()> {
        Ok(())
    }

    fn monitor_entry(&mut self, _timestamp: Timestamps, _monitor: MonitorId, _owner: i32) -> Result<()> {
        Ok(())
    }

    fn monitor_exit(&mut self, _timestamp: Timestamps, _monitor: MonitorId) -> Result<()> {
        Ok(())
    }

    fn adjust_time(&mut self, _diff: Timestamps) -> Result<()> {
        Ok(())
    }

    /// Route a decoded event to its handler
    fn dispatch(&mut self, event: TraceEvent) -> Result<()> {
        route(self, event)
    }
}

/// Call the handler of `sink` that matches `event`
pub fn route<S: EventSink + ?Sized>(sink: &mut S, event: TraceEvent) -> Result<()> {
    match event {
        TraceEvent::Reset => sink.reset(),
        TraceEvent::ProfilePointHit {
            point,
            timestamp,
            thread,
        } => sink.profile_point_hit(point, timestamp, thread),
        TraceEvent::SetCurrentThread { thread } => sink.set_current_thread(thread),
        TraceEvent::NewThread {
            thread,
            name,
            class_name,
        } => sink.new_thread(thread, name, class_name),
        TraceEvent::NewMonitor {
            monitor,
            class_name,
        } => sink.new_monitor(monitor, class_name),
        TraceEvent::MonitorEntry {
            timestamp,
            monitor,
            owner,
        } => sink.monitor_entry(timestamp, monitor, owner),
        TraceEvent::MonitorExit { timestamp, monitor } => sink.monitor_exit(timestamp, monitor),
        TraceEvent::AdjustTime { diff } => sink.adjust_time(diff),
    }
}

/// Outcome of decoding one buffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodeSummary {
    /// Frames decoded and dispatched
    pub frames: usize,
    /// Bytes covered by those frames
    pub bytes_consumed: usize,
    /// Set when decoding stopped before the end of the buffer
    pub stopped: Option<FrameError>,
}

impl DecodeSummary {
    pub fn is_complete(&self) -> bool {
        self.stopped.is_none()
    }
}

/// Stateless-per-call decoder configured with the session wire settings
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    config: DecoderConfig,
}

impl FrameDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Iterate over the frames of `buf`
    ///
    /// The iterator yields at most one `Err` and then ends.
    pub fn frames<'a>(&self, buf: &'a [u8]) -> Frames<'a> {
        Frames {
            buf,
            pos: 0,
            config: self.config,
            failed: false,
        }
    }

    /// Decode `buf` and dispatch every frame to `sink`
    ///
    /// # Errors
    ///
    /// Returns the sink's error if a handler rejects an event. Frame-level
    /// problems are not errors; they are logged and reported in
    /// [`DecodeSummary::stopped`].
    pub fn decode<S: EventSink + ?Sized>(&self, buf: &[u8], sink: &mut S) -> Result<DecodeSummary> {
        let mut summary = DecodeSummary::default();
        let mut frames = self.frames(buf);

        while let Some(item) = frames.next() {
            match item {
                Ok(event) => {
                    sink.dispatch(event)?;
                    summary.frames += 1;
                    summary.bytes_consumed = frames.offset();
                }
                Err(err) => {
                    warn!(
                        "Abandoning buffer after {} frames ({} of {} bytes): {}",
                        summary.frames,
                        summary.bytes_consumed,
                        buf.len(),
                        err
                    );
                    summary.stopped = Some(err);
                    break;
                }
            }
        }

        Ok(summary)
    }
}

/// Iterator over the frames of one buffer
#[derive(Debug)]
pub struct Frames<'a> {
    buf: &'a [u8],
    pos: usize,
    config: DecoderConfig,
    failed: bool,
}

impl Frames<'_> {
    /// Offset of the next frame
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn read_frame(&self, tag: EventTag) -> std::result::Result<(TraceEvent, usize), FrameError> {
        let mut r = FieldReader {
            buf: self.buf,
            pos: self.pos + 1,
            frame_start: self.pos,
            event: tag.name(),
            config: self.config,
        };

        let event = match tag {
            EventTag::Reset => TraceEvent::Reset,
            EventTag::ProfilePointHit => {
                let point = r.u16()?;
                let timestamp = r.timestamps()?;
                let thread = ThreadId::from(r.u16()?);
                TraceEvent::ProfilePointHit {
                    point,
                    timestamp,
                    thread,
                }
            }
            EventTag::SetCurrentThread => TraceEvent::SetCurrentThread {
                thread: ThreadId::from(r.u16()?),
            },
            EventTag::NewThread => {
                let thread = ThreadId::from(r.u16()?);
                let name = r.lstring()?;
                let class_name = r.lstring()?;
                TraceEvent::NewThread {
                    thread,
                    name,
                    class_name,
                }
            }
            EventTag::NewMonitor => {
                let monitor = r.i32()?;
                let class_name = r.lstring()?;
                TraceEvent::NewMonitor {
                    monitor,
                    class_name,
                }
            }
            EventTag::MonitorEntry => {
                let timestamp = r.timestamps()?;
                let monitor = r.i32()?;
                let owner = r.i32()?;
                TraceEvent::MonitorEntry {
                    timestamp,
                    monitor,
                    owner,
                }
            }
            EventTag::MonitorExit => {
                let timestamp = r.timestamps()?;
                let monitor = r.i32()?;
                TraceEvent::MonitorExit { timestamp, monitor }
            }
            EventTag::AdjustTime => TraceEvent::AdjustTime {
                diff: r.timestamps()?,
            },
        };

        Ok((event, r.pos))
    }
}

impl Iterator for Frames<'_> {
    type Item = std::result::Result<TraceEvent, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }

        let byte = self.buf[self.pos];
        let result = match EventTag::from_byte(byte) {
            Some(tag) => self.read_frame(tag),
            None => Err(FrameError::UnknownTag {
                tag: byte,
                offset: self.pos,
            }),
        };

        match result {
            Ok((event, next)) => {
                self.pos = next;
                Some(Ok(event))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Bounds-checked big-endian field reads within one frame
struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
    frame_start: usize,
    event: &'static str,
    config: DecoderConfig,
}

impl<'a> FieldReader<'a> {
    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], FrameError> {
        let available = self.buf.len() - self.pos;
        if available < n {
            return Err(FrameError::Truncated {
                event: self.event,
                offset: self.frame_start,
                needed: n - available,
                available,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn u16(&mut self) -> std::result::Result<u16, FrameError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> std::result::Result<i32, FrameError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn timestamp(&mut self) -> std::result::Result<u64, FrameError> {
        let b = self.take(TIMESTAMP_BYTES)?;
        Ok(b.iter().fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte)))
    }

    fn timestamps(&mut self) -> std::result::Result<Timestamps, FrameError> {
        let wall = self.timestamp()?;
        if self.config.two_timestamps {
            let cpu = self.timestamp()?;
            Ok(Timestamps::with_cpu(wall, cpu))
        } else {
            Ok(Timestamps::wall(wall))
        }
    }

    fn lstring(&mut self) -> std::result::Result<String, FrameError> {
        let len = usize::from(self.u16()?);
        let bytes = self.take(len)?;
        Ok(self.config.charset.decode(bytes))
    }
}
