//! Dedicated decoding thread
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │ PRODUCER (agent connection, replay)   │
//! │   submit(buffer)  ─ blocks when full  │
//! └───────────────────────────────────────┘
//!                    │
//!                    │ bounded crossbeam channel
//!                    ▼
//! ┌───────────────────────────────────────┐
//! │ DECODER THREAD                        │
//! │   for buffer in rx {                  │
//! │     session.process_buffer(&buffer)   │
//! │   }                                   │
//! └───────────────────────────────────────┘
//! ```
//!
//! Buffers are never dropped under backpressure: a lost buffer would desync
//! every open episode after it. The worker keeps draining after an error so
//! producers never block on a dead consumer; later buffers simply fail with
//! [`TraceError::Poisoned`] and only the first error is kept.

use crate::error::{Result, TraceError};
use crate::session::Session;
use crossbeam::channel::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Counters reported by the worker when it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub buffers: u64,
    pub bytes: u64,
    pub failed_buffers: u64,
}

struct WorkerOutcome {
    stats: WorkerStats,
    first_error: Option<TraceError>,
}

/// Decodes submitted buffers into a shared [`Session`] on its own thread
pub struct DecoderThread {
    sender: Option<Sender<Vec<u8>>>,
    handle: Option<JoinHandle<WorkerOutcome>>,
}

impl DecoderThread {
    /// Spawn the worker with a channel of `capacity` buffers
    ///
    /// A zero capacity is raised to one.
    pub fn spawn(session: Arc<Session>, capacity: usize) -> Self {
        let (sender, receiver) = channel::bounded::<Vec<u8>>(capacity.max(1));

        let handle = thread::spawn(move || {
            let mut outcome = WorkerOutcome {
                stats: WorkerStats::default(),
                first_error: None,
            };
            for buffer in receiver {
                outcome.stats.buffers += 1;
                outcome.stats.bytes += buffer.len() as u64;
                if let Err(err) = session.process_buffer(&buffer) {
                    outcome.stats.failed_buffers += 1;
                    if outcome.first_error.is_none() {
                        warn!("Decoder thread: {}", err);
                        outcome.first_error = Some(err);
                    }
                }
            }
            debug!(
                "Decoder thread exiting after {} buffers ({} bytes)",
                outcome.stats.buffers, outcome.stats.bytes
            );
            outcome
        });

        Self {
            sender: Some(sender),
            handle: Some(handle),
        }
    }

    /// Queue a buffer, blocking while the channel is full
    ///
    /// # Errors
    ///
    /// [`TraceError::DecoderGone`] if the worker is no longer receiving.
    pub fn submit(&self, buffer: Vec<u8>) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(TraceError::DecoderGone)?;
        sender.send(buffer).map_err(|_| TraceError::DecoderGone)
    }

    /// Close the channel, wait for the backlog to drain and join the worker
    ///
    /// Returns the worker's counters, or the first error any buffer hit.
    pub fn finish(mut self) -> Result<WorkerStats> {
        let outcome = self.join()?;
        match outcome.first_error {
            Some(err) => Err(err),
            None => Ok(outcome.stats),
        }
    }

    fn join(&mut self) -> Result<WorkerOutcome> {
        self.sender.take();
        let handle = self.handle.take().ok_or(TraceError::DecoderGone)?;
        handle.join().map_err(|_| TraceError::DecoderGone)
    }
}

impl Drop for DecoderThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::FrameEncoder;

    #[test]
    fn test_buffers_decoded_in_order() {
        let session = Arc::new(Session::default());
        let worker = DecoderThread::spawn(Arc::clone(&session), 1);

        let mut enc = FrameEncoder::default();
        enc.new_thread(1, "T1", "")
            .new_thread(2, "T2", "")
            .new_monitor(9, "java.lang.Object")
            .set_current_thread(1)
            .monitor_entry(100, 9, 2);
        worker.submit(enc.take_buffer()).unwrap();
        enc.monitor_exit(150, 9);
        worker.submit(enc.take_buffer()).unwrap();

        let stats = worker.finish().unwrap();
        assert_eq!(stats.buffers, 2);
        assert_eq!(stats.failed_buffers, 0);
        assert_eq!(session.snapshot().total_wait_time(), 50);
    }

    #[test]
    fn test_first_error_reported() {
        let session = Arc::new(Session::default());
        let worker = DecoderThread::spawn(Arc::clone(&session), 4);

        let mut enc = FrameEncoder::default();
        enc.new_thread(1, "T1", "").set_current_thread(1).monitor_exit(10, 3);
        worker.submit(enc.take_buffer()).unwrap();
        enc.set_current_thread(1);
        worker.submit(enc.take_buffer()).unwrap();

        let err = worker.finish().unwrap_err();
        assert!(matches!(err, TraceError::InconsistentTrace { thread: 1, .. }));
        assert!(session.is_poisoned());
    }

    #[test]
    fn test_drop_joins_worker() {
        let session = Arc::new(Session::default());
        {
            let worker = DecoderThread::spawn(Arc::clone(&session), 0);
            let mut enc = FrameEncoder::default();
            enc.reset();
            worker.submit(enc.into_bytes()).unwrap();
        }
        assert_eq!(session.stats().buffers, 1);
        assert_eq!(Arc::strong_count(&session), 1);
    }
}
