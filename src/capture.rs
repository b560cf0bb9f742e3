//! Capture thread: pulls decoded mono samples from a [`SampleSource`] and
//! writes them into the shared [`RingBuffer`].
//!
//! The source is opened on the capture thread itself, since cpal streams are
//! not `Send` on every platform. The only thing the thread shares with the
//! consumer is the ring; startup status and the exit notice travel over
//! one-shot channels.

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{CaptureError, Error, Result};
use crate::ring::RingBuffer;

/// How long `stop` waits for the capture thread before detaching it.
pub const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// How long `start` waits for the device to open.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound a [`SampleSource::read`] call should block for, so the stop
/// flag is observed promptly.
pub const READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Consecutive device failures tolerated before the capture thread gives up.
const MAX_CONSECUTIVE_FAILURES: u32 = 50;

/// Opens capture sources. Shared by the analyzer across restarts.
pub trait CaptureBackend: Send + Sync {
    /// Open a mono source at `sample_rate`. Runs on the capture thread.
    fn open(&self, sample_rate: u32) -> Result<Box<dyn SampleSource>>;

    /// Human-readable device name.
    fn name(&self) -> String;
}

/// A blocking stream of mono `f32` samples in `[-1, 1]`.
pub trait SampleSource {
    /// Append newly captured samples to `out`, blocking for at most about
    /// [`READ_TIMEOUT`]. `Ok(0)` is a short read and is simply retried.
    fn read(&mut self, out: &mut Vec<f32>) -> std::result::Result<usize, CaptureError>;
}

/// Handle to a running capture thread.
pub struct CaptureWorker {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    done_rx: Receiver<()>,
}

impl CaptureWorker {
    /// Spawn the capture thread and wait until its source is open.
    ///
    /// On failure the thread has already exited and the ring was not touched.
    pub fn spawn(
        backend: Arc<dyn CaptureBackend>,
        ring: Arc<RingBuffer>,
        sample_rate: u32,
        silence_len: usize,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let thread_stop = Arc::clone(&stop);
        let thread_alive = Arc::clone(&alive);

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                match backend.open(sample_rate) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        capture_loop(source, &ring, &thread_stop, silence_len);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
                thread_alive.store(false, Ordering::Release);
                let _ = done_tx.send(());
            })
            .map_err(|e| Error::DeviceUnavailable(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => Ok(Self {
                handle: Some(handle),
                stop,
                alive,
                done_rx,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Device open hung; leave the thread to exit on its own.
                stop.store(true, Ordering::Release);
                Err(Error::DeviceUnavailable(
                    "timed out waiting for capture device to open".into(),
                ))
            }
        }
    }

    /// Whether the capture loop is still running.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Signal the thread and join it within [`STOP_TIMEOUT`].
    ///
    /// Returns `false` when the thread did not exit in time and was detached.
    /// A detached thread keeps its [`SampleSource`], and the device behind it,
    /// until the blocked `read` returns; the source is not `Send`, so it cannot
    /// be taken back and dropped here.
    pub fn stop(mut self) -> bool {
        self.stop.store(true, Ordering::Release);

        match self.done_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        log::warn!("capture thread panicked");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "capture thread did not stop within {} ms; detaching it",
                    STOP_TIMEOUT.as_millis()
                );
                self.handle.take();
                false
            }
        }
    }
}

fn capture_loop(
    mut source: Box<dyn SampleSource>,
    ring: &RingBuffer,
    stop: &AtomicBool,
    silence_len: usize,
) {
    let mut buf = Vec::with_capacity(4096);
    let mut failures = 0u32;

    while !stop.load(Ordering::Acquire) {
        buf.clear();
        match source.read(&mut buf) {
            Ok(0) => {}
            Ok(_) => {
                failures = 0;
                ring.write_slice(&buf);
            }
            Err(e) => {
                failures += 1;
                if failures == 1 {
                    log::warn!("capture read failed: {e}");
                }
                if e == CaptureError::Disconnected || failures >= MAX_CONSECUTIVE_FAILURES {
                    log::warn!("capture device lost after {failures} failed read(s); stopping capture");
                    // Let the consumer decay toward zero instead of freezing on
                    // the last window.
                    for _ in 0..silence_len {
                        ring.write(0.0);
                    }
                    break;
                }
                thread::sleep(READ_TIMEOUT);
            }
        }
    }

    log::debug!("capture loop exited");
}

/// Test-signal backend: a sine wave generated in real time.
#[derive(Clone, Debug)]
pub struct ToneBackend {
    pub frequency: f32,
    pub amplitude: f32,
}

impl ToneBackend {
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
        }
    }
}

impl CaptureBackend for ToneBackend {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn SampleSource>> {
        if sample_rate == 0 {
            return Err(Error::DeviceUnavailable("tone sample rate must be > 0".into()));
        }
        let block = (sample_rate as usize / 100).max(1);
        Ok(Box::new(ToneSource {
            step: TAU * self.frequency as f64 / sample_rate as f64,
            amplitude: self.amplitude,
            phase: 0.0,
            block,
            block_duration: Duration::from_secs_f64(block as f64 / sample_rate as f64),
        }))
    }

    fn name(&self) -> String {
        format!("test tone {:.1} Hz", self.frequency)
    }
}

struct ToneSource {
    step: f64,
    amplitude: f32,
    phase: f64,
    block: usize,
    block_duration: Duration,
}

impl SampleSource for ToneSource {
    fn read(&mut self, out: &mut Vec<f32>) -> std::result::Result<usize, CaptureError> {
        thread::sleep(self.block_duration);
        for _ in 0..self.block {
            out.push(self.amplitude * self.phase.sin() as f32);
            self.phase = (self.phase + self.step) % TAU;
        }
        Ok(self.block)
    }
}
