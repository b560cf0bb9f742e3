//! Single-producer / single-consumer sample ring.
//!
//! The capture thread is the only writer. Each slot is an `AtomicU32` holding
//! the bit pattern of an `f32`, so a reader racing a write sees either the old
//! or the new sample, never a mix. The write cursor only ever advances: it is
//! published with `Release` after the slots are stored and read with `Acquire`
//! before the slots are copied out.
//!
//! Not a general concurrent queue. Two writers would race on the cursor.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::error::{Error, Result};

pub struct RingBuffer {
    slots: Box<[AtomicU32]>,
    mask: usize,
    cursor: AtomicUsize,
}

impl RingBuffer {
    /// Allocate a zero-filled ring. `capacity` must be a power of two.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(Error::InvalidRequest(format!(
                "ring capacity must be a power of two, got {capacity}"
            )));
        }
        let slots = (0..capacity)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            slots,
            mask: capacity - 1,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total number of samples written so far (wraps at `usize::MAX`).
    pub fn written(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Append one sample. Producer thread only.
    #[inline]
    pub fn write(&self, sample: f32) {
        let pos = self.cursor.load(Ordering::Relaxed);
        self.slots[pos & self.mask].store(sample.to_bits(), Ordering::Relaxed);
        self.cursor.store(pos.wrapping_add(1), Ordering::Release);
    }

    /// Append a block of samples, publishing the cursor once at the end.
    /// Producer thread only.
    #[inline]
    pub fn write_slice(&self, samples: &[f32]) {
        let mut pos = self.cursor.load(Ordering::Relaxed);
        for &s in samples {
            self.slots[pos & self.mask].store(s.to_bits(), Ordering::Relaxed);
            pos = pos.wrapping_add(1);
        }
        self.cursor.store(pos, Ordering::Release);
    }

    /// Copy the most recent `count` samples, oldest first.
    ///
    /// `count` is clamped to the capacity. Slots never written read as 0.0.
    pub fn snapshot(&self, count: usize) -> Vec<f32> {
        let mut out = vec![0.0; count.min(self.capacity())];
        self.snapshot_into(&mut out);
        out
    }

    /// Fill `out` with the most recent samples, oldest first, without
    /// allocating. Only the last `capacity` entries of an oversized `out` are
    /// filled; the leading excess is zeroed.
    pub fn snapshot_into(&self, out: &mut [f32]) {
        let count = out.len().min(self.capacity());
        let excess = out.len() - count;
        out[..excess].fill(0.0);

        let end = self.cursor.load(Ordering::Acquire);
        let start = end.wrapping_sub(count);
        for (i, dst) in out[excess..].iter_mut().enumerate() {
            let idx = start.wrapping_add(i) & self.mask;
            *dst = f32::from_bits(self.slots[idx].load(Ordering::Relaxed));
        }
    }

    /// Zero every slot. Only meaningful while no producer is attached.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(0.0f32.to_bits(), Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("written", &self.written())
            .finish()
    }
}
