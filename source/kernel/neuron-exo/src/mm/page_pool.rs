// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reference-counted pool of 4 KiB physical frames.

use nexus_abi::{MAX_FRAMES, PGSIZE};

/// Allocation counters of a [`PagePool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Frames handed out since creation.
    pub allocated: u64,
    /// Frames returned since creation.
    pub freed: u64,
    /// Frames currently allocated.
    pub in_use: usize,
    /// Highest value `in_use` reached.
    pub peak: usize,
}

struct Frame {
    bytes: Box<[u8]>,
    refs: u32,
}

/// Fixed-size frame pool. Frame numbers are dense indices `0..capacity`.
pub struct PagePool {
    frames: Vec<Option<Frame>>,
    free: Vec<u32>,
    stats: PoolStats,
}

impl PagePool {
    /// Creates a pool of `capacity` frames, capped at what an entry can address.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_FRAMES);
        let mut frames = Vec::with_capacity(capacity);
        frames.resize_with(capacity, || None);
        // Lowest frame numbers are handed out first.
        let free = (0..capacity as u32).rev().collect();
        Self { frames, free, stats: PoolStats::default() }
    }

    /// Total number of frames.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Frames not currently allocated.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Allocates a zeroed frame with a reference count of zero.
    pub fn alloc(&mut self) -> Option<u32> {
        let frame = self.free.pop()?;
        let bytes = vec![0; PGSIZE].into_boxed_slice();
        self.frames[frame as usize] = Some(Frame { bytes, refs: 0 });
        self.stats.allocated += 1;
        self.stats.in_use += 1;
        self.stats.peak = self.stats.peak.max(self.stats.in_use);
        Some(frame)
    }

    /// Adds a reference to `frame`.
    pub fn incref(&mut self, frame: u32) {
        if let Some(slot) = self.slot_mut(frame) {
            slot.refs += 1;
        }
    }

    /// Drops a reference to `frame`, freeing it when none remain.
    pub fn decref(&mut self, frame: u32) {
        let Some(slot) = self.slot_mut(frame) else { return };
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs == 0 {
            self.release(frame);
        }
    }

    /// Frees a frame that never gained a reference.
    pub fn release(&mut self, frame: u32) {
        if let Some(entry) = self.frames.get_mut(frame as usize) {
            if entry.take().is_some() {
                self.free.push(frame);
                self.stats.freed += 1;
                self.stats.in_use -= 1;
            }
        }
    }

    /// Current reference count; zero for free frames.
    pub fn refcount(&self, frame: u32) -> u32 {
        self.slot(frame).map_or(0, |slot| slot.refs)
    }

    /// Contents of an allocated frame.
    pub fn bytes(&self, frame: u32) -> Option<&[u8]> {
        self.slot(frame).map(|slot| &slot.bytes[..])
    }

    /// Mutable contents of an allocated frame.
    pub fn bytes_mut(&mut self, frame: u32) -> Option<&mut [u8]> {
        self.slot_mut(frame).map(|slot| &mut slot.bytes[..])
    }

    /// Allocation counters.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    fn slot(&self, frame: u32) -> Option<&Frame> {
        self.frames.get(frame as usize).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, frame: u32) -> Option<&mut Frame> {
        self.frames.get_mut(frame as usize).and_then(Option::as_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_zeroed_and_recycled() {
        let mut pool = PagePool::new(2);
        let a = pool.alloc().unwrap();
        pool.incref(a);
        pool.bytes_mut(a).unwrap()[7] = 9;
        pool.decref(a);
        assert_eq!(pool.free_count(), 2);
        let b = pool.alloc().unwrap();
        assert_eq!(b, a);
        assert_eq!(pool.bytes(b).unwrap()[7], 0);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut pool = PagePool::new(1);
        assert!(pool.alloc().is_some());
        assert!(pool.alloc().is_none());
    }

    #[test]
    fn shared_frame_survives_one_decref() {
        let mut pool = PagePool::new(1);
        let f = pool.alloc().unwrap();
        pool.incref(f);
        pool.incref(f);
        pool.decref(f);
        assert_eq!(pool.refcount(f), 1);
        assert!(pool.bytes(f).is_some());
        pool.decref(f);
        assert!(pool.bytes(f).is_none());
        let stats = pool.stats();
        assert_eq!((stats.allocated, stats.freed, stats.in_use, stats.peak), (1, 1, 0, 1));
    }
}
