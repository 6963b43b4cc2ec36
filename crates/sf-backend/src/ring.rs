//! Lock-free ring buffer for backend/mixer decoupling
//!
//! Multi-producer/single-consumer over a power-of-two buffer. Writers
//! reserve a span by CAS on the head, fill it, then publish in reservation
//! order; the consumer reads through split "vector" views for zero-copy
//! draining. The audio thread must never block: all operations are bounded.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// MPSC ring buffer of `T` with zero-copy read views.
#[repr(align(64))]
pub struct RingBuffer<T> {
    buffer: Box<[UnsafeCell<T>]>,
    mask: usize,
    /// Next position writers may reserve.
    write_head: AtomicUsize,
    /// Positions published and visible to the consumer.
    write_tail: AtomicUsize,
    /// Consumer position.
    read_pos: AtomicUsize,
}

// SAFETY: slots between read_pos and write_tail are owned by the consumer;
// slots reserved via write_head are owned by exactly one producer until
// published through write_tail. The atomics order all handoffs.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a ring with at least `min_capacity` slots (rounded up to a
    /// power of two).
    pub fn new(min_capacity: usize) -> Self {
        let capacity = min_capacity.next_power_of_two().max(2);
        let buffer: Box<[UnsafeCell<T>]> =
            (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();
        Self {
            buffer,
            mask: capacity - 1,
            write_head: AtomicUsize::new(0),
            write_tail: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    /// Total slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Published items available to read.
    #[inline]
    pub fn readable(&self) -> usize {
        let tail = self.write_tail.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Relaxed);
        tail.wrapping_sub(read)
    }

    /// Free slots available to write.
    #[inline]
    pub fn writable(&self) -> usize {
        let head = self.write_head.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);
        self.capacity() - head.wrapping_sub(read)
    }

    /// Write items (producer side). Returns the number actually written;
    /// fewer than requested when the ring is near full.
    pub fn write(&self, items: &[T]) -> usize {
        // Reserve a span.
        let mut start;
        let mut count;
        loop {
            start = self.write_head.load(Ordering::Relaxed);
            let read = self.read_pos.load(Ordering::Acquire);
            let free = self.capacity() - start.wrapping_sub(read);
            count = items.len().min(free);
            if count == 0 {
                return 0;
            }
            if self
                .write_head
                .compare_exchange_weak(
                    start,
                    start.wrapping_add(count),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break;
            }
        }

        // Fill the reserved span.
        for (i, &item) in items[..count].iter().enumerate() {
            let idx = start.wrapping_add(i) & self.mask;
            // SAFETY: this span was exclusively reserved above.
            unsafe {
                *self.buffer[idx].get() = item;
            }
        }

        // Publish in reservation order: wait for earlier writers, bounded
        // by the fact that reservations are short and never block.
        while self
            .write_tail
            .compare_exchange_weak(
                start,
                start.wrapping_add(count),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_err()
        {
            std::hint::spin_loop();
        }
        count
    }

    /// Read items (single consumer). Returns the number actually read.
    pub fn read(&self, out: &mut [T]) -> usize {
        let avail = self.readable();
        let count = out.len().min(avail);
        let read = self.read_pos.load(Ordering::Relaxed);
        for (i, slot) in out[..count].iter_mut().enumerate() {
            let idx = read.wrapping_add(i) & self.mask;
            // SAFETY: published slots are not touched by producers until
            // read_pos passes them.
            *slot = unsafe { *self.buffer[idx].get() };
        }
        self.read_pos
            .store(read.wrapping_add(count), Ordering::Release);
        count
    }

    /// Zero-copy read views: the readable span as up to two contiguous
    /// slices (wrapping splits it). Call [`RingBuffer::read_advance`] after
    /// consuming. Single consumer only.
    pub fn read_vector(&self) -> (&[T], &[T]) {
        let avail = self.readable();
        let read = self.read_pos.load(Ordering::Relaxed);
        let start = read & self.mask;
        let first_len = avail.min(self.capacity() - start);

        // SAFETY: the published span is stable until read_advance, and only
        // the single consumer calls this.
        unsafe {
            let base = self.buffer.as_ptr() as *const T;
            let first = std::slice::from_raw_parts(base.add(start), first_len);
            let second = std::slice::from_raw_parts(base, avail - first_len);
            (first, second)
        }
    }

    /// Consume `count` items previously exposed by `read_vector`.
    pub fn read_advance(&self, count: usize) {
        let read = self.read_pos.load(Ordering::Relaxed);
        debug_assert!(count <= self.readable());
        self.read_pos
            .store(read.wrapping_add(count), Ordering::Release);
    }

    /// Drop everything readable.
    pub fn clear(&self) {
        let tail = self.write_tail.load(Ordering::Acquire);
        self.read_pos.store(tail, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_write_read_round_trip() {
        let ring: RingBuffer<f32> = RingBuffer::new(16);
        assert_eq!(ring.write(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(ring.readable(), 3);

        let mut out = [0.0f32; 3];
        assert_eq!(ring.read(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert_eq!(ring.readable(), 0);
    }

    #[test]
    fn test_wrap_around() {
        let ring: RingBuffer<u32> = RingBuffer::new(8);
        let mut out = [0u32; 8];

        for round in 0..10u32 {
            let data = [round * 3, round * 3 + 1, round * 3 + 2];
            assert_eq!(ring.write(&data), 3);
            assert_eq!(ring.read(&mut out[..3]), 3);
            assert_eq!(&out[..3], &data);
        }
    }

    #[test]
    fn test_full_ring_rejects() {
        let ring: RingBuffer<u8> = RingBuffer::new(4);
        assert_eq!(ring.write(&[1, 2, 3, 4]), 4);
        assert_eq!(ring.write(&[5]), 0);

        let mut out = [0u8; 2];
        ring.read(&mut out);
        assert_eq!(ring.write(&[5, 6, 7]), 2);
    }

    #[test]
    fn test_read_vector_split() {
        let ring: RingBuffer<u8> = RingBuffer::new(4);
        ring.write(&[1, 2, 3]);
        let mut out = [0u8; 2];
        ring.read(&mut out);
        // Write wraps: 4 goes to slot 3, 5 to slot 0.
        ring.write(&[4, 5]);

        let (first, second) = ring.read_vector();
        assert_eq!(first, &[3, 4]);
        assert_eq!(second, &[5]);
        ring.read_advance(3);
        assert_eq!(ring.readable(), 0);
    }

    #[test]
    fn test_concurrent_producers() {
        let ring: Arc<RingBuffer<u64>> = Arc::new(RingBuffer::new(1024));
        let mut handles = Vec::new();
        for t in 0..4u64 {
            let ring = Arc::clone(&ring);
            handles.push(std::thread::spawn(move || {
                for i in 0..100u64 {
                    let v = t * 1000 + i;
                    while ring.write(&[v]) == 0 {
                        std::thread::yield_now();
                    }
                }
            }));
        }

        let mut seen = Vec::new();
        while seen.len() < 400 {
            let mut out = [0u64; 32];
            let n = ring.read(&mut out);
            seen.extend_from_slice(&out[..n]);
            if n == 0 {
                std::thread::yield_now();
            }
        }
        for h in handles {
            h.join().unwrap();
        }

        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 400, "all writes must arrive exactly once");
    }
}
