//! Wait-free queue of whole scope frames between one producer and one consumer.
//!
//! The queue owns a fixed pool of frame slots. Two monotonically increasing
//! counters track how many frames were published and how many were consumed;
//! their difference is the number of readable slots. A slot is written only
//! while it lies outside that range and read only while it lies inside it, so
//! the producer and consumer never touch the same slot at the same time.

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const FRAME_ORDER: usize = 9;
/// Samples per frame.
pub const FRAME_SIZE: usize = 1 << FRAME_ORDER;
/// Slots in the default pool.
pub const FRAME_COUNT: usize = 5;

pub type Frame<T> = [T; FRAME_SIZE];

struct FrameQueue<T> {
    slots: Box<[UnsafeCell<Frame<T>>]>,
    written: AtomicUsize,
    read: AtomicUsize,
}

// SAFETY: slot access is partitioned by the `written`/`read` counters, and the
// producer/consumer handles are unique, so no slot is aliased mutably.
unsafe impl<T: Send> Sync for FrameQueue<T> {}

impl<T> FrameQueue<T> {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let written = self.written.load(Ordering::Acquire);
        written.wrapping_sub(read)
    }
}

/// Writing half, owned by the audio thread.
pub struct FrameProducer<T> {
    queue: Arc<FrameQueue<T>>,
}

/// Reading half, owned by the display.
pub struct FrameConsumer<T> {
    queue: Arc<FrameQueue<T>>,
}

/// Creates a queue with the default number of slots.
pub fn frame_queue<T: Copy + Default>() -> (FrameProducer<T>, FrameConsumer<T>) {
    frame_queue_with_capacity(FRAME_COUNT)
}

pub fn frame_queue_with_capacity<T: Copy + Default>(
    capacity: usize,
) -> (FrameProducer<T>, FrameConsumer<T>) {
    debug_assert!(capacity > 0, "frame queue needs at least one slot");
    let slots = (0..capacity.max(1))
        .map(|_| UnsafeCell::new([T::default(); FRAME_SIZE]))
        .collect();
    let queue = Arc::new(FrameQueue {
        slots,
        written: AtomicUsize::new(0),
        read: AtomicUsize::new(0),
    });
    (
        FrameProducer {
            queue: Arc::clone(&queue),
        },
        FrameConsumer { queue },
    )
}

impl<T: Copy + Default> FrameProducer<T> {
    /// Copies `frame` into a free slot and publishes it.
    ///
    /// Returns `false` without blocking when every slot is still unread; the
    /// frame is dropped in that case. Frames shorter than [`FRAME_SIZE`] are
    /// padded with `T::default()`.
    pub fn push(&mut self, frame: &[T]) -> bool {
        debug_assert!(frame.len() <= FRAME_SIZE, "frame exceeds slot size");
        let queue = &*self.queue;
        let written = queue.written.load(Ordering::Relaxed);
        let read = queue.read.load(Ordering::Acquire);
        // Free-running counters tell full from empty, so every slot is usable.
        if written.wrapping_sub(read) >= queue.capacity() {
            return false;
        }

        let index = written % queue.capacity();
        // SAFETY: `index` is outside the readable range until `written` is
        // bumped below, so the consumer cannot be reading it.
        let slot = unsafe { &mut *queue.slots[index].get() };
        let count = frame.len().min(FRAME_SIZE);
        slot[..count].copy_from_slice(&frame[..count]);
        slot[count..].fill(T::default());

        queue.written.store(written.wrapping_add(1), Ordering::Release);
        true
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl<T: Copy> FrameConsumer<T> {
    /// Copies the oldest published frame into `out` and frees its slot.
    ///
    /// Returns `false` and leaves `out` untouched when nothing is published.
    pub fn pop(&mut self, out: &mut Frame<T>) -> bool {
        let queue = &*self.queue;
        let read = queue.read.load(Ordering::Relaxed);
        let written = queue.written.load(Ordering::Acquire);
        if read == written {
            return false;
        }

        let index = read % queue.capacity();
        // SAFETY: `index` is inside the readable range, so the producer will
        // not write it until `read` is bumped below.
        let slot = unsafe { &*queue.slots[index].get() };
        out.copy_from_slice(slot);

        queue.read.store(read.wrapping_add(1), Ordering::Release);
        true
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    fn filled(value: f32) -> Vec<f32> {
        vec![value; FRAME_SIZE]
    }

    #[test]
    fn pop_on_empty_queue_leaves_buffer_alone() {
        let (_producer, mut consumer) = frame_queue::<f32>();
        let mut out = [7.0_f32; FRAME_SIZE];
        assert!(!consumer.pop(&mut out));
        assert!(out.iter().all(|&s| s == 7.0));
    }

    #[test]
    fn push_then_pop_is_bit_identical() {
        let (mut producer, mut consumer) = frame_queue::<f32>();
        let frame: Vec<f32> = (0..FRAME_SIZE)
            .map(|i| (i as f32 * 0.37).sin() * 1.5 - f32::EPSILON)
            .collect();
        assert!(producer.push(&frame));

        let mut out = [0.0_f32; FRAME_SIZE];
        assert!(consumer.pop(&mut out));
        assert!(
            frame
                .iter()
                .zip(out.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
        );
        assert!(consumer.is_empty());
    }

    #[test]
    fn pushes_beyond_capacity_are_dropped() {
        let (mut producer, mut consumer) = frame_queue::<f32>();
        let accepted = (0..FRAME_COUNT + 3)
            .filter(|&i| producer.push(&filled(i as f32)))
            .count();
        assert_eq!(accepted, FRAME_COUNT);
        assert_eq!(producer.len(), FRAME_COUNT);

        let mut out = [0.0_f32; FRAME_SIZE];
        for expected in 0..FRAME_COUNT {
            assert!(consumer.pop(&mut out));
            assert!(out.iter().all(|&s| s == expected as f32));
        }
        assert!(!consumer.pop(&mut out));
    }

    #[test]
    fn freed_slots_are_reused() {
        let (mut producer, mut consumer) = frame_queue_with_capacity::<f32>(2);
        let mut out = [0.0_f32; FRAME_SIZE];
        for round in 0..10 {
            assert!(producer.push(&filled(round as f32)));
            assert!(consumer.pop(&mut out));
            assert_eq!(out[FRAME_SIZE - 1], round as f32);
        }
    }

    #[test]
    fn short_frames_are_zero_padded() {
        let (mut producer, mut consumer) = frame_queue::<f32>();
        assert!(producer.push(&[1.0, 2.0, 3.0]));
        let mut out = [9.0_f32; FRAME_SIZE];
        assert!(consumer.pop(&mut out));
        assert_eq!(&out[..3], &[1.0, 2.0, 3.0]);
        assert!(out[3..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn concurrent_producer_and_consumer_never_tear_frames() {
        const FRAMES: usize = 20_000;
        let (mut producer, mut consumer) = frame_queue::<f32>();
        let done = Arc::new(AtomicBool::new(false));

        let writer_done = Arc::clone(&done);
        let writer = thread::spawn(move || {
            let mut frame = vec![0.0_f32; FRAME_SIZE];
            let mut accepted = 0usize;
            for sequence in 0..FRAMES {
                frame.fill(sequence as f32);
                if producer.push(&frame) {
                    accepted += 1;
                }
            }
            writer_done.store(true, Ordering::Release);
            accepted
        });

        let mut out = [0.0_f32; FRAME_SIZE];
        let mut received = 0usize;
        let mut last_sequence = -1.0_f32;
        loop {
            if consumer.pop(&mut out) {
                let sequence = out[0];
                assert!(out.iter().all(|&s| s == sequence), "torn frame");
                assert!(sequence > last_sequence, "frames out of order");
                last_sequence = sequence;
                received += 1;
            } else if done.load(Ordering::Acquire) && consumer.is_empty() {
                break;
            } else {
                thread::yield_now();
            }
        }

        let accepted = writer.join().expect("producer thread panicked");
        assert_eq!(received, accepted);
        assert!(received > 0);
    }
}
