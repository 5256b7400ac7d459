//! Bounded-by-policy FIFO of compressed packets for one stream.
//!
//! The queue itself never rejects a packet for being full; the read thread
//! throttles itself by looking at [`PacketQueue::size`] and friends. Every
//! entry is tagged with the serial (epoch) it was queued under. A flush
//! marker starts a new epoch, which lets decoders and clocks recognise and
//! discard data from before a seek.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::codec::Packet;
use crate::error::QueueAborted;

/// What a queue slot carries.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketEntry {
    /// A compressed packet.
    Data(Packet),
    /// Start of a new epoch; decoders flush their codec.
    Flush,
    /// End-of-stream sentinel; decoders drain their codec.
    EndOfStream,
}

/// A queue entry and the serial it was queued under.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedPacket {
    pub entry: PacketEntry,
    pub serial: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<QueuedPacket>,
    /// Sum of payload bytes.
    size: usize,
    /// Sum of packet durations, in stream ticks.
    duration: i64,
    aborted: bool,
}

/// Thread-safe packet FIFO with epoch tagging.
#[derive(Debug)]
pub struct PacketQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    /// Mirrors the current serial so clocks can read it without the lock.
    serial: Arc<AtomicU64>,
}

impl PacketQueue {
    /// Creates an aborted, empty queue. Call [`PacketQueue::start`] before use.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                aborted: true,
                ..QueueState::default()
            }),
            available: Condvar::new(),
            serial: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Clears the abort flag and opens the first epoch.
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.aborted = false;
        self.push_locked(&mut state, PacketEntry::Flush);
    }

    fn push_locked(&self, state: &mut QueueState, entry: PacketEntry) {
        let serial = if matches!(entry, PacketEntry::Flush) {
            self.serial.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.serial.load(Ordering::Acquire)
        };
        if let PacketEntry::Data(packet) = &entry {
            state.size += packet.size();
            state.duration += packet.duration.max(0);
        }
        state.entries.push_back(QueuedPacket { entry, serial });
        self.available.notify_one();
    }

    fn put_entry(&self, entry: PacketEntry) -> Result<(), QueueAborted> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(QueueAborted);
        }
        self.push_locked(&mut state, entry);
        Ok(())
    }

    /// Appends a packet under the current serial.
    pub fn put(&self, packet: Packet) -> Result<(), QueueAborted> {
        self.put_entry(PacketEntry::Data(packet))
    }

    /// Starts a new epoch: bumps the serial and queues a flush marker.
    pub fn put_flush_marker(&self) -> Result<(), QueueAborted> {
        self.put_entry(PacketEntry::Flush)
    }

    /// Queues the end-of-stream sentinel.
    pub fn put_end_of_stream(&self) -> Result<(), QueueAborted> {
        self.put_entry(PacketEntry::EndOfStream)
    }

    /// Removes the oldest entry.
    ///
    /// With `block` set, waits until an entry arrives or the queue is aborted.
    /// Without it, returns `Ok(None)` when the queue is empty.
    pub fn get(&self, block: bool) -> Result<Option<QueuedPacket>, QueueAborted> {
        let mut state = self.state.lock();
        loop {
            if state.aborted {
                return Err(QueueAborted);
            }
            if let Some(queued) = state.entries.pop_front() {
                if let PacketEntry::Data(packet) = &queued.entry {
                    state.size -= packet.size();
                    state.duration -= packet.duration.max(0);
                }
                return Ok(Some(queued));
            }
            if !block {
                return Ok(None);
            }
            self.available.wait(&mut state);
        }
    }

    /// Aborts the queue and wakes every waiter. Permanent until `start`.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        self.available.notify_all();
    }

    /// Drops every queued entry. The serial is left untouched.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        state.size = 0;
        state.duration = 0;
        tracing::trace!(dropped, "packet queue flushed");
    }

    /// Number of queued entries, markers included.
    pub fn nb_packets(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Queued payload bytes.
    pub fn size(&self) -> usize {
        self.state.lock().size
    }

    /// Queued duration in stream ticks.
    pub fn duration(&self) -> i64 {
        self.state.lock().duration
    }

    /// Current serial.
    pub fn serial(&self) -> u64 {
        self.serial.load(Ordering::Acquire)
    }

    /// Shared handle to the serial, for clocks bound to this queue.
    pub fn serial_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.serial)
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;

    fn packet(pts: i64, len: usize) -> Packet {
        Packet {
            stream_index: 0,
            pts: Some(pts),
            dts: Some(pts),
            duration: 10,
            pos: None,
            key: true,
            data: Bytes::from(vec![0u8; len]),
        }
    }

    fn started() -> PacketQueue {
        let queue = PacketQueue::new();
        queue.start();
        // Consume the opening flush marker.
        let first = queue.get(false).unwrap().unwrap();
        assert_eq!(first.entry, PacketEntry::Flush);
        queue
    }

    #[test]
    fn test_new_queue_is_aborted_until_started() {
        let queue = PacketQueue::new();
        assert!(queue.is_aborted());
        assert_eq!(queue.put(packet(0, 1)), Err(QueueAborted));
        queue.start();
        assert!(!queue.is_aborted());
        assert_eq!(queue.serial(), 1);
    }

    #[test]
    fn test_fifo_and_accounting() {
        let queue = started();
        queue.put(packet(1, 100)).unwrap();
        queue.put(packet(2, 50)).unwrap();
        assert_eq!(queue.nb_packets(), 2);
        assert_eq!(queue.size(), 150);
        assert_eq!(queue.duration(), 20);

        let Some(QueuedPacket {
            entry: PacketEntry::Data(first),
            ..
        }) = queue.get(false).unwrap()
        else {
            panic!("expected data packet");
        };
        assert_eq!(first.pts, Some(1));
        assert_eq!(queue.size(), 50);
        assert_eq!(queue.duration(), 10);
    }

    #[test]
    fn test_flush_marker_bumps_serial() {
        let queue = started();
        queue.put(packet(1, 1)).unwrap();
        queue.put_flush_marker().unwrap();
        queue.put(packet(2, 1)).unwrap();

        let old = queue.get(false).unwrap().unwrap();
        let marker = queue.get(false).unwrap().unwrap();
        let new = queue.get(false).unwrap().unwrap();
        assert_eq!(old.serial, 1);
        assert_eq!(marker.entry, PacketEntry::Flush);
        assert_eq!(marker.serial, 2);
        assert_eq!(new.serial, 2);
        assert_eq!(queue.serial(), 2);
    }

    #[test]
    fn test_non_blocking_get_on_empty() {
        let queue = started();
        assert_eq!(queue.get(false), Ok(None));
    }

    #[test]
    fn test_abort_wakes_blocked_reader() {
        let queue = Arc::new(started());
        let reader = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.get(true))
        };
        thread::sleep(Duration::from_millis(20));
        queue.abort();
        assert_eq!(reader.join().unwrap(), Err(QueueAborted));
        assert_eq!(queue.put(packet(0, 1)), Err(QueueAborted));
        assert_eq!(queue.get(false), Err(QueueAborted));
    }

    #[test]
    fn test_blocking_get_receives_later_put() {
        let queue = Arc::new(started());
        let reader = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.get(true))
        };
        thread::sleep(Duration::from_millis(10));
        queue.put_end_of_stream().unwrap();
        let got = reader.join().unwrap().unwrap().unwrap();
        assert_eq!(got.entry, PacketEntry::EndOfStream);
    }

    #[test]
    fn test_flush_clears_without_new_epoch() {
        let queue = started();
        queue.put(packet(1, 10)).unwrap();
        queue.flush();
        assert_eq!(queue.nb_packets(), 0);
        assert_eq!(queue.size(), 0);
        assert_eq!(queue.duration(), 0);
        assert_eq!(queue.serial(), 1);
    }
}
