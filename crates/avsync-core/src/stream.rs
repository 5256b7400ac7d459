//! An opened elementary stream.
//!
//! A [`Stream`] bundles everything created when the orchestrator opens one
//! stream of the source: its packet queue, frame ring, clock, decoder status
//! and decode thread. Streams are not reused: switching streams closes the old
//! one and opens a fresh one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::clock::{Clock, SharedTimeSource};
use crate::codec::{MediaKind, StreamParams};
use crate::decoder::DecoderStatus;
use crate::frame::QueuedFrame;
use crate::frame_queue::FrameQueue;
use crate::packet_queue::PacketQueue;

/// One opened stream and its pipeline.
pub struct Stream<T> {
    params: StreamParams,
    packets: Arc<PacketQueue>,
    frames: Arc<FrameQueue<T>>,
    clock: Arc<Clock>,
    status: Arc<DecoderStatus>,
    decode_thread: Mutex<Option<JoinHandle<()>>>,
    /// Set once the decode thread gave up on this stream.
    failed: AtomicBool,
    time: SharedTimeSource,
    opened_at: f64,
    bytes_received: AtomicU64,
}

impl<T: QueuedFrame> Stream<T> {
    /// Creates the queues and clock for `params` and starts the packet queue.
    pub fn new(
        params: StreamParams,
        frame_capacity: usize,
        keep_last: bool,
        status: Arc<DecoderStatus>,
        packets: Arc<PacketQueue>,
        time: SharedTimeSource,
    ) -> Self {
        let clock = Arc::new(Clock::with_queue_serial(
            Arc::clone(&time),
            packets.serial_handle(),
        ));
        let opened_at = time.now();
        Self {
            params,
            packets,
            frames: Arc::new(FrameQueue::new(frame_capacity, keep_last)),
            clock,
            status,
            decode_thread: Mutex::new(None),
            failed: AtomicBool::new(false),
            time,
            opened_at,
            bytes_received: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.params.kind
    }

    pub fn index(&self) -> usize {
        self.params.index
    }

    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    pub fn packets(&self) -> &Arc<PacketQueue> {
        &self.packets
    }

    pub fn frames(&self) -> &Arc<FrameQueue<T>> {
        &self.frames
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    pub fn status(&self) -> &Arc<DecoderStatus> {
        &self.status
    }

    /// Runs `body` on the stream's decode thread.
    pub fn spawn_decoder<B>(&self, name: &str, body: B) -> std::io::Result<()>
    where
        B: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(body)?;
        *self.decode_thread.lock() = Some(handle);
        Ok(())
    }

    /// Queues a packet read from the source and accounts for it.
    pub fn queue_packet(&self, packet: crate::codec::Packet) {
        let size = packet.size() as u64;
        if self.packets.put(packet).is_ok() {
            self.bytes_received.fetch_add(size, Ordering::Relaxed);
        }
    }

    /// Whether the stream has buffered enough to stop reading for now.
    ///
    /// Cover-art streams and aborted queues always have enough. Otherwise
    /// more than `min_frames` packets and more than a second of data.
    pub fn has_enough_packets(&self, min_frames: usize) -> bool {
        if self.params.attached_pic || self.packets.is_aborted() {
            return true;
        }
        let duration = self.packets.duration();
        self.packets.nb_packets() > min_frames
            && (duration == 0 || self.params.time_base.ticks_to_secs(duration) > 1.0)
    }

    /// Average received bytes per second since open.
    pub fn bandwidth(&self) -> f64 {
        let elapsed = self.time.now() - self.opened_at;
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.bytes_received.load(Ordering::Relaxed) as f64 / elapsed
    }

    /// Marks the stream as failed and stops its queues.
    pub fn fail(&self) {
        self.failed.store(true, Ordering::Release);
        self.abort();
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Wakes every thread blocked on this stream's queues.
    pub fn abort(&self) {
        self.packets.abort();
        self.frames.stop();
    }

    /// Aborts the queues and joins the decode thread.
    pub fn close(&self) {
        self.abort();
        let handle = self.decode_thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Closed from its own decode thread; it exits on return.
                return;
            }
            if handle.join().is_err() {
                tracing::error!("{} decode thread panicked", self.kind());
            }
        }
        self.packets.flush();
        tracing::debug!(kind = %self.kind(), index = self.index(), "stream closed");
    }
}

impl<T> Drop for Stream<T> {
    fn drop(&mut self) {
        self.packets.abort();
        if let Some(handle) = self.decode_thread.get_mut().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::clock::ManualTime;
    use crate::codec::{Packet, Rational};
    use crate::frame::VideoFrame;

    fn stream(time: SharedTimeSource, attached_pic: bool) -> Stream<VideoFrame> {
        let mut params = StreamParams::video(0, Rational::new(1, 25), 16, 16, Rational::new(25, 1));
        params.attached_pic = attached_pic;
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        Stream::new(params, 3, true, Arc::new(DecoderStatus::new()), packets, time)
    }

    fn packet(pts: i64) -> Packet {
        Packet {
            stream_index: 0,
            pts: Some(pts),
            dts: Some(pts),
            duration: 1,
            pos: None,
            key: true,
            data: Bytes::from(vec![0u8; 100]),
        }
    }

    #[test]
    fn test_has_enough_packets() {
        let time: SharedTimeSource = ManualTime::shared(0.0);
        let s = stream(Arc::clone(&time), false);
        for i in 0..25 {
            s.queue_packet(packet(i));
        }
        // 26 entries (opening marker included) but only one second buffered.
        assert!(!s.has_enough_packets(25));
        s.queue_packet(packet(25));
        assert!(s.has_enough_packets(25));

        let cover = stream(time, true);
        assert!(cover.has_enough_packets(25));
    }

    #[test]
    fn test_bandwidth_and_clock_binding() {
        let manual = ManualTime::shared(10.0);
        let time: SharedTimeSource = manual.clone();
        let s = stream(time, false);
        s.queue_packet(packet(0));
        manual.advance(std::time::Duration::from_secs(2));
        assert!((s.bandwidth() - 50.0).abs() < 1e-9);

        s.clock().set(1.0, s.packets().serial());
        assert!(s.clock().get().is_some());
        s.packets().put_flush_marker().unwrap();
        assert!(s.clock().get().is_none());
    }

    #[test]
    fn test_close_aborts_queues() {
        let time: SharedTimeSource = ManualTime::shared(0.0);
        let s = stream(time, false);
        let packets = Arc::clone(s.packets());
        s.spawn_decoder("test-decoder", move || {
            while packets.get(true).is_ok() {}
        })
        .unwrap();
        s.close();
        assert!(s.packets().is_aborted());
        assert!(s.frames().is_stopped());
    }
}
