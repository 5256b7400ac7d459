//! Per-stream decode loop.
//!
//! A [`Decoder`] pulls entries from its stream's [`PacketQueue`], feeds the
//! codec and hands back timed frames. It follows the queue's epochs:
//!
//! - entries tagged with an older serial than the queue's current one are
//!   skipped without reaching the codec;
//! - a flush marker flushes the codec and resets timestamp extrapolation;
//! - the end-of-stream sentinel drains the codec, after which the decoder
//!   reports [`DecodeOutput::Finished`] for that epoch.
//!
//! Frames without a timestamp get one extrapolated from the previous frame's
//! timestamp plus its duration.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{CodecEngine, CodecFrame, MediaKind, Rational};
use crate::error::{PlaybackError, Result};
use crate::packet_queue::{PacketEntry, PacketQueue};

/// Lifecycle of a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Idle,
    Decoding,
    Finished,
    Aborted,
}

/// Decoder state shared with the read thread.
#[derive(Debug)]
pub struct DecoderStatus {
    inner: Mutex<(DecoderState, Option<u64>)>,
}

impl DecoderStatus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new((DecoderState::Idle, None)),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.inner.lock().0
    }

    /// Epoch in which the decoder last finished, if any.
    pub fn finished_serial(&self) -> Option<u64> {
        self.inner.lock().1
    }

    fn set_decoding(&self) {
        *self.inner.lock() = (DecoderState::Decoding, None);
    }

    fn set_finished(&self, serial: u64) {
        *self.inner.lock() = (DecoderState::Finished, Some(serial));
    }

    fn set_aborted(&self) {
        self.inner.lock().0 = DecoderState::Aborted;
    }
}

impl Default for DecoderStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Codec output stamped with engine timing.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame<F> {
    pub frame: F,
    /// Presentation time in seconds.
    pub pts: Option<f64>,
    /// Duration in seconds.
    pub duration: f64,
    pub pos: Option<i64>,
    /// Epoch of the packet that produced the frame.
    pub serial: u64,
}

/// What [`Decoder::decode_next`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutput<F> {
    Frame(DecodedFrame<F>),
    /// Codec drained after end of stream; no more frames for this epoch.
    Finished,
}

/// Drives one codec from one packet queue.
pub struct Decoder<F> {
    kind: MediaKind,
    codec: Box<dyn CodecEngine<F>>,
    queue: Arc<PacketQueue>,
    time_base: Rational,
    /// Used when neither the frame nor the extrapolator knows a duration.
    fallback_duration: f64,
    pending: VecDeque<F>,
    pkt_serial: u64,
    next_pts: Option<f64>,
    drained: bool,
    status: Arc<DecoderStatus>,
    /// Nudges the read thread when the queue runs dry.
    empty_queue_signal: Option<crossbeam_channel::Sender<()>>,
}

impl<F: CodecFrame> Decoder<F> {
    pub fn new(
        kind: MediaKind,
        codec: Box<dyn CodecEngine<F>>,
        queue: Arc<PacketQueue>,
        time_base: Rational,
        fallback_duration: f64,
    ) -> Self {
        Self {
            kind,
            codec,
            queue,
            time_base,
            fallback_duration,
            pending: VecDeque::new(),
            pkt_serial: 0,
            next_pts: None,
            drained: false,
            status: Arc::new(DecoderStatus::new()),
            empty_queue_signal: None,
        }
    }

    /// Sends a wake-up on `signal` whenever the packet queue is empty.
    pub fn with_empty_queue_signal(mut self, signal: crossbeam_channel::Sender<()>) -> Self {
        self.empty_queue_signal = Some(signal);
        self
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn status(&self) -> Arc<DecoderStatus> {
        Arc::clone(&self.status)
    }

    /// Serial of the last packet taken from the queue.
    pub fn pkt_serial(&self) -> u64 {
        self.pkt_serial
    }

    /// Returns the next frame or the end of the current epoch.
    ///
    /// Blocks on the packet queue. Fails with `QueueAborted` when the queue
    /// is aborted and with a decode error when the codec rejects data.
    pub fn decode_next(&mut self) -> Result<DecodeOutput<F>> {
        if self.status.state() == DecoderState::Idle {
            self.status.set_decoding();
        }

        loop {
            if self.queue.serial() == self.pkt_serial {
                if let Some(frame) = self.pending.pop_front() {
                    return Ok(DecodeOutput::Frame(self.stamp(frame)));
                }
                if self.drained {
                    self.drained = false;
                    self.status.set_finished(self.pkt_serial);
                    tracing::debug!(kind = %self.kind, serial = self.pkt_serial, "decoder finished");
                    return Ok(DecodeOutput::Finished);
                }
            } else {
                self.pending.clear();
                self.drained = false;
            }

            let queued = loop {
                if self.queue.nb_packets() == 0 {
                    if let Some(signal) = &self.empty_queue_signal {
                        let _ = signal.try_send(());
                    }
                }
                let queued = match self.queue.get(true) {
                    Ok(Some(queued)) => queued,
                    Ok(None) => continue,
                    Err(aborted) => {
                        self.status.set_aborted();
                        return Err(aborted.into());
                    }
                };
                if queued.serial != self.pkt_serial {
                    self.reset_epoch();
                    self.pkt_serial = queued.serial;
                }
                if queued.serial == self.queue.serial() {
                    break queued;
                }
                tracing::trace!(kind = %self.kind, serial = queued.serial, "skipping stale packet");
            };

            match queued.entry {
                PacketEntry::Flush => {
                    self.codec.flush();
                    self.reset_epoch();
                    self.status.set_decoding();
                    tracing::debug!(kind = %self.kind, serial = self.pkt_serial, "decoder flushed");
                }
                PacketEntry::EndOfStream => {
                    let frames = self.codec.drain().map_err(|source| self.decode_error(source))?;
                    self.pending.extend(frames);
                    self.drained = true;
                }
                PacketEntry::Data(packet) => {
                    let frames = self
                        .codec
                        .decode(&packet)
                        .map_err(|source| self.decode_error(source))?;
                    self.pending.extend(frames);
                }
            }
        }
    }

    fn reset_epoch(&mut self) {
        self.pending.clear();
        self.next_pts = None;
        self.drained = false;
    }

    fn decode_error(&self, source: crate::error::CodecError) -> PlaybackError {
        PlaybackError::Decode {
            kind: self.kind,
            source,
        }
    }

    fn stamp(&mut self, frame: F) -> DecodedFrame<F> {
        let pts = frame
            .pts()
            .map(|ticks| self.time_base.ticks_to_secs(ticks))
            .or(self.next_pts);
        let duration = frame
            .duration(self.time_base)
            .unwrap_or(self.fallback_duration);
        if let Some(pts) = pts {
            self.next_pts = Some(pts + duration);
        }
        DecodedFrame {
            pos: frame.pos(),
            frame,
            pts,
            duration,
            serial: self.pkt_serial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Packet;
    use crate::error::{CodecError, QueueAborted};
    use bytes::Bytes;

    #[derive(Debug, Clone, PartialEq)]
    struct Unit {
        pts: Option<i64>,
    }

    impl CodecFrame for Unit {
        fn pts(&self) -> Option<i64> {
            self.pts
        }
        fn pos(&self) -> Option<i64> {
            None
        }
        fn duration(&self, _time_base: Rational) -> Option<f64> {
            None
        }
    }

    /// One frame per packet, one extra frame on drain; fails on empty payloads.
    #[derive(Default)]
    struct EchoCodec {
        held: Option<Unit>,
        flushes: Arc<Mutex<usize>>,
    }

    impl CodecEngine<Unit> for EchoCodec {
        fn decode(&mut self, packet: &Packet) -> std::result::Result<Vec<Unit>, CodecError> {
            if packet.data.is_empty() {
                return Err(CodecError::Decode("empty packet".to_string()));
            }
            let out = self.held.take().into_iter().collect();
            self.held = Some(Unit { pts: packet.pts });
            Ok(out)
        }

        fn drain(&mut self) -> std::result::Result<Vec<Unit>, CodecError> {
            Ok(self.held.take().into_iter().collect())
        }

        fn flush(&mut self) {
            self.held = None;
            *self.flushes.lock() += 1;
        }
    }

    fn packet(pts: Option<i64>) -> Packet {
        Packet {
            stream_index: 0,
            pts,
            dts: pts,
            duration: 1,
            pos: None,
            key: true,
            data: Bytes::from_static(b"x"),
        }
    }

    fn decoder(queue: &Arc<PacketQueue>) -> (Decoder<Unit>, Arc<Mutex<usize>>) {
        let codec = EchoCodec::default();
        let flushes = Arc::clone(&codec.flushes);
        let decoder = Decoder::new(
            MediaKind::Video,
            Box::new(codec),
            Arc::clone(queue),
            Rational::new(1, 25),
            0.04,
        );
        (decoder, flushes)
    }

    fn expect_frame(out: Result<DecodeOutput<Unit>>) -> DecodedFrame<Unit> {
        match out {
            Ok(DecodeOutput::Frame(frame)) => frame,
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_drain_and_finish() {
        let queue = Arc::new(PacketQueue::new());
        queue.start();
        let (mut decoder, flushes) = decoder(&queue);
        queue.put(packet(Some(0))).unwrap();
        queue.put(packet(Some(1))).unwrap();
        queue.put_end_of_stream().unwrap();

        let first = expect_frame(decoder.decode_next());
        assert_eq!(first.pts, Some(0.0));
        assert_eq!(first.serial, 1);
        let second = expect_frame(decoder.decode_next());
        assert!((second.pts.unwrap() - 0.04).abs() < 1e-9);
        assert_eq!(decoder.decode_next().unwrap(), DecodeOutput::Finished);
        assert_eq!(decoder.status().state(), DecoderState::Finished);
        assert_eq!(decoder.status().finished_serial(), Some(1));
        // Opening flush marker reached the codec.
        assert_eq!(*flushes.lock(), 1);
    }

    #[test]
    fn test_missing_pts_is_extrapolated() {
        let queue = Arc::new(PacketQueue::new());
        queue.start();
        let (mut decoder, _) = decoder(&queue);
        queue.put(packet(Some(10))).unwrap();
        queue.put(packet(None)).unwrap();
        queue.put(packet(None)).unwrap();
        queue.put_end_of_stream().unwrap();

        let a = expect_frame(decoder.decode_next());
        let b = expect_frame(decoder.decode_next());
        let c = expect_frame(decoder.decode_next());
        assert!((a.pts.unwrap() - 0.40).abs() < 1e-9);
        assert!((b.pts.unwrap() - 0.44).abs() < 1e-9);
        assert!((c.pts.unwrap() - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_stale_packets_are_skipped_after_flush() {
        let queue = Arc::new(PacketQueue::new());
        queue.start();
        let (mut decoder, flushes) = decoder(&queue);
        queue.put(packet(Some(1))).unwrap();
        queue.put(packet(Some(2))).unwrap();
        queue.put_flush_marker().unwrap();
        queue.put(packet(Some(100))).unwrap();
        queue.put_end_of_stream().unwrap();

        let frame = expect_frame(decoder.decode_next());
        assert_eq!(frame.pts, Some(4.0));
        assert_eq!(frame.serial, 2);
        assert_eq!(decoder.pkt_serial(), 2);
        // The first epoch's marker was stale by the time it was read.
        assert_eq!(*flushes.lock(), 1);
    }

    #[test]
    fn test_codec_error_and_abort() {
        let queue = Arc::new(PacketQueue::new());
        queue.start();
        let (mut decoder, _) = decoder(&queue);
        let mut bad = packet(Some(0));
        bad.data = Bytes::new();
        queue.put(bad).unwrap();
        let err = decoder.decode_next().unwrap_err();
        assert!(matches!(err, PlaybackError::Decode { kind: MediaKind::Video, .. }));

        queue.abort();
        assert_eq!(
            decoder.decode_next().unwrap_err(),
            PlaybackError::QueueAborted(QueueAborted)
        );
        assert_eq!(decoder.status().state(), DecoderState::Aborted);
    }
}
