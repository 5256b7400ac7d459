//! The read thread: demuxes the source into the per-stream packet queues.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::{Container, Packet, ReadOutcome, SeekRange};
use crate::error::SourceError;
use crate::presentation::QuitStatus;

use super::{AudioStream, SeekRequest, Shared, VideoStream};

/// How long the read thread sleeps when it has nothing to do.
const IDLE_WAIT: Duration = Duration::from_millis(10);

pub(super) fn run(shared: Arc<Shared>, mut container: Box<dyn Container>) {
    tracing::debug!("read thread started");
    let mut last_paused = false;

    loop {
        if shared.is_aborted() {
            break;
        }

        let paused = shared.is_paused();
        if paused != last_paused {
            last_paused = paused;
            container.set_paused(paused);
        }

        let pending = *shared.seek.lock();
        if let Some(request) = pending {
            let result = seek(&shared, container.as_mut(), request);
            *shared.seek.lock() = None;
            if let Err(e) = result {
                shared.quit(QuitStatus::Error {
                    code: e.code(),
                    message: e.to_string(),
                });
                break;
            }
        }

        let video = shared.video_stream();
        let audio = shared.audio_stream();

        if shared.queue_attachments.swap(false, Ordering::AcqRel) {
            if let Some(video) = video.as_ref().filter(|v| v.params().attached_pic) {
                queue_attached_picture(container.as_ref(), video);
            }
        }

        if !shared.source.infinite_buffer && buffers_full(&shared, audio.as_deref(), video.as_deref()) {
            wait(&shared);
            continue;
        }

        if shared.eof.load(Ordering::Acquire)
            && !paused
            && audio.as_deref().map_or(true, stream_drained)
            && video.as_deref().map_or(true, stream_drained)
            && shared.options.auto_exit
        {
            shared.quit(QuitStatus::EndOfStream);
            break;
        }

        match container.read_packet() {
            Ok(ReadOutcome::Packet(packet)) => {
                shared.eof.store(false, Ordering::Release);
                route_packet(&shared, audio.as_deref(), video.as_deref(), packet);
            }
            Ok(ReadOutcome::EndOfFile) | Err(SourceError::EndOfFile) => {
                if !shared.eof.swap(true, Ordering::AcqRel) {
                    tracing::debug!("end of source reached");
                    if let Some(video) = &video {
                        let _ = video.packets().put_end_of_stream();
                    }
                    if let Some(audio) = &audio {
                        let _ = audio.packets().put_end_of_stream();
                    }
                }
                wait(&shared);
            }
            Err(e) => {
                shared.quit(QuitStatus::Error {
                    code: e.code(),
                    message: e.to_string(),
                });
                break;
            }
        }
    }

    tracing::debug!("read thread exiting");
}

/// Performs a pending seek and starts a new epoch on every queue.
///
/// A container that cannot seek leaves the queues untouched and the error
/// is returned for the caller to end playback with.
pub(super) fn seek(
    shared: &Shared,
    container: &mut dyn Container,
    request: SeekRequest,
) -> Result<(), SourceError> {
    let SeekRequest {
        target,
        rel,
        by_bytes,
    } = request;
    // Allow the demuxer some slack on the side the seek came from.
    let min = if rel > 0 { target - rel + 2 } else { i64::MIN };
    let max = if rel < 0 { target - rel - 2 } else { i64::MAX };
    let range = SeekRange {
        target,
        min,
        max,
        by_bytes,
    };

    if let Err(e) = container.seek(range) {
        tracing::error!(target, by_bytes, "seek failed: {}", e);
        return Err(e);
    }

    if let Some(audio) = shared.audio_stream() {
        audio.packets().flush();
        let _ = audio.packets().put_flush_marker();
    }
    if let Some(video) = shared.video_stream() {
        video.packets().flush();
        let _ = video.packets().put_flush_marker();
    }
    if by_bytes {
        shared.external_clock.set(f64::NAN, 0);
    } else {
        shared.external_clock.set(target as f64 / 1_000_000.0, 0);
    }

    shared.queue_attachments.store(true, Ordering::Release);
    shared.eof.store(false, Ordering::Release);
    shared.metrics.reset_drift();
    tracing::info!(target, by_bytes, "seek complete");

    if shared.is_paused() {
        shared.step_to_next_frame();
    }
    Ok(())
}

fn queue_attached_picture(container: &dyn Container, video: &VideoStream) {
    match container.attached_picture(video.index()) {
        Some(packet) => {
            video.queue_packet(packet);
            let _ = video.packets().put_end_of_stream();
            tracing::debug!(index = video.index(), "queued attached picture");
        }
        None => tracing::warn!(index = video.index(), "cover art stream has no picture"),
    }
}

/// Whether reading should pause until the decoders catch up.
fn buffers_full(shared: &Shared, audio: Option<&AudioStream>, video: Option<&VideoStream>) -> bool {
    let bytes = audio.map_or(0, |a| a.packets().size()) + video.map_or(0, |v| v.packets().size());
    if bytes > shared.options.max_queue_size {
        return true;
    }
    let min_frames = shared.options.min_frames;
    audio.map_or(true, |a| a.has_enough_packets(min_frames))
        && video.map_or(true, |v| v.has_enough_packets(min_frames))
}

/// The decoder finished the current epoch and every frame was consumed.
fn stream_drained<T: crate::frame::QueuedFrame>(stream: &crate::stream::Stream<T>) -> bool {
    stream.status().finished_serial() == Some(stream.packets().serial())
        && stream.frames().nb_remaining() == 0
}

fn route_packet(
    shared: &Shared,
    audio: Option<&AudioStream>,
    video: Option<&VideoStream>,
    packet: Packet,
) {
    if let Some(pos) = packet.pos {
        shared.last_packet_pos.store(pos, Ordering::Release);
    }
    if let Some(audio) = audio.filter(|a| a.index() == packet.stream_index) {
        audio.queue_packet(packet);
    } else if let Some(video) = video
        .filter(|v| v.index() == packet.stream_index && !v.params().attached_pic)
    {
        video.queue_packet(packet);
    } else {
        tracing::trace!(stream = packet.stream_index, "discarding packet");
    }
}

fn wait(shared: &Shared) {
    let _ = shared.wake_rx.recv_timeout(IDLE_WAIT);
}
