//! Publish-side packet pump.
//!
//! Encoders push FLV tag bodies from their own threads; a dedicated sender
//! thread rebases timestamps and writes them to the session in order. When
//! the network falls behind, queued non-key video frames are discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::flv::FlvMetadata;
use crate::message::type_ids;
use crate::session::RtmpSession;

/// Destination for packets leaving the pusher.
#[cfg_attr(test, mockall::automock)]
pub trait PacketSink: Send + 'static {
    /// Write one message. `message_type` is the RTMP type ID.
    fn write_packet(&mut self, payload: &[u8], message_type: u8, timestamp: u32) -> Result<()>;
}

impl PacketSink for Arc<RtmpSession> {
    fn write_packet(&mut self, payload: &[u8], message_type: u8, timestamp: u32) -> Result<()> {
        self.write(payload, message_type, timestamp).map(|_| ())
    }
}

/// Kind of a queued packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Audio,
    Video,
    Metadata,
}

impl PacketKind {
    fn type_id(&self) -> u8 {
        match self {
            PacketKind::Audio => type_ids::AUDIO,
            PacketKind::Video => type_ids::VIDEO,
            PacketKind::Metadata => type_ids::DATA_AMF0,
        }
    }
}

/// An FLV tag body waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlvPacket {
    pub kind: PacketKind,
    pub data: Vec<u8>,
    /// Presentation time in milliseconds, on the encoder's clock.
    pub pts_ms: u64,
    /// May be discarded under backpressure (non-key video frames).
    pub droppable: bool,
}

impl FlvPacket {
    pub fn audio(data: Vec<u8>, pts_ms: u64) -> Self {
        Self {
            kind: PacketKind::Audio,
            data,
            pts_ms,
            droppable: false,
        }
    }

    /// Video packet; non-key frames are droppable.
    pub fn video(data: Vec<u8>, pts_ms: u64, keyframe: bool) -> Self {
        Self {
            kind: PacketKind::Video,
            data,
            pts_ms,
            droppable: !keyframe,
        }
    }

    pub fn metadata(data: Vec<u8>) -> Self {
        Self {
            kind: PacketKind::Metadata,
            data,
            pts_ms: 0,
            droppable: false,
        }
    }
}

/// Pusher tunables.
#[derive(Debug, Clone)]
pub struct PusherConfig {
    /// Queued video packets above which droppable frames are discarded.
    pub max_queued_video: usize,
    /// Sent before any media when set.
    pub metadata: Option<FlvMetadata>,
    /// Wrap metadata in `@setDataFrame`.
    pub set_data_frame: bool,
    /// How often the sender thread re-checks the stop flag while idle.
    pub idle_poll: Duration,
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            max_queued_video: 100,
            metadata: None,
            set_data_frame: false,
            idle_poll: Duration::from_millis(50),
        }
    }
}

impl PusherConfig {
    pub fn with_max_queued_video(mut self, max: usize) -> Self {
        self.max_queued_video = max;
        self
    }

    pub fn with_metadata(mut self, metadata: FlvMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_set_data_frame(mut self, enabled: bool) -> Self {
        self.set_data_frame = enabled;
        self
    }
}

/// Called with the consecutive failure count after each failed write.
pub type ErrorCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Counters exposed for monitoring.
#[derive(Debug, Default)]
pub struct PusherStats {
    pub sent: AtomicU64,
    pub dropped: AtomicU64,
    pub consecutive_errors: AtomicU32,
}

#[derive(Default)]
struct PacketQueue {
    packets: Mutex<VecDeque<FlvPacket>>,
    ready: Condvar,
}

/// Queue plus sender thread.
pub struct RtmpPusher {
    config: PusherConfig,
    queue: Arc<PacketQueue>,
    running: Arc<AtomicBool>,
    stats: Arc<PusherStats>,
    on_error: Option<ErrorCallback>,
    thread_handle: Option<JoinHandle<()>>,
}

impl RtmpPusher {
    pub fn new(config: PusherConfig) -> Self {
        Self {
            config,
            queue: Arc::new(PacketQueue::default()),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(PusherStats::default()),
            on_error: None,
            thread_handle: None,
        }
    }

    pub fn with_error_callback(mut self, callback: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Start the sender thread writing into `sink`.
    pub fn start<S: PacketSink>(&mut self, sink: S) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Pusher already running");
            return Ok(());
        }

        let queue = self.queue.clone();
        let running = self.running.clone();
        let stats = self.stats.clone();
        let on_error = self.on_error.clone();
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("rtmp-pusher".to_string())
            .spawn(move || sender_thread(sink, config, queue, running, stats, on_error));
        match handle {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                info!("RTMP pusher started");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Queue a packet. Under video backpressure droppable frames are discarded.
    pub fn push(&self, packet: FlvPacket) {
        let mut packets = self.queue.packets.lock();
        if packet.kind == PacketKind::Video {
            let queued_video = packets
                .iter()
                .filter(|p| p.kind == PacketKind::Video)
                .count();
            if queued_video > self.config.max_queued_video {
                let before = packets.len();
                packets.retain(|p| !(p.kind == PacketKind::Video && p.droppable));
                let dropped = before - packets.len();
                self.stats.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
                warn!(dropped, queued_video, "Video queue over limit, dropped frames");
            }
        }
        packets.push_back(packet);
        drop(packets);
        self.queue.ready.notify_one();
    }

    /// Packets waiting to be sent.
    pub fn queued(&self) -> usize {
        self.queue.packets.lock().len()
    }

    pub fn stats(&self) -> &PusherStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the sender thread, discard queued packets and reset counters.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.queue.ready.notify_all();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("RTMP pusher thread panicked");
            }
            info!("RTMP pusher stopped");
        }
        self.queue.packets.lock().clear();
        self.stats.sent.store(0, Ordering::Relaxed);
        self.stats.dropped.store(0, Ordering::Relaxed);
        self.stats.consecutive_errors.store(0, Ordering::Relaxed);
    }
}

impl Drop for RtmpPusher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Rebases each media type to its first presentation time.
#[derive(Debug, Default)]
struct TimestampRebaser {
    first_audio: Option<u64>,
    first_video: Option<u64>,
}

impl TimestampRebaser {
    fn rebase(&mut self, kind: PacketKind, pts_ms: u64) -> u32 {
        let first = match kind {
            PacketKind::Audio => self.first_audio.get_or_insert(pts_ms),
            PacketKind::Video => self.first_video.get_or_insert(pts_ms),
            PacketKind::Metadata => return 0,
        };
        pts_ms.saturating_sub(*first) as u32
    }
}

fn sender_thread<S: PacketSink>(
    mut sink: S,
    config: PusherConfig,
    queue: Arc<PacketQueue>,
    running: Arc<AtomicBool>,
    stats: Arc<PusherStats>,
    on_error: Option<ErrorCallback>,
) {
    let mut rebaser = TimestampRebaser::default();

    let send = |sink: &mut S, payload: &[u8], type_id: u8, timestamp: u32| {
        match sink.write_packet(payload, type_id, timestamp) {
            Ok(()) => {
                stats.sent.fetch_add(1, Ordering::Relaxed);
                stats.consecutive_errors.store(0, Ordering::Relaxed);
            }
            Err(e) => {
                let count = stats.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(error = %e, count, "Failed to send packet");
                if let Some(callback) = &on_error {
                    callback(count);
                }
            }
        }
    };

    if let Some(metadata) = &config.metadata {
        let payload = metadata.encode(config.set_data_frame);
        debug!(len = payload.len(), "Sending metadata");
        send(&mut sink, &payload, type_ids::DATA_AMF0, 0);
    }

    while running.load(Ordering::Acquire) {
        let packet = {
            let mut packets = queue.packets.lock();
            if packets.is_empty() {
                queue.ready.wait_for(&mut packets, config.idle_poll);
            }
            packets.pop_front()
        };
        let Some(packet) = packet else {
            continue;
        };
        let timestamp = rebaser.rebase(packet.kind, packet.pts_ms);
        send(&mut sink, &packet.data, packet.kind.type_id(), timestamp);
    }
    debug!("Pusher thread exiting");
}
