//! RTMP session: connection setup, receive thread, and the read/write/close
//! surface used by publishers and players.

use std::io::Write;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::amf0::AmfValue;
use crate::chunk::{ChunkReader, ChunkWriter, MAX_MESSAGE_LEN};
use crate::command::{self, Command, Response, StatusInfo};
use crate::config::{ReadFormat, SessionConfig};
use crate::error::{Result, RtmpError};
use crate::flv::{self, FlvTag};
use crate::handshake;
use crate::message::{MessageType, RtmpMessage, UserControlEvent};
use crate::url::RtmpUrl;

/// Direction of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Upload: `write` sends media.
    Publish,
    /// Download: `read` returns media.
    Play,
}

impl SessionMode {
    pub fn from_publish_flag(is_publish: bool) -> Self {
        if is_publish {
            SessionMode::Publish
        } else {
            SessionMode::Play
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SessionMode::Publish => "publish",
            SessionMode::Play => "play",
        }
    }
}

/// Session lifecycle.
///
/// States only move forward: `Disconnected` until the TCP connection is up,
/// `Handshaking` through the handshake and command exchange, `Connected`
/// once the stream is publishing or playing, and finally `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Disconnected = 0,
    Handshaking = 1,
    Connected = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Disconnected,
            1 => SessionState::Handshaking,
            2 => SessionState::Connected,
            _ => SessionState::Closed,
        }
    }
}

/// Upper bound on the `FCUnpublish` / `deleteStream` writes in `close`.
const GOODBYE_TIMEOUT: Duration = Duration::from_millis(500);

/// Chunk writer plus the socket it writes to.
struct SendPath {
    writer: ChunkWriter,
    stream: TcpStream,
    buf: Vec<u8>,
    next_transaction_id: f64,
}

impl SendPath {
    fn send(&mut self, message: &RtmpMessage) -> Result<()> {
        self.send_parts(
            message.message_type,
            message.timestamp,
            message.stream_id,
            &message.payload,
        )
    }

    fn send_parts(
        &mut self,
        message_type: MessageType,
        timestamp: u32,
        stream_id: u32,
        payload: &[u8],
    ) -> Result<()> {
        self.buf.clear();
        self.writer.encode_parts(
            message_type,
            timestamp,
            stream_id,
            payload,
            message_type.outgoing_chunk_stream(),
            &mut self.buf,
        );
        self.stream.write_all(&self.buf)?;
        Ok(())
    }

    fn send_command(&mut self, command: &Command, stream_id: u32) -> Result<()> {
        debug!(
            name = %command.name,
            transaction_id = command.transaction_id,
            stream_id,
            "RTMP -> command"
        );
        let payload = command.encode();
        self.send_parts(MessageType::CommandAmf0, 0, stream_id, &payload)
    }

    fn next_transaction_id(&mut self) -> f64 {
        self.next_transaction_id += 1.0;
        self.next_transaction_id
    }
}

/// State shared between the caller-facing session and its receive thread.
struct Shared {
    send: Mutex<SendPath>,
    state: AtomicU8,
    closed: AtomicBool,
    fatal: Mutex<Option<String>>,
    /// Server signalled StreamEOF or closed the connection.
    peer_eof: AtomicBool,
}

impl Shared {
    fn new(stream: TcpStream, chunk_size: u32) -> Self {
        Self {
            send: Mutex::new(SendPath {
                writer: ChunkWriter::new(),
                stream,
                buf: Vec::with_capacity(chunk_size as usize + 64),
                next_transaction_id: 0.0,
            }),
            state: AtomicU8::new(SessionState::Disconnected as u8),
            closed: AtomicBool::new(false),
            fatal: Mutex::new(None),
            peer_eof: AtomicBool::new(false),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Advance to `state`; a later state is never overwritten by an earlier one.
    fn set_state(&self, state: SessionState) {
        let previous = SessionState::from_u8(self.state.fetch_max(state as u8, Ordering::AcqRel));
        if previous < state {
            debug!(from = ?previous, to = ?state, "RTMP session state");
        }
    }

    fn mark_fatal(&self, reason: String) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            error!(reason = %reason, "RTMP session failed");
            *fatal = Some(reason);
        }
        self.set_state(SessionState::Closed);
    }

    fn fatal_reason(&self) -> Option<String> {
        self.fatal.lock().clone()
    }
}

/// Payload being handed out across several `read` calls.
#[derive(Default)]
struct ReadPath {
    pending: Vec<u8>,
    offset: usize,
    flv_header_sent: bool,
}

/// An open RTMP connection in publish or play mode.
///
/// `read` and `write` may be called from different threads; concurrent
/// writers are serialized by the send path lock.
pub struct RtmpSession {
    url: RtmpUrl,
    mode: SessionMode,
    config: SessionConfig,
    stream_id: u32,
    shared: Arc<Shared>,
    read_path: Mutex<ReadPath>,
    media_rx: Receiver<RtmpMessage>,
    command_rx: Receiver<Command>,
    socket: TcpStream,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl RtmpSession {
    /// Connect, handshake and run the command sequence for `mode`.
    pub fn open(url: &str, mode: SessionMode, config: SessionConfig) -> Result<Self> {
        let url = RtmpUrl::parse(url)?;
        info!(
            host = %url.host,
            port = url.port,
            app = %url.app,
            mode = mode.name(),
            "Opening RTMP session"
        );

        let mut stream = connect_tcp(&url, config.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(config.write_timeout))?;
        stream.set_read_timeout(Some(config.handshake_timeout))?;

        let shared = Arc::new(Shared::new(stream.try_clone()?, config.chunk_size));
        shared.set_state(SessionState::Handshaking);
        if let Err(e) = handshake::client_handshake(&mut stream, config.strict_handshake) {
            shared.set_state(SessionState::Closed);
            return Err(e);
        }

        // The receive thread blocks until data arrives or the socket is shut down
        stream.set_read_timeout(None)?;
        let reader_stream = stream.try_clone()?;

        let (media_tx, media_rx) = bounded(config.media_queue_capacity);
        let (command_tx, command_rx) = bounded(config.command_queue_capacity);

        let receiver = {
            let shared = shared.clone();
            let reader = ChunkReader::new(reader_stream, config.max_message_size);
            let window_ack_size = config.window_ack_size;
            thread::Builder::new()
                .name("rtmp-recv".to_string())
                .spawn(move || {
                    receive_loop(reader, shared, mode, media_tx, command_tx, window_ack_size)
                })?
        };

        let mut session = Self {
            url,
            mode,
            config,
            stream_id: 0,
            shared,
            read_path: Mutex::new(ReadPath::default()),
            media_rx,
            command_rx,
            socket: stream,
            receiver: Mutex::new(Some(receiver)),
        };

        match session.negotiate() {
            Ok(stream_id) => {
                session.stream_id = stream_id;
                session.shared.set_state(SessionState::Connected);
                info!(stream_id, mode = mode.name(), "RTMP session connected");
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "RTMP session setup failed");
                session.close();
                Err(e)
            }
        }
    }

    /// Send the protocol preamble and the mode's command sequence.
    ///
    /// Returns the message stream ID allocated by `createStream`.
    fn negotiate(&self) -> Result<u32> {
        let deadline = self.config.command_timeout;
        {
            let mut send = self.shared.send.lock();
            send.send(&RtmpMessage::set_chunk_size(self.config.chunk_size))?;
            send.writer.set_chunk_size(self.config.chunk_size);
            debug!(chunk_size = self.config.chunk_size, "Outgoing chunk size set");
            send.send(&RtmpMessage::window_ack_size(self.config.window_ack_size))?;

            let tid = send.next_transaction_id();
            let connect = command::connect(
                tid,
                &self.url,
                &self.config.flash_version,
                self.mode == SessionMode::Publish,
            );
            send.send_command(&connect, 0)?;
        }
        self.await_result(1.0, "connect", deadline)?;

        let create_tid = {
            let mut send = self.shared.send.lock();
            if self.mode == SessionMode::Publish {
                let key = self.url.stream_key.as_str();
                let tid = send.next_transaction_id();
                send.send_command(&command::release_stream(tid, key), 0)?;
                let tid = send.next_transaction_id();
                send.send_command(&command::fc_publish(tid, key), 0)?;
            }
            let tid = send.next_transaction_id();
            send.send_command(&command::create_stream(tid), 0)?;
            tid
        };
        let values = self.await_result(create_tid, "createStream", deadline)?;
        let stream_id = values
            .iter()
            .skip(1)
            .find_map(AmfValue::as_number)
            .map(|n| n as u32)
            .ok_or_else(|| {
                RtmpError::FatalStream("createStream result without a stream ID".into())
            })?;
        debug!(stream_id, "Stream created");

        match self.mode {
            SessionMode::Publish => {
                self.shared
                    .send
                    .lock()
                    .send_command(&command::publish(&self.url.stream_key), stream_id)?;
                self.await_status("publish", "NetStream.Publish.Start", deadline)?;
            }
            SessionMode::Play => {
                {
                    let mut send = self.shared.send.lock();
                    send.send_command(&command::play(&self.url.stream_key), stream_id)?;
                    send.send(&RtmpMessage::user_control(UserControlEvent::SetBufferLength {
                        stream_id,
                        buffer_ms: self.config.buffer_length_ms,
                    }))?;
                }
                self.await_status("play", "NetStream.Play.Start", deadline)?;
            }
        }
        Ok(stream_id)
    }

    /// Wait for `_result` with `transaction_id`.
    fn await_result(
        &self,
        transaction_id: f64,
        name: &str,
        timeout: Duration,
    ) -> Result<Vec<AmfValue>> {
        self.await_response(name, timeout, |response| match response {
            Response::Result {
                transaction_id: tid,
                values,
            } if tid == transaction_id => Some(Ok(values)),
            Response::Error {
                transaction_id: tid,
                info,
            } if tid == transaction_id => Some(Err(info.into_rejection(name))),
            Response::Status(info) if info.is_error() => Some(Err(info.into_rejection(name))),
            _ => None,
        })
    }

    /// Wait for an `onStatus` with `code`.
    fn await_status(&self, name: &str, code: &str, timeout: Duration) -> Result<StatusInfo> {
        self.await_response(name, timeout, |response| match response {
            Response::Status(info) if info.is_error() => Some(Err(info.into_rejection(name))),
            Response::Status(info) if info.code == code => Some(Ok(info)),
            Response::Error { info, .. } => Some(Err(info.into_rejection(name))),
            _ => None,
        })
    }

    fn await_response<T>(
        &self,
        name: &str,
        timeout: Duration,
        mut matcher: impl FnMut(Response) -> Option<Result<T>>,
    ) -> Result<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.command_rx.recv_timeout(remaining) {
                Ok(cmd) => {
                    let response = Response::classify(cmd);
                    trace!(?response, "Awaiting reply to {}", name);
                    if let Some(result) = matcher(response) {
                        return result;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(command = name, "Timed out waiting for server reply");
                    return Err(RtmpError::Timeout);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(match self.shared.fatal_reason() {
                        Some(reason) => RtmpError::FatalStream(reason),
                        None => RtmpError::StreamClosed,
                    });
                }
            }
        }
    }

    /// Read the next media bytes (play mode).
    ///
    /// Returns `Ok(0)` when nothing arrived within the read timeout or the
    /// server ended the stream. A payload larger than `buf` is continued by
    /// the following calls before any other payload is started.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(RtmpError::StreamClosed);
        }
        if self.mode != SessionMode::Play {
            return Err(RtmpError::WrongMode(self.mode.name()));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let mut read_path = self.read_path.lock();
        if read_path.offset >= read_path.pending.len() {
            let next = if self.config.read_format == ReadFormat::Flv && !read_path.flv_header_sent
            {
                read_path.flv_header_sent = true;
                flv::file_header(true, true).to_vec()
            } else {
                match self.media_rx.recv_timeout(self.config.read_timeout) {
                    Ok(message) => self.format_payload(message),
                    Err(RecvTimeoutError::Timeout) => return Ok(0),
                    Err(RecvTimeoutError::Disconnected) => {
                        if let Some(reason) = self.shared.fatal_reason() {
                            return Err(RtmpError::FatalStream(reason));
                        }
                        if self.shared.closed.load(Ordering::Acquire) {
                            return Err(RtmpError::StreamClosed);
                        }
                        // End of stream
                        return Ok(0);
                    }
                }
            };
            read_path.pending = next;
            read_path.offset = 0;
        }

        let start = read_path.offset;
        let n = buf.len().min(read_path.pending.len() - start);
        buf[..n].copy_from_slice(&read_path.pending[start..start + n]);
        read_path.offset += n;
        Ok(n)
    }

    fn format_payload(&self, message: RtmpMessage) -> Vec<u8> {
        match self.config.read_format {
            ReadFormat::Raw => message.payload,
            ReadFormat::Flv => {
                let tag = FlvTag::from_message(&message);
                let mut out = Vec::with_capacity(tag.encoded_len());
                tag.encode(&mut out);
                out
            }
        }
    }

    /// Send one media message (publish mode).
    ///
    /// `message_type` is the RTMP type ID (8 audio, 9 video, 18 data, ...).
    pub fn write(&self, payload: &[u8], message_type: u8, timestamp: u32) -> Result<usize> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(RtmpError::StreamClosed);
        }
        if let Some(reason) = self.shared.fatal_reason() {
            return Err(RtmpError::FatalStream(reason));
        }
        if self.mode != SessionMode::Publish {
            return Err(RtmpError::WrongMode(self.mode.name()));
        }
        if payload.len() > MAX_MESSAGE_LEN {
            warn!(len = payload.len(), "Message exceeds the 24-bit length field");
            return Err(RtmpError::MessageTooLarge(payload.len()));
        }

        let message_type = MessageType::from_id(message_type);
        let stream_id = if message_type.is_protocol_control() {
            0
        } else {
            self.stream_id
        };

        let mut send = self.shared.send.lock();
        match send.send_parts(message_type, timestamp, stream_id, payload) {
            Ok(()) => {
                trace!(?message_type, timestamp, len = payload.len(), "RTMP -> media");
                Ok(payload.len())
            }
            Err(e) => {
                drop(send);
                if !self.shared.closed.load(Ordering::Acquire) {
                    self.shared.mark_fatal(format!("write failed: {}", e));
                }
                Err(e)
            }
        }
    }

    /// Close the session. Safe to call more than once.
    ///
    /// Never waits for a writer blocked on the socket: the goodbye is skipped
    /// when the send path is busy and the shutdown fails the pending write.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if self.shared.state() == SessionState::Connected {
            self.send_goodbye();
        }
        self.shared.set_state(SessionState::Closed);

        // Unblocks the receive thread and any writer stuck in the socket
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            debug!(error = %e, "Socket shutdown failed");
        }
        if let Some(handle) = self.receiver.lock().take() {
            if handle.join().is_err() {
                error!("RTMP receive thread panicked");
            }
        }
        info!(url = %self.url.tc_url(), "RTMP session closed");
    }

    /// Best-effort `FCUnpublish` / `deleteStream`.
    fn send_goodbye(&self) {
        let Some(mut send) = self.shared.send.try_lock() else {
            debug!("Send path busy, skipping graceful shutdown");
            return;
        };
        let timeout = self.config.write_timeout.min(GOODBYE_TIMEOUT);
        if let Err(e) = send.stream.set_write_timeout(Some(timeout)) {
            debug!(error = %e, "Failed to bound goodbye write");
        }
        let mut result = Ok(());
        if self.mode == SessionMode::Publish {
            let tid = send.next_transaction_id();
            result = send.send_command(&command::fc_unpublish(tid, &self.url.stream_key), 0);
        }
        if result.is_ok() {
            result = send.send_command(&command::delete_stream(self.stream_id), 0);
        }
        if let Err(e) = result {
            debug!(error = %e, "Graceful shutdown failed");
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected && !self.shared.closed.load(Ordering::Acquire)
    }

    /// Whether the server ended the stream.
    pub fn is_eof(&self) -> bool {
        self.shared.peer_eof.load(Ordering::Acquire)
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn url(&self) -> &RtmpUrl {
        &self.url
    }

    /// Message stream ID allocated by the server.
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }
}

impl Drop for RtmpSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn connect_tcp(url: &RtmpUrl, timeout: Duration) -> Result<TcpStream> {
    let addrs = url.socket_addr_string().to_socket_addrs()?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                debug!(%addr, "TCP connected");
                return Ok(stream);
            }
            Err(e) => {
                debug!(%addr, error = %e, "TCP connect failed");
                last_err = Some(e);
            }
        }
    }
    Err(RtmpError::Connection(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no addresses for {}", url.host),
        )
    })))
}

/// Body of the receive thread.
///
/// Handles protocol control inline, routes commands and media to their
/// queues, and acknowledges received bytes against the server's window.
fn receive_loop(
    mut reader: ChunkReader<TcpStream>,
    shared: Arc<Shared>,
    mode: SessionMode,
    media_tx: Sender<RtmpMessage>,
    command_tx: Sender<Command>,
    window_ack_size: u32,
) {
    let mut ack_window: Option<u32> = None;
    let mut last_ack: u64 = 0;
    let mut announced_window = window_ack_size;

    loop {
        let message = match reader.read_message() {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("Server closed the connection");
                shared.peer_eof.store(true, Ordering::Release);
                break;
            }
            Err(e) => {
                if !shared.closed.load(Ordering::Acquire) {
                    shared.mark_fatal(e.to_string());
                }
                break;
            }
        };

        let outcome = handle_message(
            message,
            &mut reader,
            &shared,
            mode,
            &media_tx,
            &command_tx,
            &mut ack_window,
            &mut announced_window,
        );
        if let Err(e) = outcome {
            if !shared.closed.load(Ordering::Acquire) {
                shared.mark_fatal(e.to_string());
            }
            break;
        }

        if let Some(window) = ack_window {
            let received = reader.bytes_read();
            if received - last_ack >= window as u64 {
                trace!(received, "RTMP -> acknowledgement");
                if let Err(e) = shared
                    .send
                    .lock()
                    .send(&RtmpMessage::acknowledgement(received as u32))
                {
                    debug!(error = %e, "Failed to send acknowledgement");
                }
                last_ack = received;
            }
        }

        if shared.closed.load(Ordering::Acquire) {
            break;
        }
    }
    trace!("RTMP receive thread exiting");
}

fn handle_message(
    message: RtmpMessage,
    reader: &mut ChunkReader<TcpStream>,
    shared: &Shared,
    mode: SessionMode,
    media_tx: &Sender<RtmpMessage>,
    command_tx: &Sender<Command>,
    ack_window: &mut Option<u32>,
    announced_window: &mut u32,
) -> Result<()> {
    match message.message_type {
        MessageType::SetChunkSize => {
            let size = message.control_value()? & 0x7FFF_FFFF;
            reader.set_chunk_size(size)?;
            info!(chunk_size = size, "Server chunk size changed");
        }
        MessageType::Abort => {
            let csid = message.control_value()?;
            debug!(csid, "Abort message");
            reader.abort(csid);
        }
        MessageType::Acknowledgement => {
            trace!(sequence = message.control_value()?, "Server acknowledgement");
        }
        MessageType::UserControl => match UserControlEvent::parse(&message.payload)? {
            UserControlEvent::PingRequest(ts) => {
                trace!(ts, "Ping request");
                shared
                    .send
                    .lock()
                    .send(&RtmpMessage::user_control(UserControlEvent::PingResponse(ts)))?;
            }
            UserControlEvent::StreamEof(id) => {
                info!(stream_id = id, "Server signalled end of stream");
                shared.peer_eof.store(true, Ordering::Release);
            }
            UserControlEvent::StreamBegin(id) => debug!(stream_id = id, "Stream begin"),
            UserControlEvent::StreamDry(id) => debug!(stream_id = id, "Stream dry"),
            other => debug!(?other, "User control event"),
        },
        MessageType::WindowAckSize => {
            let window = message.control_value()?;
            debug!(window, "Server window acknowledgement size");
            *ack_window = Some(window.max(1));
        }
        MessageType::SetPeerBandwidth => {
            let size = message.control_value()?;
            debug!(size, "Set peer bandwidth");
            if size != *announced_window {
                shared
                    .send
                    .lock()
                    .send(&RtmpMessage::window_ack_size(size))?;
                *announced_window = size;
            }
        }
        MessageType::CommandAmf0 | MessageType::CommandAmf3 => {
            let amf3 = message.message_type == MessageType::CommandAmf3;
            let cmd = Command::decode(&message.payload, amf3)?;
            debug!(
                name = %cmd.name,
                transaction_id = cmd.transaction_id,
                "RTMP <- command"
            );
            if let Response::Status(info) = Response::classify(cmd.clone()) {
                info!(level = %info.level, code = %info.code, "onStatus");
            }
            if command_tx.try_send(cmd).is_err() {
                trace!("Command queue full, dropping command");
            }
        }
        MessageType::Audio
        | MessageType::Video
        | MessageType::DataAmf0
        | MessageType::DataAmf3
        | MessageType::Aggregate
            if mode == SessionMode::Publish =>
        {
            // Nothing reads media on a publishing session
            trace!(
                message_type = ?message.message_type,
                len = message.payload.len(),
                "Dropping server media"
            );
        }
        MessageType::Audio | MessageType::Video | MessageType::DataAmf0 => {
            deliver(shared, media_tx, message);
        }
        MessageType::DataAmf3 => {
            // Strip the AMF3 format byte; the body is AMF0
            let mut message = message;
            if !message.payload.is_empty() {
                message.payload.remove(0);
            }
            message.message_type = MessageType::DataAmf0;
            deliver(shared, media_tx, message);
        }
        MessageType::Aggregate => {
            for sub in flv::split_aggregate(&message)? {
                deliver(shared, media_tx, sub);
            }
        }
        other => debug!(?other, len = message.payload.len(), "Ignoring message"),
    }
    Ok(())
}

/// Queue a media message, waiting for room unless the session closes.
fn deliver(shared: &Shared, media_tx: &Sender<RtmpMessage>, message: RtmpMessage) {
    let mut message = message;
    loop {
        match media_tx.send_timeout(message, Duration::from_millis(100)) {
            Ok(()) => return,
            Err(SendTimeoutError::Timeout(m)) => {
                if shared.closed.load(Ordering::Acquire) {
                    return;
                }
                message = m;
            }
            Err(SendTimeoutError::Disconnected(_)) => return,
        }
    }
}
