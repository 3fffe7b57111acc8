//! Loopback RTMP server for integration tests.
//!
//! Speaks just enough of the server side of the protocol to drive a client
//! session through open, publish/play, and close, and records everything
//! the client sends.

#![allow(dead_code)]

use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use screenlive_rtmp::amf0::AmfValue;
use screenlive_rtmp::command::Command;
use screenlive_rtmp::handshake;
use screenlive_rtmp::message::BandwidthLimit;
use screenlive_rtmp::{ChunkReader, ChunkWriter, MessageType, RtmpMessage, UserControlEvent};

/// Server behaviour knobs.
#[derive(Clone)]
pub struct Behavior {
    pub reject_connect: bool,
    pub reject_publish: bool,
    /// Server outgoing chunk size announced after connect.
    pub chunk_size: u32,
    /// Window announced to the client.
    pub window_ack_size: u32,
    /// Ping the client right after the stream starts.
    pub ping: bool,
    /// Media sent once the stream starts, to players and publishers alike.
    pub media: Vec<RtmpMessage>,
    /// Send StreamEOF and half-close after the media.
    pub end_stream: bool,
    /// Accept the TCP connection but never answer the handshake.
    pub silent: bool,
    /// Stop reading from the client for this long after NetStream.Publish.Start.
    pub stall_after_publish: Option<Duration>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            reject_connect: false,
            reject_publish: false,
            chunk_size: 128,
            window_ack_size: 2_500_000,
            ping: false,
            media: Vec::new(),
            end_stream: false,
            silent: false,
            stall_after_publish: None,
        }
    }
}

/// What the client sent.
#[derive(Default)]
pub struct ServerLog {
    pub commands: Vec<String>,
    pub media: Vec<RtmpMessage>,
    pub ping_responses: Vec<u32>,
    pub acknowledgements: Vec<u32>,
    pub buffer_length_ms: Option<u32>,
    pub connect_object: Option<AmfValue>,
}

pub struct MirrorServer {
    pub port: u16,
    pub log: Arc<Mutex<ServerLog>>,
    handle: Option<JoinHandle<()>>,
}

impl MirrorServer {
    pub fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let log = Arc::new(Mutex::new(ServerLog::default()));
        let log_clone = log.clone();
        let handle = thread::Builder::new()
            .name("mirror-server".to_string())
            .spawn(move || {
                if let Ok((sock, _)) = listener.accept() {
                    serve(sock, behavior, log_clone);
                }
            })
            .expect("spawn");
        Self {
            port,
            log,
            handle: Some(handle),
        }
    }

    pub fn url(&self, mode_key: &str) -> String {
        format!("rtmp://127.0.0.1:{}/live/{}", self.port, mode_key)
    }

    /// Wait for the client connection to finish.
    pub fn join(mut self) -> Arc<Mutex<ServerLog>> {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("server thread");
        }
        self.log.clone()
    }
}

struct Conn {
    writer: ChunkWriter,
    sock: TcpStream,
}

impl Conn {
    fn send(&mut self, message: &RtmpMessage) {
        use std::io::Write;
        let mut out = Vec::new();
        self.writer.encode_default(message, &mut out);
        let _ = self.sock.write_all(&out);
    }

    fn command(&mut self, cmd: Command, stream_id: u32) {
        let message = RtmpMessage::new(MessageType::CommandAmf0, 0, stream_id, cmd.encode());
        self.send(&message);
    }

    fn status(&mut self, level: &str, code: &str, stream_id: u32) {
        let info = AmfValue::object([
            ("level", AmfValue::string(level)),
            ("code", AmfValue::string(code)),
            ("description", AmfValue::string(code)),
        ]);
        self.command(Command::new("onStatus", 0.0).with_arg(info), stream_id);
    }
}

fn serve(mut sock: TcpStream, behavior: Behavior, log: Arc<Mutex<ServerLog>>) {
    if behavior.silent {
        thread::sleep(Duration::from_secs(2));
        return;
    }
    if handshake::server_handshake(&mut sock).is_err() {
        return;
    }
    let read_sock = sock.try_clone().expect("clone");
    let mut reader = ChunkReader::new(read_sock, 64 * 1024 * 1024);
    let mut conn = Conn {
        writer: ChunkWriter::new(),
        sock,
    };

    loop {
        let message = match reader.read_message() {
            Ok(Some(m)) => m,
            _ => break,
        };
        match message.message_type {
            MessageType::SetChunkSize => {
                let size = message.control_value().expect("chunk size");
                reader.set_chunk_size(size).expect("valid chunk size");
            }
            MessageType::Acknowledgement => {
                log.lock()
                    .acknowledgements
                    .push(message.control_value().expect("ack"));
            }
            MessageType::UserControl => match UserControlEvent::parse(&message.payload) {
                Ok(UserControlEvent::PingResponse(ts)) => log.lock().ping_responses.push(ts),
                Ok(UserControlEvent::SetBufferLength { buffer_ms, .. }) => {
                    log.lock().buffer_length_ms = Some(buffer_ms)
                }
                _ => {}
            },
            MessageType::CommandAmf0 => {
                let cmd = Command::decode(&message.payload, false).expect("command");
                log.lock().commands.push(cmd.name.clone());
                handle_command(&mut conn, &cmd, &behavior, &log);
                if cmd.name == "publish" {
                    if let Some(stall) = behavior.stall_after_publish {
                        thread::sleep(stall);
                    }
                }
            }
            MessageType::Audio | MessageType::Video | MessageType::DataAmf0 => {
                log.lock().media.push(message);
            }
            _ => {}
        }
    }
}

fn handle_command(conn: &mut Conn, cmd: &Command, behavior: &Behavior, log: &Arc<Mutex<ServerLog>>) {
    let tid = cmd.transaction_id;
    match cmd.name.as_str() {
        "connect" => {
            log.lock().connect_object = Some(cmd.command_object.clone());
            if behavior.reject_connect {
                let info = AmfValue::object([
                    ("level", AmfValue::string("error")),
                    ("code", AmfValue::string("NetConnection.Connect.Rejected")),
                    ("description", AmfValue::string("not allowed")),
                ]);
                conn.command(Command::new("_error", tid).with_arg(info), 0);
                return;
            }
            conn.send(&RtmpMessage::window_ack_size(behavior.window_ack_size));
            conn.send(&RtmpMessage::set_peer_bandwidth(
                behavior.window_ack_size,
                BandwidthLimit::Dynamic,
            ));
            conn.send(&RtmpMessage::set_chunk_size(behavior.chunk_size));
            conn.writer.set_chunk_size(behavior.chunk_size);
            let props = AmfValue::object([("fmsVer", AmfValue::string("FMS/3,0,1,123"))]);
            let info = AmfValue::object([
                ("level", AmfValue::string("status")),
                ("code", AmfValue::string("NetConnection.Connect.Success")),
            ]);
            conn.command(
                Command::new("_result", tid).with_object(props).with_arg(info),
                0,
            );
            conn.command(Command::new("onBWDone", 0.0), 0);
        }
        "releaseStream" | "FCPublish" => {
            conn.command(
                Command::new("_result", tid).with_arg(AmfValue::Undefined),
                0,
            );
        }
        "createStream" => {
            conn.command(
                Command::new("_result", tid).with_arg(AmfValue::Number(1.0)),
                0,
            );
        }
        "publish" => {
            if behavior.reject_publish {
                conn.status("error", "NetStream.Publish.BadName", 1);
            } else {
                conn.status("status", "NetStream.Publish.Start", 1);
                for media in &behavior.media {
                    conn.send(media);
                }
                if behavior.ping {
                    conn.send(&RtmpMessage::user_control(UserControlEvent::PingRequest(4242)));
                }
            }
        }
        "play" => {
            conn.send(&RtmpMessage::user_control(UserControlEvent::StreamBegin(1)));
            conn.status("status", "NetStream.Play.Reset", 1);
            conn.status("status", "NetStream.Play.Start", 1);
            if behavior.ping {
                conn.send(&RtmpMessage::user_control(UserControlEvent::PingRequest(4242)));
            }
            for media in &behavior.media {
                conn.send(media);
            }
            if behavior.end_stream {
                conn.send(&RtmpMessage::user_control(UserControlEvent::StreamEof(1)));
                // Half-close so the client sees EOF while we keep draining its input
                let _ = conn.sock.shutdown(Shutdown::Write);
            }
        }
        _ => {}
    }
}

/// Install a test subscriber once; ignore failures from repeated calls.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .with_test_writer()
        .try_init();
}
