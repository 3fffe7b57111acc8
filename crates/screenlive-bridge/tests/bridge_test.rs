//! Handle-level behavior of the bridge entry points.

use screenlive_bridge::*;
use std::io::Read;
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

fn short_timeouts() -> SessionConfig {
    SessionConfig::default()
        .with_connect_timeout(Duration::from_secs(2))
        .with_handshake_timeout(Duration::from_millis(300))
        .with_command_timeout(Duration::from_millis(300))
}

/// A TCP server that accepts one connection and never answers.
fn silent_server() -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        if let Ok((mut socket, _)) = listener.accept() {
            let mut sink = [0u8; 4096];
            while matches!(socket.read(&mut sink), Ok(n) if n > 0) {}
        }
    });
    (format!("rtmp://127.0.0.1:{}/live/test", port), handle)
}

#[test]
fn test_unanswered_handshake_gives_null_handle() {
    let (url, server) = silent_server();
    let start = Instant::now();
    let handle = rtmp_open_with_config(&url, true, short_timeouts());
    assert_eq!(handle, NULL_HANDLE);
    assert!(start.elapsed() < Duration::from_secs(5));
    drop(server);
}

#[test]
fn test_client_connect_failure_is_false() {
    let (url, _server) = silent_server();
    let client = RtmpClient::with_config(short_timeouts());
    assert!(!client.connect(&url, false));
    assert!(!client.is_connected());

    let mut buf = [0u8; 32];
    assert_eq!(client.read(&mut buf, 4, 16), 0);
    assert!(!client.write(&buf, 32, 8, 0));
}

#[test]
fn test_refused_connection_gives_null_handle() {
    // Bind then drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let url = format!("rtmp://127.0.0.1:{}/live/test", port);
    assert_eq!(rtmp_open_with_config(&url, false, short_timeouts()), NULL_HANDLE);
}

#[test]
fn test_soundtouch_handles_are_independent() {
    let a = soundtouch_new();
    let b = soundtouch_new();
    assert_ne!(a, b);

    soundtouch_set_tempo_change(a, 100.0);
    let input = vec![0u8; 2 * 8000];
    let mut out = vec![0u8; 1 << 16];

    let mut from_a = soundtouch_process(a, &input, input.len(), &mut out);
    from_a += soundtouch_flush(a, &mut out);
    let mut from_b = soundtouch_process(b, &input, input.len(), &mut out);
    from_b += soundtouch_flush(b, &mut out);

    assert_eq!(from_a, 8000);
    assert_eq!(from_b, 16000);

    soundtouch_delete(a);
    soundtouch_delete(b);
    assert_eq!(soundtouch_flush(a, &mut out), 0);
}

#[test]
fn test_soundtouch_wrapper_matches_handle_api() {
    let tone: Vec<u8> = (0..6000)
        .flat_map(|i| (((i as f32 * 0.05).sin() * 9000.0) as i16).to_le_bytes())
        .collect();

    let wrapper = SoundTouch::new();
    wrapper.set_voice_preset(VoicePreset::Rose);
    let mut out_wrapper = vec![0u8; 1 << 16];
    let mut n = wrapper.process(&tone, tone.len(), &mut out_wrapper) as usize;
    n += wrapper.flush(&mut out_wrapper[n..]) as usize;

    let handle = soundtouch_new();
    soundtouch_set_pitch(handle, 2.1);
    let mut out_handle = vec![0u8; 1 << 16];
    let mut m = soundtouch_process(handle, &tone, tone.len(), &mut out_handle) as usize;
    m += soundtouch_flush(handle, &mut out_handle[m..]) as usize;
    soundtouch_delete(handle);

    assert_eq!(n, tone.len());
    assert_eq!(out_wrapper[..n], out_handle[..m]);
}

#[test]
fn test_versions_are_reported() {
    assert!(!RtmpClient::version().is_empty());
    assert!(!SoundTouch::version().is_empty());
}
