//! Simple (unencrypted, no digest) RTMP handshake.
//!
//! ```text
//! client                     server
//!   C0 C1   ------------>
//!           <------------   S0 S1 S2
//!   C2      ------------>
//! ```

use crate::error::{HandshakeError, Result, RtmpError};
use rand::RngCore;
use std::io::{ErrorKind, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// Protocol version carried in C0/S0.
pub const RTMP_VERSION: u8 = 3;

/// Size of C1/C2/S1/S2.
pub const HANDSHAKE_SIZE: usize = 1536;

/// Perform the client side of the handshake on a connected stream.
///
/// Reads are bounded by whatever timeout the caller configured on the stream.
/// With `strict` set, an S2 that does not echo C1 fails the handshake;
/// otherwise the mismatch is only logged.
pub fn client_handshake<S: Read + Write>(stream: &mut S, strict: bool) -> Result<()> {
    let c1 = make_packet();

    let mut c0c1 = Vec::with_capacity(1 + HANDSHAKE_SIZE);
    c0c1.push(RTMP_VERSION);
    c0c1.extend_from_slice(&c1);
    stream.write_all(&c0c1).map_err(map_io)?;
    stream.flush().map_err(map_io)?;
    tracing::debug!("Handshake: sent C0+C1");

    let mut s0 = [0u8; 1];
    read_exact(stream, &mut s0)?;
    if s0[0] != RTMP_VERSION {
        return Err(HandshakeError::VersionMismatch(s0[0]).into());
    }

    let mut s1 = vec![0u8; HANDSHAKE_SIZE];
    read_exact(stream, &mut s1)?;
    let server_time = u32::from_be_bytes([s1[0], s1[1], s1[2], s1[3]]);
    tracing::debug!(server_time, "Handshake: received S0+S1");

    let c2 = echo(&s1);
    stream.write_all(&c2).map_err(map_io)?;
    stream.flush().map_err(map_io)?;

    let mut s2 = vec![0u8; HANDSHAKE_SIZE];
    read_exact(stream, &mut s2)?;

    if s2[8..] != c1[8..] {
        if strict {
            return Err(HandshakeError::SignatureMismatch.into());
        }
        tracing::warn!("Handshake: S2 does not echo C1, continuing (lenient mode)");
    }

    tracing::debug!("Handshake complete");
    Ok(())
}

/// Perform the server side of the handshake.
///
/// Used by loopback servers in tests and demos.
pub fn server_handshake<S: Read + Write>(stream: &mut S) -> Result<()> {
    let mut c0 = [0u8; 1];
    read_exact(stream, &mut c0)?;
    if c0[0] != RTMP_VERSION {
        return Err(HandshakeError::VersionMismatch(c0[0]).into());
    }
    let mut c1 = vec![0u8; HANDSHAKE_SIZE];
    read_exact(stream, &mut c1)?;

    let s1 = make_packet();
    let mut reply = Vec::with_capacity(1 + 2 * HANDSHAKE_SIZE);
    reply.push(RTMP_VERSION);
    reply.extend_from_slice(&s1);
    reply.extend_from_slice(&echo(&c1));
    stream.write_all(&reply).map_err(map_io)?;
    stream.flush().map_err(map_io)?;

    let mut c2 = vec![0u8; HANDSHAKE_SIZE];
    read_exact(stream, &mut c2)?;
    if c2[8..] != s1[8..] {
        tracing::warn!("Handshake: C2 does not echo S1");
    }
    Ok(())
}

/// time(4) + zero(4) + 1528 random bytes.
fn make_packet() -> Vec<u8> {
    let mut packet = vec![0u8; HANDSHAKE_SIZE];
    packet[0..4].copy_from_slice(&epoch_millis().to_be_bytes());
    rand::thread_rng().fill_bytes(&mut packet[8..]);
    packet
}

/// Echo a peer packet with bytes 4..8 replaced by our receive time.
fn echo(peer: &[u8]) -> Vec<u8> {
    let mut packet = peer.to_vec();
    packet[4..8].copy_from_slice(&epoch_millis().to_be_bytes());
    packet
}

fn epoch_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

fn read_exact<S: Read>(stream: &mut S, buf: &mut [u8]) -> Result<()> {
    stream.read_exact(buf).map_err(map_io)
}

fn map_io(e: std::io::Error) -> RtmpError {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => HandshakeError::Timeout.into(),
        ErrorKind::UnexpectedEof => HandshakeError::PeerClosed.into(),
        _ => RtmpError::Connection(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Scripted peer: reads come from `input`, writes are captured.
    struct ScriptedPeer {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl ScriptedPeer {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                written: Vec::new(),
            }
        }
    }

    impl Read for ScriptedPeer {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedPeer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn packet_layout() {
        let p = make_packet();
        assert_eq!(p.len(), HANDSHAKE_SIZE);
        assert_eq!(&p[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn echo_keeps_random_part() {
        let p = make_packet();
        let e = echo(&p);
        assert_eq!(e[..4], p[..4]);
        assert_eq!(e[8..], p[8..]);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut peer = ScriptedPeer::new(vec![6u8; 1 + 2 * HANDSHAKE_SIZE]);
        let err = client_handshake(&mut peer, true).unwrap_err();
        assert!(matches!(
            err,
            RtmpError::Handshake(HandshakeError::VersionMismatch(6))
        ));
        // C0 + C1 were still sent
        assert_eq!(peer.written.len(), 1 + HANDSHAKE_SIZE);
        assert_eq!(peer.written[0], RTMP_VERSION);
    }

    #[test]
    fn strict_mode_rejects_bad_echo() {
        let mut input = vec![RTMP_VERSION];
        input.extend_from_slice(&make_packet());
        input.extend_from_slice(&make_packet());
        let mut peer = ScriptedPeer::new(input);
        let err = client_handshake(&mut peer, true).unwrap_err();
        assert!(matches!(
            err,
            RtmpError::Handshake(HandshakeError::SignatureMismatch)
        ));
    }

    #[test]
    fn lenient_mode_accepts_bad_echo() {
        let mut input = vec![RTMP_VERSION];
        input.extend_from_slice(&make_packet());
        input.extend_from_slice(&make_packet());
        let mut peer = ScriptedPeer::new(input);
        client_handshake(&mut peer, false).unwrap();
        assert_eq!(peer.written.len(), 1 + 2 * HANDSHAKE_SIZE);
    }

    #[test]
    fn truncated_server_reply() {
        let mut peer = ScriptedPeer::new(vec![RTMP_VERSION, 0, 0]);
        let err = client_handshake(&mut peer, true).unwrap_err();
        assert!(matches!(err, RtmpError::Handshake(HandshakeError::PeerClosed)));
    }

    #[test]
    fn client_and_server_agree_over_loopback() {
        use std::net::{TcpListener, TcpStream};

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            server_handshake(&mut sock).unwrap();
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client_handshake(&mut client, true).unwrap();
        server.join().unwrap();
    }
}
