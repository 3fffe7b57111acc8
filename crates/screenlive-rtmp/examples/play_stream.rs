//! Pull a live stream and save it as an FLV file
//!
//! Run with: cargo run --example play_stream -- <rtmp-url> <out.flv> [seconds]
//! Example: cargo run --example play_stream -- rtmp://127.0.0.1/live/test capture.flv 10

use screenlive_rtmp::{ReadFormat, RtmpSession, SessionConfig, SessionMode};
use std::fs::File;
use std::io::Write;
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <rtmp-url> <out.flv> [seconds]", args[0]);
        std::process::exit(1);
    }
    let seconds: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(10);

    let config = SessionConfig::default()
        .with_read_format(ReadFormat::Flv)
        .with_read_timeout(Duration::from_secs(1));
    let session = RtmpSession::open(&args[1], SessionMode::Play, config)?;
    let mut out = File::create(&args[2])?;

    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0usize;
    let end = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < end {
        let n = session.read(&mut buf)?;
        if n == 0 {
            if session.is_eof() {
                println!("Server ended the stream");
                break;
            }
            continue;
        }
        out.write_all(&buf[..n])?;
        total += n;
    }

    session.close();
    println!("Wrote {} bytes to {}", total, args[2]);
    Ok(())
}
