//! RTMP URL parsing.

use crate::error::{Result, RtmpError};

/// Default RTMP TCP port.
pub const DEFAULT_PORT: u16 = 1935;

/// Parsed `rtmp://host[:port]/app[/instance]/stream` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpUrl {
    pub host: String,
    pub port: u16,
    /// Application name, everything between the host and the last `/`.
    pub app: String,
    /// Stream key (play path / publish name), including any query string.
    pub stream_key: String,
}

impl RtmpUrl {
    /// Parse an RTMP URL.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| RtmpError::InvalidUrl(format!("missing scheme in '{}'", url)))?;

        if !scheme.eq_ignore_ascii_case("rtmp") {
            return Err(RtmpError::UnsupportedScheme(scheme.to_ascii_lowercase()));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };

        let (host, port) = parse_authority(authority)?;

        let path = path.trim_start_matches('/');
        let (app, stream_key) = match path.rfind('/') {
            Some(idx) => (&path[..idx], &path[idx + 1..]),
            // A single segment is the app; the stream key is then empty
            None => (path, ""),
        };

        if app.is_empty() {
            return Err(RtmpError::InvalidUrl(format!("missing app name in '{}'", url)));
        }

        Ok(Self {
            host,
            port,
            app: app.to_string(),
            stream_key: stream_key.to_string(),
        })
    }

    /// The `tcUrl` sent in the connect command.
    pub fn tc_url(&self) -> String {
        if self.port == DEFAULT_PORT {
            format!("rtmp://{}/{}", self.host_for_url(), self.app)
        } else {
            format!("rtmp://{}:{}/{}", self.host_for_url(), self.port, self.app)
        }
    }

    /// `host:port` suitable for socket address resolution.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.host_for_url(), self.port)
    }

    fn host_for_url(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

fn parse_authority(authority: &str) -> Result<(String, u16)> {
    if authority.is_empty() {
        return Err(RtmpError::InvalidUrl("empty host".to_string()));
    }

    // Bracketed IPv6 literal
    if let Some(stripped) = authority.strip_prefix('[') {
        let end = stripped
            .find(']')
            .ok_or_else(|| RtmpError::InvalidUrl(format!("unterminated IPv6 host '{}'", authority)))?;
        let host = &stripped[..end];
        let after = &stripped[end + 1..];
        let port = match after.strip_prefix(':') {
            Some(p) => parse_port(p)?,
            None if after.is_empty() => DEFAULT_PORT,
            None => return Err(RtmpError::InvalidUrl(format!("bad authority '{}'", authority))),
        };
        if host.is_empty() {
            return Err(RtmpError::InvalidUrl("empty host".to_string()));
        }
        return Ok((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(RtmpError::InvalidUrl("empty host".to_string()));
            }
            Ok((host.to_string(), parse_port(port)?))
        }
        None => Ok((authority.to_string(), DEFAULT_PORT)),
    }
}

fn parse_port(port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(RtmpError::InvalidUrl(format!("invalid port '{}'", port))),
        Ok(p) => Ok(p),
    }
}
