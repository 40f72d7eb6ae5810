use std::fmt;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt,
};

/// An error during an SMTP exchange.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("could not connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake with {address} failed: {source}")]
    Tls {
        address: String,
        #[source]
        source: native_tls::Error,
    },
    #[error("timed out while {stage}")]
    Timeout { stage: String },
    #[error("server rejected {command:?}: {reply}")]
    Protocol { command: String, reply: Reply },
    #[error("received malformed reply line {line:?}")]
    MalformedReply { line: String },
    #[error("connection closed in the middle of a reply")]
    ConnectionClosed,
    #[error("cannot {operation} while the session is {state:?}")]
    OutOfOrder {
        operation: &'static str,
        state: crate::session::State,
    },
}

impl Error {
    /// Whether the connection to the server could not be established.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connect { .. } | Error::Tls { .. })
    }
}

/// How the session reacts to a negative server reply.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ReplyPolicy {
    /// Keep going whatever the server answers.
    #[default]
    Lenient,
    /// Fail with [`Error::Protocol`] on any 4xx or 5xx reply.
    Strict,
}

/// One complete, possibly multi-line, server reply.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Reply {
    pub code: u16,
    /// The raw reply lines without their line terminators.
    pub lines: Vec<String>,
}

impl Reply {
    /// Whether the code is a transient or permanent failure.
    pub fn is_rejection(&self) -> bool {
        self.code >= 400
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

/// Which way a protocol line travelled.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Sent,
    Received,
}

/// A single line of the protocol transcript, emitted in verbose mode.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TranscriptEvent {
    pub direction: Direction,
    pub line: String,
}

/// Longest reply line accepted, terminator included.
pub(crate) const MAX_LINE_LENGTH: usize = 4096;

/// Read lines up to and including the one with a space after the code.
pub(crate) async fn read_reply(
    mut reader: impl AsyncBufRead + Unpin,
) -> Result<Reply, Error> {
    let mut code = None;
    let mut lines = Vec::new();
    loop {
        let mut raw = Vec::with_capacity(128);
        let len = (&mut reader)
            .take(MAX_LINE_LENGTH as u64)
            .read_until(b'\n', &mut raw)
            .await?;
        if len == 0 {
            return Err(Error::ConnectionClosed);
        }
        if len == MAX_LINE_LENGTH && !raw.ends_with(b"\n") {
            let start = String::from_utf8_lossy(&raw[..64]).to_string();
            return Err(Error::MalformedReply { line: start });
        }
        let raw = String::from_utf8_lossy(&raw);
        #[cfg(feature = "tracing")]
        {
            use tracing::{event, Level};
            event!(Level::TRACE, recv = %raw);
        }
        let line = raw.trim_end_matches(['\r', '\n']).to_string();
        let Some(line_code) = line.get(..3).and_then(parse_code) else {
            return Err(Error::MalformedReply { line });
        };
        code.get_or_insert(line_code);
        let last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(_) => return Err(Error::MalformedReply { line }),
        };
        lines.push(line);
        if last {
            break;
        }
    }
    Ok(Reply {
        code: code.unwrap_or_default(),
        lines,
    })
}

fn parse_code(code: &str) -> Option<u16> {
    if code.bytes().all(|b| b.is_ascii_digit()) {
        code.parse().ok()
    } else {
        None
    }
}

/// Write `data`; only `shown` is traced.
pub(crate) async fn write(
    mut socket: impl AsyncWrite + Unpin,
    data: &str,
    shown: &str,
) -> Result<(), Error> {
    #[cfg(feature = "tracing")]
    {
        use tracing::{event, Level};
        event!(Level::TRACE, send = shown);
    }
    #[cfg(not(feature = "tracing"))]
    let _ = shown;

    socket.write_all(data.as_bytes()).await?;
    socket.flush().await?;
    Ok(())
}

pub(crate) fn encode_login(value: &str) -> String {
    use base64ct::Encoding;
    base64ct::Base64::encode_string(value.as_bytes())
}

/// Double any period that starts a line so the server
/// does not mistake it for the end of the data.
pub(crate) fn dot_stuff(payload: &str) -> String {
    let mut stuffed = String::with_capacity(payload.len() + 8);
    let mut line_start = true;
    for c in payload.chars() {
        if line_start && c == '.' {
            stuffed.push('.');
        }
        stuffed.push(c);
        line_start = c == '\n';
    }
    stuffed
}
