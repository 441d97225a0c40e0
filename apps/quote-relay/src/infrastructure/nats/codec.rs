//! NATS Protocol Codec
//!
//! Frames the NATS client protocol over a byte stream with
//! [`tokio_util::codec`].
//!
//! Every operation is a control line terminated by `\r\n`. `MSG` and `PUB`
//! carry a payload of a declared length followed by another `\r\n`:
//!
//! ```text
//! MSG <subject> <sid> [reply-to] <#bytes>\r\n<payload>\r\n
//! PUB <subject> <#bytes>\r\n<payload>\r\n
//! SUB <subject> [queue group] <sid>\r\n
//! ```
//!
//! The decoder never consumes a partial frame, so a frame split across
//! reads is reassembled transparently.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

/// Longest control line accepted before the frame is rejected.
pub const MAX_CONTROL_LINE: usize = 4096;

/// Largest `MSG` payload accepted before the server announces its own limit.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

const CRLF: &[u8] = b"\r\n";

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Socket read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `INFO` or `CONNECT` body is not valid JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Control line longer than [`MAX_CONTROL_LINE`] without a terminator.
    #[error("control line exceeds {MAX_CONTROL_LINE} bytes")]
    ControlLineTooLong,

    /// Unrecognized operation.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Operation with missing or malformed arguments.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

// =============================================================================
// Operations
// =============================================================================

/// Server details sent in `INFO`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    /// Unique server id.
    pub server_id: String,
    /// Server version string.
    pub version: String,
    /// Largest payload the server accepts.
    pub max_payload: usize,
    /// Whether the server expects credentials in `CONNECT`.
    pub auth_required: bool,
}

/// Client options sent in `CONNECT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectInfo {
    /// Ask the server to acknowledge every operation with `+OK`.
    pub verbose: bool,
    /// Strict subject checking.
    pub pedantic: bool,
    /// Client name shown in server monitoring.
    pub name: String,
    /// Client implementation language.
    pub lang: &'static str,
    /// Client version.
    pub version: &'static str,
    /// Protocol level.
    pub protocol: u8,
    /// Whether the server echoes our own publishes back to our subscriptions.
    pub echo: bool,
    /// Username, if authenticating with user/password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Password, if authenticating with user/password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    /// Token, if authenticating with a token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl ConnectInfo {
    /// Non-verbose options for a client called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            verbose: false,
            pedantic: false,
            name: name.into(),
            lang: "rust",
            version: env!("CARGO_PKG_VERSION"),
            protocol: 1,
            echo: true,
            user: None,
            pass: None,
            auth_token: None,
        }
    }
}

/// Operations sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerOp {
    /// Server details, sent on connect and on cluster changes.
    Info(Box<ServerInfo>),
    /// A delivered message.
    Msg {
        /// Subject it was published on.
        subject: String,
        /// Subscription it matched.
        sid: u64,
        /// Reply subject, if any.
        reply_to: Option<String>,
        /// Payload.
        payload: Bytes,
    },
    /// Keep-alive request.
    Ping,
    /// Keep-alive response.
    Pong,
    /// Acknowledgement in verbose mode.
    Ok,
    /// Error; the server may close the connection afterwards.
    Err(String),
}

/// Operations sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOp {
    /// Handshake options.
    Connect(Box<ConnectInfo>),
    /// Publish a payload.
    Pub {
        /// Target subject.
        subject: String,
        /// Payload.
        payload: Bytes,
    },
    /// Register interest in a subject.
    Sub {
        /// Subject, may contain wildcards.
        subject: String,
        /// Queue group, if any.
        queue_group: Option<String>,
        /// Client-chosen subscription id.
        sid: u64,
    },
    /// Remove interest.
    Unsub {
        /// Subscription id.
        sid: u64,
    },
    /// Keep-alive request.
    Ping,
    /// Keep-alive response.
    Pong,
}

/// `-ERR` messages after which the server closes the connection and
/// reconnecting with the same credentials cannot help.
#[must_use]
pub fn is_auth_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("authorization violation") || lower.contains("authentication")
}

// =============================================================================
// Codec
// =============================================================================

/// Framing codec for the NATS client protocol.
#[derive(Debug, Clone, Copy)]
pub struct NatsCodec {
    max_payload: usize,
}

impl NatsCodec {
    /// Create a new codec accepting payloads up to [`DEFAULT_MAX_PAYLOAD`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Limit inbound payloads to the size the server announced in `INFO`.
    ///
    /// Zero leaves the current limit in place.
    pub const fn set_max_payload(&mut self, max_payload: usize) {
        if max_payload > 0 {
            self.max_payload = max_payload;
        }
    }

    /// Largest payload accepted in a `MSG` frame.
    #[must_use]
    pub const fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for NatsCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_sid(token: &str) -> Result<u64, CodecError> {
    token
        .parse()
        .map_err(|_| CodecError::InvalidFrame(format!("invalid sid '{token}'")))
}

fn parse_len(token: &str) -> Result<usize, CodecError> {
    token
        .parse()
        .map_err(|_| CodecError::InvalidFrame(format!("invalid payload length '{token}'")))
}

impl Decoder for NatsCodec {
    type Item = ServerOp;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(line_end) = src.windows(2).position(|w| w == CRLF) else {
            if src.len() > MAX_CONTROL_LINE {
                return Err(CodecError::ControlLineTooLong);
            }
            return Ok(None);
        };

        let line = String::from_utf8_lossy(&src[..line_end]).into_owned();
        let (op, args) = line
            .split_once([' ', '\t'])
            .map_or((line.as_str(), ""), |(op, rest)| (op, rest.trim()));

        let frame = match op.to_ascii_uppercase().as_str() {
            "MSG" => {
                let tokens: Vec<&str> = args.split_ascii_whitespace().collect();
                let (subject, sid, reply_to, len) = match tokens.as_slice() {
                    [subject, sid, len] => (*subject, parse_sid(sid)?, None, parse_len(len)?),
                    [subject, sid, reply, len] => (
                        *subject,
                        parse_sid(sid)?,
                        Some((*reply).to_string()),
                        parse_len(len)?,
                    ),
                    _ => return Err(CodecError::InvalidFrame(format!("MSG {args}"))),
                };

                if len > self.max_payload {
                    return Err(CodecError::InvalidFrame(format!(
                        "payload of {len} bytes exceeds limit of {}",
                        self.max_payload
                    )));
                }

                let payload_start = line_end + CRLF.len();
                let Some(frame_end) = payload_start
                    .checked_add(len)
                    .and_then(|end| end.checked_add(CRLF.len()))
                else {
                    return Err(CodecError::InvalidFrame(format!(
                        "payload length {len} overflows"
                    )));
                };
                if src.len() < frame_end {
                    src.reserve(frame_end - src.len());
                    return Ok(None);
                }
                if &src[frame_end - CRLF.len()..frame_end] != CRLF {
                    return Err(CodecError::InvalidFrame(
                        "payload not terminated by CRLF".into(),
                    ));
                }

                let subject = subject.to_string();
                src.advance(payload_start);
                let payload = src.split_to(len).freeze();
                src.advance(CRLF.len());

                return Ok(Some(ServerOp::Msg {
                    subject,
                    sid,
                    reply_to,
                    payload,
                }));
            }
            "INFO" => ServerOp::Info(Box::new(serde_json::from_str(args)?)),
            "PING" => ServerOp::Ping,
            "PONG" => ServerOp::Pong,
            "+OK" => ServerOp::Ok,
            "-ERR" => ServerOp::Err(args.trim_matches('\'').to_string()),
            other => return Err(CodecError::UnknownOperation(other.to_string())),
        };

        src.advance(line_end + CRLF.len());
        Ok(Some(frame))
    }
}

impl Encoder<ClientOp> for NatsCodec {
    type Error = CodecError;

    fn encode(&mut self, item: ClientOp, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            ClientOp::Connect(info) => {
                dst.put_slice(b"CONNECT ");
                dst.put_slice(&serde_json::to_vec(&info)?);
            }
            ClientOp::Pub { subject, payload } => {
                dst.reserve(subject.len() + payload.len() + 32);
                dst.put_slice(format!("PUB {subject} {}\r\n", payload.len()).as_bytes());
                dst.put_slice(&payload);
            }
            ClientOp::Sub {
                subject,
                queue_group,
                sid,
            } => {
                let line = match queue_group {
                    Some(group) => format!("SUB {subject} {group} {sid}"),
                    None => format!("SUB {subject} {sid}"),
                };
                dst.put_slice(line.as_bytes());
            }
            ClientOp::Unsub { sid } => dst.put_slice(format!("UNSUB {sid}").as_bytes()),
            ClientOp::Ping => dst.put_slice(b"PING"),
            ClientOp::Pong => dst.put_slice(b"PONG"),
        }
        dst.put_slice(CRLF);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<ServerOp> {
        let mut codec = NatsCodec::new();
        let mut buf = BytesMut::from(input);
        let mut ops = Vec::new();
        while let Some(op) = codec.decode(&mut buf).unwrap() {
            ops.push(op);
        }
        assert!(buf.is_empty(), "left over: {buf:?}");
        ops
    }

    fn encode(op: ClientOp) -> String {
        let mut buf = BytesMut::new();
        NatsCodec::new().encode(op, &mut buf).unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn decodes_control_ops() {
        let ops = decode_all(b"PING\r\nPONG\r\n+OK\r\n-ERR 'Authorization Violation'\r\n");
        assert_eq!(
            ops,
            vec![
                ServerOp::Ping,
                ServerOp::Pong,
                ServerOp::Ok,
                ServerOp::Err("Authorization Violation".into()),
            ]
        );
    }

    #[test]
    fn decodes_info() {
        let ops = decode_all(
            b"INFO {\"server_id\":\"abc\",\"version\":\"2.10.0\",\"max_payload\":1048576,\"headers\":true}\r\n",
        );
        let ServerOp::Info(info) = &ops[0] else {
            panic!("expected INFO, got {ops:?}");
        };
        assert_eq!(info.server_id, "abc");
        assert_eq!(info.max_payload, 1_048_576);
        assert!(!info.auth_required);
    }

    #[test]
    fn decodes_msg_with_and_without_reply() {
        let ops = decode_all(b"MSG quotes.update 7 5\r\nhello\r\nMSG a.b 9 _INBOX.x 2\r\nhi\r\n");
        assert_eq!(
            ops,
            vec![
                ServerOp::Msg {
                    subject: "quotes.update".into(),
                    sid: 7,
                    reply_to: None,
                    payload: Bytes::from_static(b"hello"),
                },
                ServerOp::Msg {
                    subject: "a.b".into(),
                    sid: 9,
                    reply_to: Some("_INBOX.x".into()),
                    payload: Bytes::from_static(b"hi"),
                },
            ]
        );
    }

    #[test]
    fn payload_may_contain_crlf() {
        let ops = decode_all(b"MSG s 1 4\r\n\r\n\r\n\r\n");
        assert_eq!(
            ops,
            vec![ServerOp::Msg {
                subject: "s".into(),
                sid: 1,
                reply_to: None,
                payload: Bytes::from_static(b"\r\n\r\n"),
            }]
        );
    }

    #[test]
    fn reassembles_split_frames() {
        let wire: &[u8] = b"MSG quotes.update 1 11\r\n{\"price\":1}\r\nPING\r\n";
        let mut codec = NatsCodec::new();
        let mut buf = BytesMut::new();
        let mut ops = Vec::new();

        for chunk in wire.chunks(3) {
            buf.extend_from_slice(chunk);
            while let Some(op) = codec.decode(&mut buf).unwrap() {
                ops.push(op);
            }
        }

        assert_eq!(ops.len(), 2);
        assert!(
            matches!(&ops[0], ServerOp::Msg { payload, .. } if payload.as_ref() == b"{\"price\":1}")
        );
        assert_eq!(ops[1], ServerOp::Ping);
    }

    #[test]
    fn operations_are_case_insensitive() {
        assert_eq!(decode_all(b"ping\r\n"), vec![ServerOp::Ping]);
    }

    #[test]
    fn rejects_unknown_operation() {
        let mut buf = BytesMut::from(&b"HELLO world\r\n"[..]);
        assert!(matches!(
            NatsCodec::new().decode(&mut buf),
            Err(CodecError::UnknownOperation(op)) if op == "HELLO"
        ));
    }

    #[test]
    fn rejects_bad_payload_terminator() {
        let mut buf = BytesMut::from(&b"MSG s 1 2\r\nhiXX"[..]);
        assert!(matches!(
            NatsCodec::new().decode(&mut buf),
            Err(CodecError::InvalidFrame(_))
        ));
    }

    #[test]
    fn rejects_payload_above_limit() {
        let mut buf = BytesMut::from(&b"MSG s 1 18446744073709551615\r\n"[..]);
        assert!(matches!(
            NatsCodec::new().decode(&mut buf),
            Err(CodecError::InvalidFrame(msg)) if msg.contains("exceeds limit")
        ));
        assert!(buf.capacity() < 1024 * 1024);
    }

    #[test]
    fn announced_max_payload_applies() {
        let mut codec = NatsCodec::new();
        codec.set_max_payload(4);
        assert_eq!(codec.max_payload(), 4);

        let mut buf = BytesMut::from(&b"MSG s 1 4\r\nfour\r\nMSG s 1 5\r\nfive!\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Ok(Some(ServerOp::Msg { payload, .. })) if &payload[..] == b"four"
        ));
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::InvalidFrame(_))
        ));

        codec.set_max_payload(0);
        assert_eq!(codec.max_payload(), 4);
    }

    #[test]
    fn rejects_oversized_control_line() {
        let mut buf = BytesMut::from(vec![b'A'; MAX_CONTROL_LINE + 1].as_slice());
        assert!(matches!(
            NatsCodec::new().decode(&mut buf),
            Err(CodecError::ControlLineTooLong)
        ));
    }

    #[test]
    fn encodes_client_ops() {
        assert_eq!(
            encode(ClientOp::Pub {
                subject: "quotes.update".into(),
                payload: Bytes::from_static(b"{}"),
            }),
            "PUB quotes.update 2\r\n{}\r\n"
        );
        assert_eq!(
            encode(ClientOp::Sub {
                subject: "quotes.update".into(),
                queue_group: Some("quote-consumers".into()),
                sid: 3,
            }),
            "SUB quotes.update quote-consumers 3\r\n"
        );
        assert_eq!(
            encode(ClientOp::Sub {
                subject: "quotes.>".into(),
                queue_group: None,
                sid: 4,
            }),
            "SUB quotes.> 4\r\n"
        );
        assert_eq!(encode(ClientOp::Unsub { sid: 3 }), "UNSUB 3\r\n");
        assert_eq!(encode(ClientOp::Ping), "PING\r\n");
        assert_eq!(encode(ClientOp::Pong), "PONG\r\n");
    }

    #[test]
    fn encodes_connect_without_empty_credentials() {
        let line = encode(ClientOp::Connect(Box::new(ConnectInfo::new("quote-relay"))));
        assert!(line.starts_with("CONNECT {"));
        assert!(line.ends_with("}\r\n"));
        assert!(line.contains(r#""name":"quote-relay""#));
        assert!(line.contains(r#""verbose":false"#));
        assert!(!line.contains("auth_token"));
    }

    #[test]
    fn auth_errors_are_recognized() {
        assert!(is_auth_error("Authorization Violation"));
        assert!(is_auth_error("authentication timeout"));
        assert!(!is_auth_error("Permissions Violation for Publish to foo"));
        assert!(!is_auth_error("Stale Connection"));
    }
}
