//! Wire protocol message types and framing.
//!
//! A request is one UTF-8 JSON object terminated by `\n`. Binary `value`
//! fields travel as standard base64 strings so the node (which unmarshals
//! byte slices from base64) and this client agree on the encoding.
//!
//! A response is read as exactly one frame: up to the first `\n`, or an
//! already complete JSON document for peers that close without a newline, or
//! whatever arrived before the read deadline.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dldht_types::{DhtError, DhtResult};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

/// Maximum size of a single response frame (16 MB value, base64-inflated, plus envelope).
pub const MAX_FRAME_SIZE: usize = 24 * 1024 * 1024;

/// Remote error text that `get` treats as an absent key.
pub const NOT_FOUND: &str = "not found";

/// RPC operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Fetch a value.
    Get,
    /// Store a value.
    Put,
    /// Delete a value.
    Del,
    /// Node status.
    Status,
}

impl Op {
    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Get => "get",
            Op::Put => "put",
            Op::Del => "del",
            Op::Status => "status",
        }
    }
}

/// A single request to the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcRequest {
    /// Operation.
    pub op: Op,
    /// Target key (absent for `status`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Time-to-live in seconds (omitted when zero).
    #[serde(skip_serializing_if = "ttl_absent")]
    pub ttl: Option<u64>,
    /// Value bytes, base64 on the wire.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_base64"
    )]
    pub value: Option<Vec<u8>>,
}

fn ttl_absent(ttl: &Option<u64>) -> bool {
    matches!(ttl, None | Some(0))
}

fn serialize_base64<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(bytes) => s.serialize_str(&BASE64.encode(bytes)),
        None => s.serialize_none(),
    }
}

impl RpcRequest {
    /// `{"op":"get","key":...}`
    pub fn get(key: &str) -> Self {
        Self {
            op: Op::Get,
            key: Some(key.to_string()),
            ttl: None,
            value: None,
        }
    }

    /// `{"op":"put","key":...,"ttl":...,"value":...}`
    pub fn put(key: &str, value: Vec<u8>, ttl_secs: u64) -> Self {
        Self {
            op: Op::Put,
            key: Some(key.to_string()),
            ttl: Some(ttl_secs),
            value: Some(value),
        }
    }

    /// `{"op":"del","key":...}`
    pub fn del(key: &str) -> Self {
        Self {
            op: Op::Del,
            key: Some(key.to_string()),
            ttl: None,
            value: None,
        }
    }

    /// `{"op":"status"}`
    pub fn status() -> Self {
        Self {
            op: Op::Status,
            key: None,
            ttl: None,
            value: None,
        }
    }
}

/// Encode a request as one newline-terminated JSON line.
pub fn encode_request(req: &RpcRequest) -> DhtResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec(req)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// The `value` field of a response.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseValue {
    /// No `value` key at all.
    #[default]
    Absent,
    /// A base64 string, decoded.
    Bytes(Vec<u8>),
    /// Present but not a string (e.g. `null` or an object).
    Other(Value),
}

/// A decoded response frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RpcResponse {
    /// Non-empty when the node reports a failure.
    pub err: Option<String>,
    /// Payload.
    pub value: ResponseValue,
    /// Every other field, kept for `status`.
    pub fields: Map<String, Value>,
}

impl RpcResponse {
    /// The error text, if the node reported one.
    pub fn error(&self) -> Option<&str> {
        self.err.as_deref().filter(|e| !e.is_empty())
    }

    /// Interpret this response according to the operation that produced it.
    pub fn into_reply(self, op: Op, key: Option<&str>) -> DhtResult<Reply> {
        let key = key.unwrap_or_default();
        let failure = self.error().map(str::to_string);
        match (op, failure.as_deref()) {
            (Op::Get, Some(NOT_FOUND)) => Ok(Reply::Value(None)),
            (Op::Put | Op::Del, Some(NOT_FOUND)) => Err(DhtError::NotFound(key.to_string())),
            (_, Some(e)) => Err(DhtError::Remote(e.to_string())),
            (Op::Get, None) => match self.value {
                ResponseValue::Bytes(b) => Ok(Reply::Value(Some(b))),
                _ => Ok(Reply::Value(None)),
            },
            (Op::Put | Op::Del, None) => Ok(Reply::Ack),
            (Op::Status, None) => self.into_status().map(Reply::Status),
        }
    }

    fn into_status(self) -> DhtResult<Value> {
        match self.value {
            ResponseValue::Bytes(b) => {
                let text = String::from_utf8(b)
                    .map_err(|e| DhtError::Protocol(format!("status value is not UTF-8: {e}")))?;
                let text = text.trim();
                if text.is_empty() {
                    Ok(Value::Object(Map::new()))
                } else {
                    Ok(serde_json::from_str(text)?)
                }
            }
            ResponseValue::Absent => {
                let mut fields = self.fields;
                if let Some(e) = self.err {
                    fields.insert("err".to_string(), Value::String(e));
                }
                Ok(Value::Object(fields))
            }
            ResponseValue::Other(_) => Ok(Value::Object(Map::new())),
        }
    }
}

/// Operation-specific result of one RPC.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `put`/`del` succeeded.
    Ack,
    /// `get` result; `None` when the key does not exist.
    Value(Option<Vec<u8>>),
    /// `status` document.
    Status(Value),
}

/// Decode frame text into a response.
///
/// Trailing NUL padding and surrounding whitespace are stripped; an empty
/// frame is an empty success. A string `value` at the top level is decoded
/// from base64; `value` keys nested inside other fields are kept as sent.
pub fn decode_response(frame: &str) -> DhtResult<RpcResponse> {
    let clean = frame.trim_end_matches('\0').trim();
    if clean.is_empty() {
        return Ok(RpcResponse::default());
    }

    let mut fields = match serde_json::from_str::<Value>(clean)? {
        Value::Object(map) => map,
        other => {
            return Err(DhtError::Protocol(format!(
                "expected a JSON object, got {}",
                preview(&other.to_string())
            )))
        }
    };

    let err = match fields.remove("err") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    };
    let value = match fields.remove("value") {
        None => ResponseValue::Absent,
        Some(Value::String(s)) => ResponseValue::Bytes(
            BASE64
                .decode(s.as_bytes())
                .map_err(|e| DhtError::Protocol(format!("value is not valid base64: {e}")))?,
        ),
        Some(other) => ResponseValue::Other(other),
    };

    Ok(RpcResponse { err, value, fields })
}

/// Read exactly one response frame.
///
/// Returns at the first `\n` (excluded), as soon as the buffer holds a
/// complete JSON object or array, at end of stream, or when `deadline`
/// passes, whichever comes first. The returned text may be empty.
pub async fn read_frame<R>(reader: &mut R, deadline: Instant, max: usize) -> DhtResult<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        let n = match tokio::time::timeout_at(deadline, reader.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(DhtError::Io(e)),
            Err(_) => break,
        };
        let scan_from = buf.len();
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = buf[scan_from..].iter().position(|b| *b == b'\n') {
            buf.truncate(scan_from + pos);
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
        if buf.len() > max {
            return Err(DhtError::Protocol(format!(
                "response frame exceeds {max} bytes"
            )));
        }
        let text = String::from_utf8_lossy(&buf);
        if looks_like_complete_json(&text) {
            return Ok(text.into_owned());
        }
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Whether `s` is, trimmed, a complete JSON object or array.
pub fn looks_like_complete_json(s: &str) -> bool {
    let t = s.trim();
    let bracketed = (t.starts_with('{') && t.ends_with('}'))
        || (t.starts_with('[') && t.ends_with(']'));
    bracketed && serde_json::from_str::<serde::de::IgnoredAny>(t).is_ok()
}

/// Shorten frame text for log output.
pub fn preview(s: &str) -> String {
    let cut: String = s.chars().take(160).collect();
    let t = if cut.len() < s.len() {
        format!("{cut}...")
    } else {
        cut
    };
    t.replace('\n', "\\n")
}
