/*
    protocol.rs - Line-oriented wire protocol

    One ASCII request per connection, whitespace-delimited tokens, raw
    reply bytes with no trailing delimiter. Both sides of the exchange
    live here: request parsing/encoding for the dispatcher and the
    outbound clients, and the reply grammars the reconciler consumes.

    Reply grammars:
      GET_ALL          (key ":" decimal_ts ";")*
      GET_MERKLE_ROOT  64 lowercase hex chars, or "EMPTY"
      GET_PATHS        (key "," hex_path ";")*
      GET_TS           value ":" decimal_ts, or "" when absent
*/

use crate::core_index::{Digest256, MerklePath};
use crate::core_store::{is_valid_key, is_valid_value, Timestamp};
use thiserror::Error;

pub const REPLY_OK: &str = "OK";
pub const REPLY_EMPTY_ROOT: &str = "EMPTY";
pub const REPLY_STALE_SET: &str = "ERROR: Outdated timestamp";
pub const REPLY_REJECTED_DEL: &str = "ERROR: Key not found or outdated timestamp";
pub const REPLY_UNKNOWN_COMMAND: &str = "Invalid command";
pub const REPLY_INVALID_ARGUMENTS: &str = "ERROR: Invalid command";

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Verb not recognised
    #[error("Unknown command")]
    UnknownCommand,

    /// Recognised verb with a malformed argument list
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// A peer reply did not match its grammar
    #[error("Malformed reply: {0}")]
    MalformedReply(String),
}

/// A parsed inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get { key: String },
    GetTs { key: String },
    Set { key: String, value: String },
    Del { key: String },
    PropagateSet { key: String, value: String, timestamp: Timestamp },
    PropagateDel { key: String, timestamp: Timestamp },
    GetAll,
    GetMerkleRoot,
    GetPaths { keys: Vec<String> },
}

impl Request {
    /// Parse one request line.
    pub fn parse(line: &str) -> Result<Request, ProtocolError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (&verb, args) = tokens
            .split_first()
            .ok_or(ProtocolError::UnknownCommand)?;

        match verb {
            "GET" => Ok(Request::Get {
                key: parse_key(args, 0)?,
            }),
            "GET_TS" => Ok(Request::GetTs {
                key: parse_key(args, 0)?,
            }),
            "SET" => {
                let key = parse_key(args, 0)?;
                let value = parse_value(args, 1)?;
                require_len(args, 2)?;
                Ok(Request::Set { key, value })
            }
            "DEL" => {
                let key = parse_key(args, 0)?;
                require_len(args, 1)?;
                Ok(Request::Del { key })
            }
            "PROPAGATE" => parse_propagate(args),
            "GET_ALL" => Ok(Request::GetAll),
            "GET_MERKLE_ROOT" => Ok(Request::GetMerkleRoot),
            "GET_PATHS" => Ok(Request::GetPaths {
                keys: args
                    .iter()
                    .flat_map(|blob| blob.split(';'))
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
                    .collect(),
            }),
            _ => Err(ProtocolError::UnknownCommand),
        }
    }

    /// Wire form of this request.
    pub fn encode(&self) -> String {
        match self {
            Request::Get { key } => format!("GET {}", key),
            Request::GetTs { key } => format!("GET_TS {}", key),
            Request::Set { key, value } => format!("SET {} {}", key, value),
            Request::Del { key } => format!("DEL {}", key),
            Request::PropagateSet { key, value, timestamp } => {
                format!("PROPAGATE SET {} {} {}", key, value, timestamp)
            }
            Request::PropagateDel { key, timestamp } => {
                format!("PROPAGATE DEL {} {}", key, timestamp)
            }
            Request::GetAll => "GET_ALL".to_string(),
            Request::GetMerkleRoot => "GET_MERKLE_ROOT".to_string(),
            Request::GetPaths { keys } => {
                let mut out = String::from("GET_PATHS ");
                for key in keys {
                    out.push_str(key);
                    out.push(';');
                }
                out
            }
        }
    }
}

fn parse_propagate(args: &[&str]) -> Result<Request, ProtocolError> {
    let (&action, rest) = args
        .split_first()
        .ok_or_else(|| ProtocolError::InvalidArguments("PROPAGATE needs an action".into()))?;
    match action {
        "SET" => match rest {
            [key, value, ts] => Ok(Request::PropagateSet {
                key: key.to_string(),
                value: value.to_string(),
                timestamp: parse_timestamp(ts)?,
            }),
            _ => Err(ProtocolError::InvalidArguments(
                "PROPAGATE SET expects key value timestamp".into(),
            )),
        },
        // The delete payload may carry a vestigial value token between
        // the key and the timestamp.
        "DEL" => match rest {
            [key, ts] | [key, _, ts] => Ok(Request::PropagateDel {
                key: key.to_string(),
                timestamp: parse_timestamp(ts)?,
            }),
            _ => Err(ProtocolError::InvalidArguments(
                "PROPAGATE DEL expects key [value] timestamp".into(),
            )),
        },
        other => Err(ProtocolError::InvalidArguments(format!(
            "unknown PROPAGATE action {}",
            other
        ))),
    }
}

fn parse_key(args: &[&str], position: usize) -> Result<String, ProtocolError> {
    let key = args
        .get(position)
        .ok_or_else(|| ProtocolError::InvalidArguments("missing key".into()))?;
    if !is_valid_key(key) {
        return Err(ProtocolError::InvalidArguments(format!("invalid key {:?}", key)));
    }
    Ok(key.to_string())
}

fn parse_value(args: &[&str], position: usize) -> Result<String, ProtocolError> {
    let value = args
        .get(position)
        .ok_or_else(|| ProtocolError::InvalidArguments("missing value".into()))?;
    if !is_valid_value(value) {
        return Err(ProtocolError::InvalidArguments(format!(
            "invalid value {:?}",
            value
        )));
    }
    Ok(value.to_string())
}

fn parse_timestamp(token: &str) -> Result<Timestamp, ProtocolError> {
    token
        .parse::<u64>()
        .map(Timestamp::from_millis)
        .map_err(|_| ProtocolError::InvalidArguments(format!("invalid timestamp {:?}", token)))
}

fn require_len(args: &[&str], len: usize) -> Result<(), ProtocolError> {
    if args.len() == len {
        Ok(())
    } else {
        Err(ProtocolError::InvalidArguments(format!(
            "expected {} arguments, got {}",
            len,
            args.len()
        )))
    }
}

/// `GET_ALL` reply: `key:ts;` per entry, empty string for an empty store.
pub fn format_key_timestamps(pairs: &[(String, Timestamp)]) -> String {
    let mut out = String::new();
    for (key, ts) in pairs {
        out.push_str(key);
        out.push(':');
        out.push_str(&ts.to_string());
        out.push(';');
    }
    out
}

pub fn parse_key_timestamps(reply: &str) -> Result<Vec<(String, Timestamp)>, ProtocolError> {
    let mut out = Vec::new();
    for segment in reply.split(';').filter(|s| !s.is_empty()) {
        let (key, ts) = segment.split_once(':').ok_or_else(|| {
            ProtocolError::MalformedReply(format!("missing ':' in segment {:?}", segment))
        })?;
        let ts = ts.parse::<u64>().map_err(|_| {
            ProtocolError::MalformedReply(format!("bad timestamp in segment {:?}", segment))
        })?;
        out.push((key.to_string(), Timestamp::from_millis(ts)));
    }
    Ok(out)
}

/// `GET_PATHS` reply: `key,hex_path;` per present key.
pub fn format_paths(paths: &[(String, MerklePath)]) -> String {
    let mut out = String::new();
    for (key, path) in paths {
        out.push_str(key);
        out.push(',');
        out.push_str(&hex::encode(path.to_bytes()));
        out.push(';');
    }
    out
}

pub fn parse_paths(reply: &str) -> Result<Vec<(String, MerklePath)>, ProtocolError> {
    let mut out = Vec::new();
    for segment in reply.split(';').filter(|s| !s.is_empty()) {
        let (key, hex_path) = segment.split_once(',').ok_or_else(|| {
            ProtocolError::MalformedReply(format!("missing ',' in segment {:?}", segment))
        })?;
        let bytes = hex::decode(hex_path).map_err(|e| {
            ProtocolError::MalformedReply(format!("bad hex for key {}: {}", key, e))
        })?;
        let path = MerklePath::from_bytes(&bytes)
            .map_err(|e| ProtocolError::MalformedReply(e.to_string()))?;
        out.push((key.to_string(), path));
    }
    Ok(out)
}

/// `GET_MERKLE_ROOT` reply. `None` means the peer's index is empty,
/// either the literal `EMPTY` or the all-zero root.
pub fn parse_root(reply: &str) -> Result<Option<Digest256>, ProtocolError> {
    if reply == REPLY_EMPTY_ROOT {
        return Ok(None);
    }
    let root = Digest256::from_hex(reply)
        .ok_or_else(|| ProtocolError::MalformedReply(format!("bad root {:?}", reply)))?;
    Ok(if root.is_zero() { None } else { Some(root) })
}

/// `GET_TS` reply: `value:ts`, empty when the key is absent.
pub fn format_value_timestamp(value: &str, timestamp: Timestamp) -> String {
    format!("{}:{}", value, timestamp)
}

pub fn parse_value_timestamp(reply: &str) -> Result<Option<(String, Timestamp)>, ProtocolError> {
    if reply.is_empty() {
        return Ok(None);
    }
    let (value, ts) = reply.rsplit_once(':').ok_or_else(|| {
        ProtocolError::MalformedReply(format!("missing ':' in {:?}", reply))
    })?;
    let ts = ts
        .parse::<u64>()
        .map_err(|_| ProtocolError::MalformedReply(format!("bad timestamp in {:?}", reply)))?;
    Ok(Some((value.to_string(), Timestamp::from_millis(ts))))
}
