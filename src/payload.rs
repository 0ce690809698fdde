//! Typed encoders/decoders for frame payloads.
//!
//! Payloads are ASCII fields joined by `&`.  Instead of splitting strings by
//! hand at every call site, each message is a struct implementing
//! [`Payload`], which declares its field names once and converts to and from
//! the positional field list.  The outer frame format is untouched.

use std::str::FromStr;

use crate::category::Category;
use crate::error::PayloadError;
use crate::frame::MAX_DATA_LEN;
use crate::registry::Endpoint;

/// Field separator inside a payload.
pub const SEPARATOR: char = '&';

/// Coordinator's negative reply to a malformed connect request.
pub const CON_KO: &str = "CON_KO";
/// No worker of the requested category is registered.
pub const DISTORT_KO: &str = "DISTORT_KO";
/// The requested category does not exist.
pub const MEDIA_KO: &str = "MEDIA_KO";

/// A message carried in the data field of a frame.
pub trait Payload: Sized {
    /// Human name used in error messages.
    const NAME: &'static str;
    /// Field names, in wire order.
    const FIELDS: &'static [&'static str];

    fn to_fields(&self) -> Vec<String>;

    /// Build from exactly `FIELDS.len()` non-empty fields.
    fn from_fields(fields: &[&str]) -> Result<Self, PayloadError>;

    fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        join(Self::NAME, Self::FIELDS, &self.to_fields())
    }

    fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        let fields = split(Self::NAME, Self::FIELDS, data)?;
        Self::from_fields(&fields)
    }
}

/// Split `data` into exactly `names.len()` non-empty fields.
pub fn split<'a>(
    message: &'static str,
    names: &'static [&'static str],
    data: &'a [u8],
) -> Result<Vec<&'a str>, PayloadError> {
    let text = std::str::from_utf8(data).map_err(|_| PayloadError::NotUtf8)?;
    let text = text.trim_end_matches('\0');
    let fields: Vec<&str> = text.split(SEPARATOR).collect();
    if fields.len() != names.len() {
        return Err(PayloadError::FieldCount {
            message,
            expected: names.len(),
            actual: fields.len(),
        });
    }
    if let Some(i) = fields.iter().position(|f| f.is_empty()) {
        return Err(PayloadError::EmptyField {
            message,
            field: names[i],
        });
    }
    Ok(fields)
}

/// Join fields with the separator, refusing anything that would not parse back.
pub fn join(
    message: &'static str,
    names: &'static [&'static str],
    fields: &[String],
) -> Result<Vec<u8>, PayloadError> {
    for (name, value) in names.iter().copied().zip(fields) {
        if value.is_empty() {
            return Err(PayloadError::EmptyField {
                message,
                field: name,
            });
        }
        if value.contains(SEPARATOR) {
            return Err(PayloadError::SeparatorInField { field: name });
        }
    }
    let out = fields.join("&").into_bytes();
    if out.len() > MAX_DATA_LEN {
        return Err(PayloadError::TooLong {
            len: out.len(),
            max: MAX_DATA_LEN,
        });
    }
    Ok(out)
}

/// Parse a TCP port in `1..=65535`.
pub fn parse_port(field: &'static str, value: &str) -> Result<u16, PayloadError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(PayloadError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// `0x01` payload: `username&ip&port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub username: String,
    pub ip: String,
    pub port: u16,
}

impl Payload for ConnectRequest {
    const NAME: &'static str = "connect";
    const FIELDS: &'static [&'static str] = &["username", "ip", "port"];

    fn to_fields(&self) -> Vec<String> {
        vec![self.username.clone(), self.ip.clone(), self.port.to_string()]
    }

    fn from_fields(fields: &[&str]) -> Result<Self, PayloadError> {
        Ok(Self {
            username: fields[0].to_string(),
            ip: fields[1].to_string(),
            port: parse_port("port", fields[2])?,
        })
    }
}

/// `0x02` payload: `category&ip&port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRegistration {
    pub category: Category,
    pub ip: String,
    pub port: u16,
}

impl Payload for WorkerRegistration {
    const NAME: &'static str = "worker registration";
    const FIELDS: &'static [&'static str] = &["category", "ip", "port"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.category.to_string(),
            self.ip.clone(),
            self.port.to_string(),
        ]
    }

    fn from_fields(fields: &[&str]) -> Result<Self, PayloadError> {
        Ok(Self {
            category: Category::from_str(fields[0])?,
            ip: fields[1].to_string(),
            port: parse_port("port", fields[2])?,
        })
    }
}

/// `0x10` request payload: `category&fileName`.
///
/// The category is kept as raw text so the coordinator can tell an unknown
/// category (`MEDIA_KO`) apart from a payload that does not parse at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistortRequest {
    pub media_type: String,
    pub file_name: String,
}

impl DistortRequest {
    pub fn new(category: Category, file_name: impl Into<String>) -> Self {
        Self {
            media_type: category.to_string(),
            file_name: file_name.into(),
        }
    }

    pub fn category(&self) -> Result<Category, PayloadError> {
        self.media_type.parse()
    }
}

impl Payload for DistortRequest {
    const NAME: &'static str = "distortion request";
    const FIELDS: &'static [&'static str] = &["mediaType", "fileName"];

    fn to_fields(&self) -> Vec<String> {
        vec![self.media_type.clone(), self.file_name.clone()]
    }

    fn from_fields(fields: &[&str]) -> Result<Self, PayloadError> {
        Ok(Self {
            media_type: fields[0].to_string(),
            file_name: fields[1].to_string(),
        })
    }
}

/// `ip&port` redirection to a worker.
impl Payload for Endpoint {
    const NAME: &'static str = "redirect";
    const FIELDS: &'static [&'static str] = &["ip", "port"];

    fn to_fields(&self) -> Vec<String> {
        vec![self.ip.clone(), self.port.to_string()]
    }

    fn from_fields(fields: &[&str]) -> Result<Self, PayloadError> {
        Ok(Endpoint::new(fields[0], parse_port("port", fields[1])?))
    }
}

/// Coordinator's answer to a `0x10` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistortReply {
    Worker(Endpoint),
    NoWorker,
    UnknownMedia,
}

impl DistortReply {
    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        match self {
            DistortReply::Worker(endpoint) => endpoint.encode(),
            DistortReply::NoWorker => Ok(DISTORT_KO.as_bytes().to_vec()),
            DistortReply::UnknownMedia => Ok(MEDIA_KO.as_bytes().to_vec()),
        }
    }

    /// An empty payload is read as "no worker", like `DISTORT_KO`.
    pub fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        if data.is_empty() || data == DISTORT_KO.as_bytes() {
            return Ok(DistortReply::NoWorker);
        }
        if data == MEDIA_KO.as_bytes() {
            return Ok(DistortReply::UnknownMedia);
        }
        Endpoint::decode(data).map(DistortReply::Worker)
    }
}

/// `0x03` payload sent by a client straight to a worker:
/// `username&fileName&size&md5&factor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
    pub username: String,
    pub file_name: String,
    pub size: u64,
    pub md5: String,
    pub factor: String,
}

impl Payload for WorkerRequest {
    const NAME: &'static str = "worker request";
    const FIELDS: &'static [&'static str] = &["username", "fileName", "size", "md5", "factor"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.username.clone(),
            self.file_name.clone(),
            self.size.to_string(),
            self.md5.clone(),
            self.factor.clone(),
        ]
    }

    fn from_fields(fields: &[&str]) -> Result<Self, PayloadError> {
        let size = fields[2]
            .parse::<u64>()
            .map_err(|_| PayloadError::InvalidNumber {
                field: "size",
                value: fields[2].to_string(),
            })?;
        Ok(Self {
            username: fields[0].to_string(),
            file_name: fields[1].to_string(),
            size,
            md5: fields[3].to_string(),
            factor: fields[4].to_string(),
        })
    }
}
