//! Body descriptors and the encoder contract (spec §4.2).
//!
//! Each variant conforms to one operation: `serialize() -> (Bytes | Stream,
//! additional_headers)`. Streamed bodies return a factory so the loader can open a
//! fresh stream on `needNewBodyStream` without consuming the one already sent
//! (spec §4.3 "Stream refill").

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::HttpError;

/// A form value: a scalar, an array, or a nested map, matching the url-encoded form
/// contract in spec §4.2.
#[derive(Debug, Clone)]
pub enum FormValue {
    Text(String),
    Bool(bool),
    Array(Vec<FormValue>),
    Nested(BTreeMap<String, FormValue>),
}

impl From<&str> for FormValue {
    fn from(s: &str) -> Self {
        FormValue::Text(s.to_string())
    }
}

impl From<String> for FormValue {
    fn from(s: String) -> Self {
        FormValue::Text(s)
    }
}

impl From<bool> for FormValue {
    fn from(b: bool) -> Self {
        FormValue::Bool(b)
    }
}

/// Configuration for url-encoded form array/bool encoding (spec §4.2).
#[derive(Debug, Clone, Copy)]
pub struct FormEncodingOptions {
    /// `true` emits `k[]=v` repeated per element; `false` emits `k=v` repeated per
    /// element (both are RFC 3986 compliant, the choice is server-convention only).
    pub array_brackets: bool,
    /// `true` emits booleans as `true`/`false`; `false` emits `1`/`0`.
    pub bool_as_literal: bool,
}

impl Default for FormEncodingOptions {
    fn default() -> Self {
        Self {
            array_brackets: true,
            bool_as_literal: false,
        }
    }
}

/// A single part of a `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl MultipartPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            bytes: Bytes::from(value.into().into_bytes()),
        }
    }

    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            bytes: bytes.into(),
        }
    }
}

/// A factory that opens a fresh byte stream every time it's called. Required so the
/// loader can satisfy `needNewBodyStream` (spec §4.3) without reusing an
/// already-consumed stream.
pub type StreamFactory =
    Arc<dyn Fn() -> futures::stream::BoxStream<'static, std::io::Result<Bytes>> + Send + Sync>;

/// The declarative body of a [`crate::request::Request`] (spec §3.1, §4.2).
#[derive(Clone)]
pub enum BodyDescriptor {
    Empty,
    /// Raw bytes with a caller-chosen `Content-Type`.
    Bytes { bytes: Bytes, content_type: String },
    /// UTF-8 text, default `Content-Type: text/plain`.
    Text(String),
    /// `application/x-www-form-urlencoded`.
    FormUrlEncoded {
        fields: BTreeMap<String, FormValue>,
        options: FormEncodingOptions,
    },
    /// `multipart/form-data`; `boundary` overrides the generated one if set.
    Multipart {
        parts: Vec<MultipartPart>,
        boundary: Option<String>,
    },
    /// `application/json` from an already-materialized value (sorted keys by
    /// default to match spec §4.2's "JSON-from-opaque-object" contract).
    JsonValue {
        value: serde_json::Value,
        sort_keys: bool,
    },
    /// `application/json` from a `Serialize` payload ("JSON-from-encodable"). The
    /// closure defers serialization to `serialize()` time rather than forcing every
    /// caller to pre-convert into a `serde_json::Value`.
    JsonEncodable(Arc<dyn Fn() -> Result<Vec<u8>, serde_json::Error> + Send + Sync>),
    /// A caller-managed re-openable stream; consumed by `upload-stream` tasks.
    Stream {
        factory: StreamFactory,
        content_type: String,
        content_length: Option<u64>,
    },
}

impl std::fmt::Debug for BodyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyDescriptor::Empty => write!(f, "BodyDescriptor::Empty"),
            BodyDescriptor::Bytes { bytes, content_type } => f
                .debug_struct("BodyDescriptor::Bytes")
                .field("len", &bytes.len())
                .field("content_type", content_type)
                .finish(),
            BodyDescriptor::Text(s) => f
                .debug_tuple("BodyDescriptor::Text")
                .field(&s.len())
                .finish(),
            BodyDescriptor::FormUrlEncoded { fields, .. } => f
                .debug_struct("BodyDescriptor::FormUrlEncoded")
                .field("fields", &fields.len())
                .finish(),
            BodyDescriptor::Multipart { parts, .. } => f
                .debug_struct("BodyDescriptor::Multipart")
                .field("parts", &parts.len())
                .finish(),
            BodyDescriptor::JsonValue { .. } => write!(f, "BodyDescriptor::JsonValue"),
            BodyDescriptor::JsonEncodable(_) => write!(f, "BodyDescriptor::JsonEncodable"),
            BodyDescriptor::Stream { content_type, .. } => f
                .debug_struct("BodyDescriptor::Stream")
                .field("content_type", content_type)
                .finish(),
        }
    }
}

impl Default for BodyDescriptor {
    fn default() -> Self {
        BodyDescriptor::Empty
    }
}

/// The realized output of [`BodyDescriptor::serialize`]: either contiguous bytes or
/// a re-openable stream, per spec §4.1 "Body realization".
pub enum SerializedBody {
    Bytes(Bytes),
    Stream(StreamFactory),
}

impl BodyDescriptor {
    /// Builds a [`BodyDescriptor::JsonEncodable`] from any `Serialize` value,
    /// capturing it by clone so serialization happens lazily at `serialize()` time.
    pub fn json_encodable<T>(value: T) -> Self
    where
        T: serde::Serialize + Send + Sync + 'static,
    {
        BodyDescriptor::JsonEncodable(Arc::new(move || serde_json::to_vec(&value)))
    }

    /// Serializes this descriptor, returning the wire payload plus any headers the
    /// encoder contributes (e.g. `Content-Type`, `Content-Length`).
    pub fn serialize(&self) -> Result<(SerializedBody, HeaderMap), HttpError> {
        let mut headers = HeaderMap::new();
        let body = match self {
            BodyDescriptor::Empty => SerializedBody::Bytes(Bytes::new()),
            BodyDescriptor::Bytes { bytes, content_type } => {
                insert_header(&mut headers, "content-type", content_type)?;
                SerializedBody::Bytes(bytes.clone())
            }
            BodyDescriptor::Text(s) => {
                insert_header(&mut headers, "content-type", "text/plain")?;
                SerializedBody::Bytes(Bytes::from(s.clone().into_bytes()))
            }
            BodyDescriptor::FormUrlEncoded { fields, options } => {
                insert_header(
                    &mut headers,
                    "content-type",
                    "application/x-www-form-urlencoded",
                )?;
                let encoded = encode_form(fields, *options);
                SerializedBody::Bytes(Bytes::from(encoded.into_bytes()))
            }
            BodyDescriptor::Multipart { parts, boundary } => {
                let boundary = boundary
                    .clone()
                    .unwrap_or_else(generate_boundary);
                let body = encode_multipart(parts, &boundary)?;
                insert_header(
                    &mut headers,
                    "content-type",
                    &format!("multipart/form-data; boundary={boundary}"),
                )?;
                insert_header(&mut headers, "content-length", &body.len().to_string())?;
                SerializedBody::Bytes(Bytes::from(body))
            }
            BodyDescriptor::JsonValue { value, sort_keys } => {
                insert_header(&mut headers, "content-type", "application/json")?;
                let bytes = if *sort_keys {
                    let sorted = sort_json_keys(value);
                    serde_json::to_vec(&sorted)
                } else {
                    serde_json::to_vec(value)
                }
                .map_err(|e| HttpError::JsonEncodingFailed {
                    message: e.to_string(),
                })?;
                SerializedBody::Bytes(Bytes::from(bytes))
            }
            BodyDescriptor::JsonEncodable(produce) => {
                insert_header(&mut headers, "content-type", "application/json")?;
                let out = produce().map_err(|e| HttpError::JsonEncodingFailed {
                    message: e.to_string(),
                })?;
                SerializedBody::Bytes(Bytes::from(out))
            }
            BodyDescriptor::Stream {
                factory,
                content_type,
                content_length,
            } => {
                insert_header(&mut headers, "content-type", content_type)?;
                if let Some(len) = content_length {
                    insert_header(&mut headers, "content-length", &len.to_string())?;
                }
                SerializedBody::Stream(factory.clone())
            }
        };
        Ok((body, headers))
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), HttpError> {
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| HttpError::UrlEncodingFailed {
        message: e.to_string(),
    })?;
    let value = HeaderValue::from_str(value).map_err(|e| HttpError::UrlEncodingFailed {
        message: e.to_string(),
    })?;
    headers.insert(name, value);
    Ok(())
}

fn sort_json_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), sort_json_keys(&map[&k]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_json_keys).collect())
        }
        other => other.clone(),
    }
}

/// Percent-encodes a form field using `urlencoding`, then restores `?` and `/`
/// (form bodies need not escape them, per spec §4.2) and turns escaped spaces
/// into `+`, matching `application/x-www-form-urlencoded` convention.
fn percent_encode(input: &str) -> String {
    urlencoding::encode(input)
        .replace("%20", "+")
        .replace("%3F", "?")
        .replace("%2F", "/")
}

fn encode_form(fields: &BTreeMap<String, FormValue>, options: FormEncodingOptions) -> String {
    let mut pairs = Vec::new();
    for (key, value) in fields {
        encode_form_value(key, value, options, &mut pairs);
    }
    pairs.join("&")
}

fn encode_form_value(
    key: &str,
    value: &FormValue,
    options: FormEncodingOptions,
    out: &mut Vec<String>,
) {
    match value {
        FormValue::Text(s) => out.push(format!("{}={}", percent_encode(key), percent_encode(s))),
        FormValue::Bool(b) => {
            let s = if options.bool_as_literal {
                if *b { "true" } else { "false" }
            } else if *b {
                "1"
            } else {
                "0"
            };
            out.push(format!("{}={}", percent_encode(key), s));
        }
        FormValue::Array(items) => {
            for item in items {
                let array_key = if options.array_brackets {
                    format!("{key}[]")
                } else {
                    key.to_string()
                };
                encode_form_value(&array_key, item, options, out);
            }
        }
        FormValue::Nested(map) => {
            let mut inner_keys: Vec<_> = map.keys().cloned().collect();
            inner_keys.sort();
            for inner_key in inner_keys {
                let nested_key = format!("{key}[{inner_key}]");
                encode_form_value(&nested_key, &map[&inner_key], options, out);
            }
        }
    }
}

/// Generates a random 64-bit hex boundary with a fixed prefix, per spec §4.2.
pub fn generate_boundary() -> String {
    let bits: u64 = rand::random();
    format!("wirekit.boundary.{bits:016x}")
}

fn encode_multipart(parts: &[MultipartPart], boundary: &str) -> Result<Vec<u8>, HttpError> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(b"--");
        out.extend_from_slice(boundary.as_bytes());
        out.extend_from_slice(b"\r\n");

        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(filename) = &part.filename {
            disposition.push_str(&format!("; filename=\"{filename}\""));
        }
        out.extend_from_slice(disposition.as_bytes());
        out.extend_from_slice(b"\r\n");

        if let Some(content_type) = &part.content_type {
            out.extend_from_slice(format!("Content-Type: {content_type}").as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&part.bytes);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"--");
    out.extend_from_slice(boundary.as_bytes());
    out.extend_from_slice(b"--\r\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_encoding_sorts_keys_ascending() {
        let mut fields = BTreeMap::new();
        fields.insert("zeta".to_string(), FormValue::from("1"));
        fields.insert("alpha".to_string(), FormValue::from("2"));
        let encoded = encode_form(&fields, FormEncodingOptions::default());
        assert_eq!(encoded, "alpha=2&zeta=1");
    }

    #[test]
    fn form_encoding_preserves_question_mark_and_slash() {
        let mut fields = BTreeMap::new();
        fields.insert("q".to_string(), FormValue::from("a/b?c"));
        let encoded = encode_form(&fields, FormEncodingOptions::default());
        assert_eq!(encoded, "q=a/b?c");
    }

    #[test]
    fn form_encoding_array_brackets_vs_flat() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "tag".to_string(),
            FormValue::Array(vec![FormValue::from("a"), FormValue::from("b")]),
        );
        let bracketed = encode_form(
            &fields,
            FormEncodingOptions {
                array_brackets: true,
                bool_as_literal: false,
            },
        );
        assert_eq!(bracketed, "tag[]=a&tag[]=b");

        let flat = encode_form(
            &fields,
            FormEncodingOptions {
                array_brackets: false,
                bool_as_literal: false,
            },
        );
        assert_eq!(flat, "tag=a&tag=b");
    }

    #[test]
    fn form_encoding_bool_modes() {
        let mut fields = BTreeMap::new();
        fields.insert("flag".to_string(), FormValue::Bool(true));
        let as_digit = encode_form(
            &fields,
            FormEncodingOptions {
                array_brackets: true,
                bool_as_literal: false,
            },
        );
        assert_eq!(as_digit, "flag=1");

        let as_literal = encode_form(
            &fields,
            FormEncodingOptions {
                array_brackets: true,
                bool_as_literal: true,
            },
        );
        assert_eq!(as_literal, "flag=true");
    }

    #[test]
    fn form_encoding_nested_map_flattens() {
        let mut inner = BTreeMap::new();
        inner.insert("city".to_string(), FormValue::from("nyc"));
        let mut fields = BTreeMap::new();
        fields.insert("address".to_string(), FormValue::Nested(inner));
        let encoded = encode_form(&fields, FormEncodingOptions::default());
        assert_eq!(encoded, "address[city]=nyc");
    }

    #[test]
    fn multipart_boundary_never_appears_in_payloads() {
        let boundary = generate_boundary();
        let parts = vec![MultipartPart::text("field", "hello world, not a boundary")];
        let encoded = encode_multipart(&parts, &boundary).unwrap();
        let body_only = {
            // Strip the boundary delimiter lines themselves before checking.
            let full = String::from_utf8_lossy(&encoded).to_string();
            full.lines()
                .filter(|l| !l.starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert!(!body_only.contains(&boundary));
    }

    #[test]
    fn multipart_round_trips_name_filename_content_type_and_bytes() {
        let boundary = "TESTBOUNDARY";
        let parts = vec![
            MultipartPart::text("field1", "value1"),
            MultipartPart::file("file1", "a.txt", "text/plain", "hello".as_bytes().to_vec()),
        ];
        let encoded = encode_multipart(&parts, boundary).unwrap();
        let text = String::from_utf8(encoded).unwrap();

        assert!(text.contains("name=\"field1\""));
        assert!(text.contains("value1"));
        assert!(text.contains("name=\"file1\""));
        assert!(text.contains("filename=\"a.txt\""));
        assert!(text.contains("Content-Type: text/plain"));
        assert!(text.ends_with("--TESTBOUNDARY--\r\n"));
    }

    #[test]
    fn json_value_sorts_keys_when_requested() {
        let value = serde_json::json!({"b": 1, "a": 2});
        let desc = BodyDescriptor::JsonValue {
            value,
            sort_keys: true,
        };
        let (body, headers) = desc.serialize().unwrap();
        assert_eq!(
            headers.get("content-type").unwrap(),
            "application/json"
        );
        let SerializedBody::Bytes(bytes) = body else {
            panic!("expected bytes");
        };
        assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), r#"{"a":2,"b":1}"#);
    }
}
