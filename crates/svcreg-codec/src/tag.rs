//! Tagged scalar buffers.
//!
//! Buffer layout:
//! ```text
//! [1 byte: tag][N bytes: payload]
//! ```
//! Integers are fixed-width big-endian at the tagged width. Timestamps are
//! `[8 bytes: secs i64 BE][4 bytes: nanos u32 BE]`. Messages carry their
//! canonical protobuf encoding. Maps are never tagged: they live in a nested
//! bucket one level down, which is why an empty value means "look there".

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{CodecError, CodecResult};
use crate::value::{MessageType, Value};

/// Type discriminant stored as the first byte of every flat field value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    String = 0x01,
    Bool = 0x02,
    Timestamp = 0x03,
    Message = 0x04,
    I8 = 0x10,
    I16 = 0x11,
    I32 = 0x12,
    I64 = 0x13,
    U8 = 0x20,
    U16 = 0x21,
    U32 = 0x22,
    U64 = 0x23,
}

impl Tag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => Self::String,
            0x02 => Self::Bool,
            0x03 => Self::Timestamp,
            0x04 => Self::Message,
            0x10 => Self::I8,
            0x11 => Self::I16,
            0x12 => Self::I32,
            0x13 => Self::I64,
            0x20 => Self::U8,
            0x21 => Self::U16,
            0x22 => Self::U32,
            0x23 => Self::U64,
            _ => return None,
        })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Tag used to encode `value`, or `None` for maps.
    pub fn of(value: &Value) -> Option<Self> {
        Some(match value {
            Value::String(_) => Self::String,
            Value::Bool(_) => Self::Bool,
            Value::I8(_) => Self::I8,
            Value::I16(_) => Self::I16,
            Value::I32(_) => Self::I32,
            Value::I64(_) => Self::I64,
            Value::U8(_) => Self::U8,
            Value::U16(_) => Self::U16,
            Value::U32(_) => Self::U32,
            Value::U64(_) => Self::U64,
            Value::Timestamp(_) => Self::Timestamp,
            Value::Message(_) => Self::Message,
            Value::Map(_) => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
            Self::Message => "message",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn tagged(tag: Tag, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(tag.as_byte());
    buf.extend_from_slice(payload);
    buf
}

/// Encode a scalar or message value into a tagged buffer.
///
/// Returns `None` for [`Value::Map`]; maps are written as nested buckets.
pub fn encode(value: &Value) -> Option<Vec<u8>> {
    let tag = Tag::of(value)?;
    let buf = match value {
        Value::String(s) => tagged(tag, s.as_bytes()),
        Value::Bool(b) => tagged(tag, &[u8::from(*b)]),
        Value::I8(v) => tagged(tag, &v.to_be_bytes()),
        Value::I16(v) => tagged(tag, &v.to_be_bytes()),
        Value::I32(v) => tagged(tag, &v.to_be_bytes()),
        Value::I64(v) => tagged(tag, &v.to_be_bytes()),
        Value::U8(v) => tagged(tag, &v.to_be_bytes()),
        Value::U16(v) => tagged(tag, &v.to_be_bytes()),
        Value::U32(v) => tagged(tag, &v.to_be_bytes()),
        Value::U64(v) => tagged(tag, &v.to_be_bytes()),
        Value::Timestamp(t) => {
            let mut payload = [0u8; 12];
            payload[..8].copy_from_slice(&t.timestamp().to_be_bytes());
            payload[8..].copy_from_slice(&t.timestamp_subsec_nanos().to_be_bytes());
            tagged(tag, &payload)
        }
        Value::Message(m) => tagged(tag, &m.encode()),
        Value::Map(_) => return None,
    };
    Some(buf)
}

fn fixed<const N: usize>(field: &str, tag: Tag, payload: &[u8]) -> CodecResult<[u8; N]> {
    payload.try_into().map_err(|_| CodecError::InvalidLength {
        field: field.to_string(),
        tag: tag.name(),
        expected: N,
        actual: payload.len(),
    })
}

/// Decode a tagged buffer, dispatching only on its first byte.
///
/// `message` supplies the concrete type for message tags. An unrecognised
/// tag is logged and yields `Ok(None)`, so data written by a newer shape
/// stays readable.
pub fn decode(field: &str, buf: &[u8], message: Option<MessageType>) -> CodecResult<Option<Value>> {
    let Some((&byte, payload)) = buf.split_first() else {
        return Err(CodecError::EmptyBuffer {
            field: field.to_string(),
        });
    };
    let Some(tag) = Tag::from_byte(byte) else {
        warn!(field, tag = byte, "unrecognized field tag; skipping");
        return Ok(None);
    };

    let value = match tag {
        Tag::String => {
            let s = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8 {
                field: field.to_string(),
            })?;
            Value::String(s.to_string())
        }
        Tag::Bool => match fixed::<1>(field, tag, payload)? {
            [0] => Value::Bool(false),
            [1] => Value::Bool(true),
            [other] => {
                return Err(CodecError::InvalidBool {
                    field: field.to_string(),
                    byte: other,
                })
            }
        },
        Tag::I8 => Value::I8(i8::from_be_bytes(fixed(field, tag, payload)?)),
        Tag::I16 => Value::I16(i16::from_be_bytes(fixed(field, tag, payload)?)),
        Tag::I32 => Value::I32(i32::from_be_bytes(fixed(field, tag, payload)?)),
        Tag::I64 => Value::I64(i64::from_be_bytes(fixed(field, tag, payload)?)),
        Tag::U8 => Value::U8(u8::from_be_bytes(fixed(field, tag, payload)?)),
        Tag::U16 => Value::U16(u16::from_be_bytes(fixed(field, tag, payload)?)),
        Tag::U32 => Value::U32(u32::from_be_bytes(fixed(field, tag, payload)?)),
        Tag::U64 => Value::U64(u64::from_be_bytes(fixed(field, tag, payload)?)),
        Tag::Timestamp => {
            let raw: [u8; 12] = fixed(field, tag, payload)?;
            let mut secs = [0u8; 8];
            let mut nanos = [0u8; 4];
            secs.copy_from_slice(&raw[..8]);
            nanos.copy_from_slice(&raw[8..]);
            let secs = i64::from_be_bytes(secs);
            let nanos = u32::from_be_bytes(nanos);
            let Some(t) = DateTime::<Utc>::from_timestamp(secs, nanos) else {
                return Err(CodecError::InvalidTimestamp {
                    field: field.to_string(),
                    secs,
                    nanos,
                });
            };
            Value::Timestamp(t)
        }
        Tag::Message => {
            let ty = message.ok_or_else(|| CodecError::MissingMessageType {
                field: field.to_string(),
            })?;
            let m = ty.decode(payload).map_err(|source| CodecError::Message {
                field: field.to_string(),
                source,
            })?;
            Value::Message(m)
        }
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Addr {
        #[prost(string, tag = "1")]
        host: String,
        #[prost(uint32, tag = "2")]
        port: u32,
    }

    fn roundtrip(v: Value) -> Value {
        let buf = encode(&v).expect("scalar encodes");
        decode("f", &buf, None).unwrap().expect("known tag")
    }

    // -----------------------------------------------------------------------
    // Scalars
    // -----------------------------------------------------------------------

    #[test]
    fn signed_extremes_roundtrip() {
        for v in [
            Value::I8(0),
            Value::I8(i8::MIN),
            Value::I8(i8::MAX),
            Value::I16(-1),
            Value::I16(i16::MAX),
            Value::I32(i32::MIN),
            Value::I32(0),
            Value::I64(i64::MIN),
            Value::I64(i64::MAX),
        ] {
            assert_eq!(roundtrip(v.clone()), v);
        }
    }

    #[test]
    fn unsigned_extremes_roundtrip() {
        for v in [
            Value::U8(0),
            Value::U8(u8::MAX),
            Value::U16(u16::MAX),
            Value::U32(0),
            Value::U32(u32::MAX),
            Value::U64(u64::MAX),
        ] {
            assert_eq!(roundtrip(v.clone()), v);
        }
    }

    #[test]
    fn width_is_preserved() {
        assert_eq!(roundtrip(Value::U16(7)), Value::U16(7));
        assert_ne!(roundtrip(Value::U16(7)), Value::U32(7));
        assert_eq!(encode(&Value::I32(1)).unwrap().len(), 5);
        assert_eq!(encode(&Value::I64(1)).unwrap().len(), 9);
    }

    #[test]
    fn strings_and_bools_roundtrip() {
        assert_eq!(roundtrip(Value::from("")), Value::from(""));
        assert_eq!(roundtrip(Value::from("héllo")), Value::from("héllo"));
        assert_eq!(roundtrip(Value::Bool(true)), Value::Bool(true));
        assert_eq!(roundtrip(Value::Bool(false)), Value::Bool(false));
    }

    #[test]
    fn empty_string_is_not_an_empty_buffer() {
        let buf = encode(&Value::from("")).unwrap();
        assert_eq!(buf, vec![Tag::String.as_byte()]);
    }

    #[test]
    fn timestamps_keep_nanoseconds() {
        let t = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(roundtrip(Value::Timestamp(t)), Value::Timestamp(t));
        let epoch = DateTime::<Utc>::default();
        assert_eq!(
            roundtrip(Value::Timestamp(epoch)),
            Value::Timestamp(epoch)
        );
        let before = DateTime::from_timestamp(-86_400, 5).unwrap();
        assert_eq!(
            roundtrip(Value::Timestamp(before)),
            Value::Timestamp(before)
        );
    }

    // -----------------------------------------------------------------------
    // Messages and maps
    // -----------------------------------------------------------------------

    #[test]
    fn message_roundtrip_with_target_type() {
        let v = Value::message(Addr {
            host: "10.0.0.1".into(),
            port: 8080,
        });
        let buf = encode(&v).unwrap();
        assert_eq!(buf[0], Tag::Message.as_byte());
        let ty = Some(MessageType::of::<Addr>());
        let back = decode("addr", &buf, ty).unwrap().unwrap();
        assert_eq!(back, v);
        assert_eq!(back.as_message::<Addr>().unwrap().port, 8080);
    }

    #[test]
    fn default_message_still_has_tag_byte() {
        let buf = encode(&Value::message(Addr::default())).unwrap();
        assert_eq!(buf, vec![Tag::Message.as_byte()]);
    }

    #[test]
    fn message_without_type_is_an_error() {
        let buf = encode(&Value::message(Addr::default())).unwrap();
        let err = decode("addr", &buf, None).unwrap_err();
        assert!(matches!(err, CodecError::MissingMessageType { .. }));
    }

    #[test]
    fn maps_are_not_tagged() {
        assert!(encode(&Value::Map(Default::default())).is_none());
    }

    // -----------------------------------------------------------------------
    // Malformed input
    // -----------------------------------------------------------------------

    #[test]
    fn empty_buffer_is_rejected() {
        assert!(matches!(
            decode("f", &[], None),
            Err(CodecError::EmptyBuffer { .. })
        ));
    }

    #[test]
    fn unknown_tag_is_a_soft_miss() {
        assert!(decode("f", &[0x7f, 1, 2, 3], None).unwrap().is_none());
    }

    #[test]
    fn truncated_integer_is_rejected() {
        let err = decode("port", &[Tag::U32.as_byte(), 0, 1], None).unwrap_err();
        match err {
            CodecError::InvalidLength { expected, actual, .. } => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_bool_and_utf8_are_rejected() {
        assert!(matches!(
            decode("b", &[Tag::Bool.as_byte(), 2], None),
            Err(CodecError::InvalidBool { byte: 2, .. })
        ));
        assert!(matches!(
            decode("s", &[Tag::String.as_byte(), 0xff, 0xfe], None),
            Err(CodecError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn tag_bytes_are_stable() {
        for byte in 0u8..=255 {
            if let Some(tag) = Tag::from_byte(byte) {
                assert_eq!(tag.as_byte(), byte);
            }
        }
        assert_eq!(Tag::from_byte(0x13), Some(Tag::I64));
        assert_eq!(Tag::from_byte(0x00), None);
    }

    proptest! {
        #[test]
        fn any_i64_roundtrips(v in any::<i64>()) {
            prop_assert_eq!(roundtrip(Value::I64(v)), Value::I64(v));
        }

        #[test]
        fn any_u16_roundtrips(v in any::<u16>()) {
            prop_assert_eq!(roundtrip(Value::U16(v)), Value::U16(v));
        }

        #[test]
        fn any_string_roundtrips(s in ".*") {
            prop_assert_eq!(roundtrip(Value::String(s.clone())), Value::String(s));
        }

        #[test]
        fn any_timestamp_roundtrips(
            secs in -62_000_000_000i64..250_000_000_000i64,
            nanos in 0u32..1_000_000_000,
        ) {
            let t = DateTime::from_timestamp(secs, nanos).unwrap();
            prop_assert_eq!(roundtrip(Value::Timestamp(t)), Value::Timestamp(t));
        }
    }
}
