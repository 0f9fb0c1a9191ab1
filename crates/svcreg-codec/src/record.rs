//! Whole-record and single-field encoding against a bucket.
//!
//! A record bucket holds two kinds of entries under the same key space:
//! flat tagged buffers for scalar and message fields, and nested buckets for
//! string maps. Both encode and decode use the same mapped key for a field,
//! and decode resolves flat-then-nested so a map field needs no tag.

use std::collections::{BTreeMap, HashMap};

use crate::error::CodecError;
use crate::mapper::{from_bucket_key, is_reserved, to_bucket_key};
use crate::schema::{FieldValues, Record, Schema};
use crate::tag::{self, Tag};
use crate::value::Value;

/// A record split into the entries a bucket store must write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodedRecord {
    /// Bucket key -> tagged buffer, one per scalar or message field.
    pub entries: BTreeMap<String, Vec<u8>>,
    /// Bucket key -> raw map entries, one nested bucket per non-empty map.
    pub buckets: BTreeMap<String, BTreeMap<String, String>>,
}

impl EncodedRecord {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.buckets.is_empty()
    }

    /// Number of stored fields, counting each nested bucket once.
    pub fn field_count(&self) -> usize {
        self.entries.len() + self.buckets.len()
    }

    /// Replace whatever is stored for `field` with `value`.
    ///
    /// A scalar drops any nested bucket of the same name and vice versa.
    /// Returns `false` and stores nothing for a reserved field name.
    pub fn set_field(&mut self, field: &str, value: &Value) -> bool {
        if is_reserved(field) {
            return false;
        }
        let key = to_bucket_key(field);
        self.entries.remove(key);
        self.buckets.remove(key);
        encode_field(self, field, value);
        true
    }
}

/// Encode one field value into `out`.
///
/// Maps with no entries store nothing: an absent nested bucket already reads
/// back as "no value".
pub fn encode_field(out: &mut EncodedRecord, field: &str, value: &Value) {
    let key = to_bucket_key(field).to_string();
    match value {
        Value::Map(map) => {
            if !map.is_empty() {
                let entries = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                out.buckets.insert(key, entries);
            }
        }
        scalar => {
            if let Some(buf) = tag::encode(scalar) {
                out.entries.insert(key, buf);
            }
        }
    }
}

/// Encode every field of `record`.
pub fn serialize<R: Record>(record: &R) -> EncodedRecord {
    let mut out = EncodedRecord::default();
    for (field, value) in record.to_values() {
        if let Some(value) = value {
            encode_field(&mut out, field, &value);
        }
    }
    out
}

/// Read access to one record bucket.
pub trait FieldSource {
    type Error: From<CodecError>;

    /// The flat value stored under `key`. An empty value marks a nested bucket.
    fn flat(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    /// All entries of the nested bucket under `key`, if it exists.
    fn nested(&self, key: &str) -> Result<Option<HashMap<String, String>>, Self::Error>;
}

/// Read a single field without materializing the record.
///
/// Fails when `field` is not declared on `schema`, or when a message tag is
/// found on a field that is not declared as a message.
pub fn read_field<S: FieldSource>(
    source: &S,
    schema: &Schema,
    field: &str,
) -> Result<Option<Value>, S::Error> {
    let Some(def) = schema.field(field) else {
        return Err(CodecError::UnknownField {
            record: schema.name(),
            field: field.to_string(),
        }
        .into());
    };
    let key = to_bucket_key(def.name);
    match source.flat(key)? {
        Some(buf) if !buf.is_empty() => {
            let message = def.kind.message_type();
            if buf[0] == Tag::Message.as_byte() && message.is_none() {
                return Err(CodecError::NotAMessage {
                    record: schema.name(),
                    field: def.name.to_string(),
                    declared: def.kind.name(),
                }
                .into());
            }
            Ok(tag::decode(from_bucket_key(key), &buf, message)?)
        }
        _ => Ok(source.nested(key)?.map(Value::Map)),
    }
}

/// Read every declared field of `R` and build it.
///
/// Fields with nothing stored keep their default value.
pub fn deserialize<R: Record, S: FieldSource>(source: &S) -> Result<R, S::Error> {
    let schema = R::schema();
    let mut values = FieldValues::new();
    for def in schema.fields() {
        if let Some(value) = read_field(source, schema, def.name)? {
            values.insert(def.name, value);
        }
    }
    Ok(R::from_values(values))
}

/// Read the requested `fields` into a [`FieldValues`], omitting those with
/// no stored value.
pub fn read_fields<S: FieldSource>(
    source: &S,
    schema: &Schema,
    fields: &[&str],
) -> Result<FieldValues, S::Error> {
    let mut values = FieldValues::new();
    for field in fields {
        if let Some(value) = read_field(source, schema, field)? {
            values.insert(*field, value);
        }
    }
    Ok(values)
}

/// An [`EncodedRecord`] can be read back directly.
impl FieldSource for EncodedRecord {
    type Error = CodecError;

    fn flat(&self, key: &str) -> Result<Option<Vec<u8>>, CodecError> {
        match self.entries.get(key) {
            Some(buf) => Ok(Some(buf.clone())),
            None if self.buckets.contains_key(key) => Ok(Some(Vec::new())),
            None => Ok(None),
        }
    }

    fn nested(&self, key: &str) -> Result<Option<HashMap<String, String>>, CodecError> {
        let Some(entries) = self.buckets.get(key) else {
            return Ok(None);
        };
        Ok(Some(entries.clone().into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MessageType;
    use chrono::{DateTime, Utc};

    #[derive(Clone, PartialEq, prost::Message)]
    struct Endpoint {
        #[prost(string, tag = "1")]
        host: String,
        #[prost(uint32, tag = "2")]
        port: u32,
    }

    crate::record! {
        #[derive(Clone, Debug, Default, PartialEq)]
        struct Svc {
            id: String,
            name: String,
            valid: bool,
            priority: i16,
            weight: u64,
            tags: HashMap<String, String>,
            endpoint: Option<Endpoint>,
            modify_time: DateTime<Utc>,
        }
    }

    crate::record! {
        #[derive(Clone, Debug, Default, PartialEq)]
        struct SvcV2 {
            id: String,
            name: u32,
            endpoint: String,
        }
    }

    fn sample() -> Svc {
        let mut tags = HashMap::new();
        tags.insert("k1".to_string(), "v1".to_string());
        tags.insert("k2".to_string(), "".to_string());
        Svc {
            id: "a".into(),
            name: "X".into(),
            valid: true,
            priority: -4,
            weight: u64::MAX,
            tags,
            endpoint: Some(Endpoint {
                host: "10.0.0.1".into(),
                port: 80,
            }),
            modify_time: DateTime::from_timestamp(1_700_000_000, 42).unwrap(),
        }
    }

    // -----------------------------------------------------------------------
    // Serialize
    // -----------------------------------------------------------------------

    #[test]
    fn maps_go_to_nested_buckets() {
        let enc = serialize(&sample());
        assert!(!enc.entries.contains_key("tags"));
        assert_eq!(enc.buckets["tags"]["k1"], "v1");
        assert_eq!(enc.buckets["tags"]["k2"], "");
        assert_eq!(enc.entries["endpoint"][0], Tag::Message.as_byte());
        assert_eq!(enc.field_count(), 8);
    }

    #[test]
    fn set_field_switches_storage_kind() {
        let mut enc = serialize(&sample());
        enc.set_field("tags", &Value::from("flat now"));
        assert!(!enc.buckets.contains_key("tags"));
        assert_eq!(enc.entries["tags"][0], Tag::String.as_byte());

        enc.set_field("tags", &Value::Map(HashMap::new()));
        assert!(!enc.entries.contains_key("tags"));
        assert!(!enc.buckets.contains_key("tags"));
    }

    #[test]
    fn set_field_refuses_the_marker_key() {
        let mut enc = serialize(&sample());
        let before = enc.clone();
        assert!(!enc.set_field("", &Value::from("x")));
        assert!(!enc.set_field("", &Value::Map(HashMap::new())));
        assert_eq!(enc, before);
    }

    #[test]
    fn zero_values_are_still_emitted() {
        let enc = serialize(&Svc::default());
        assert_eq!(enc.entries["name"], vec![Tag::String.as_byte()]);
        assert!(enc.entries.contains_key("valid"));
        assert!(enc.entries.contains_key("modify_time"));
        assert!(!enc.entries.contains_key("endpoint"));
        assert!(enc.buckets.is_empty());
    }

    // -----------------------------------------------------------------------
    // Deserialize
    // -----------------------------------------------------------------------

    #[test]
    fn record_roundtrip() {
        let svc = sample();
        let back: Svc = deserialize(&serialize(&svc)).unwrap();
        assert_eq!(back, svc);
    }

    #[test]
    fn empty_record_roundtrip() {
        let back: Svc = deserialize(&serialize(&Svc::default())).unwrap();
        assert_eq!(back, Svc::default());
        assert!(back.tags.is_empty());
        assert!(back.endpoint.is_none());
    }

    #[test]
    fn large_map_roundtrip() {
        let mut svc = sample();
        svc.tags = (0..500).map(|i| (format!("key-{i}"), format!("value-{i}"))).collect();
        let back: Svc = deserialize(&serialize(&svc)).unwrap();
        assert_eq!(back.tags.len(), 500);
        assert_eq!(back.tags, svc.tags);
    }

    #[test]
    fn drifted_scalar_keeps_default() {
        let enc = serialize(&sample());
        // `name` is now a u32 and `endpoint` a string; the stored name is a
        // string, so it is skipped.
        let mut trimmed = enc.clone();
        trimmed.entries.remove("endpoint");
        let v2: SvcV2 = deserialize(&trimmed).unwrap();
        assert_eq!(v2.id, "a");
        assert_eq!(v2.name, 0);
    }

    #[test]
    fn message_tag_on_scalar_field_is_an_error() {
        let enc = serialize(&sample());
        let err = deserialize::<SvcV2, _>(&enc).unwrap_err();
        assert!(matches!(
            err,
            CodecError::NotAMessage {
                declared: "string",
                ..
            }
        ));
    }

    // -----------------------------------------------------------------------
    // Single-field reads
    // -----------------------------------------------------------------------

    #[test]
    fn read_single_fields() {
        let enc = serialize(&sample());
        let schema = Svc::schema();
        let name = read_field(&enc, schema, "name").unwrap();
        assert_eq!(name, Some(Value::from("X")));
        let priority = read_field(&enc, schema, "priority").unwrap();
        assert_eq!(priority, Some(Value::I16(-4)));
        let tags = read_field(&enc, schema, "tags").unwrap().unwrap();
        assert_eq!(tags.as_map().unwrap()["k1"], "v1");
        let endpoint = read_field(&enc, schema, "endpoint").unwrap().unwrap();
        assert_eq!(endpoint.as_message::<Endpoint>().unwrap().port, 80);
    }

    #[test]
    fn unknown_field_is_an_error() {
        let enc = serialize(&sample());
        let err = read_field(&enc, Svc::schema(), "nope").unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnknownField { record: "Svc", .. }
        ));
    }

    #[test]
    fn absent_fields_are_omitted() {
        let enc = serialize(&Svc::default());
        let fields = ["tags", "endpoint", "id"];
        let values = read_fields(&enc, Svc::schema(), &fields).unwrap();
        assert_eq!(values.len(), 1);
        assert!(values.contains("id"));
    }

    #[test]
    fn unrecognized_tag_reads_as_no_value() {
        let mut enc = serialize(&sample());
        enc.entries.insert("name".into(), vec![0x7e, b'x']);
        let name = read_field(&enc, Svc::schema(), "name").unwrap();
        assert_eq!(name, None);
        let back: Svc = deserialize(&enc).unwrap();
        assert_eq!(back.name, "");
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let mut enc = serialize(&sample());
        let weight = vec![Tag::U64.as_byte(), 1];
        enc.entries.insert("weight".into(), weight);
        assert!(read_field(&enc, Svc::schema(), "weight").is_err());
        assert!(read_field(&enc, Svc::schema(), "name").is_ok());
    }

    #[test]
    fn message_type_comes_from_schema() {
        let def = Svc::schema().field("endpoint").unwrap();
        let expected = Some(MessageType::of::<Endpoint>());
        assert_eq!(def.kind.message_type(), expected);
    }
}
