//! Schema-less views of stored records.

use std::collections::BTreeMap;

use colored::Colorize;
use serde_json::{json, Map as JsonMap, Value as Json};
use svcreg_codec::{tag, EncodedRecord, Tag, Value};

/// One stored field as far as it can be understood without a schema.
#[derive(Debug, PartialEq)]
pub enum FieldView {
    Value(Value),
    Map(BTreeMap<String, String>),
    /// Message payloads need the declared type to decode.
    Message { len: usize },
    Unknown { tag: u8 },
    Invalid(String),
}

/// Every stored field of `record`, sorted by field name.
pub fn field_views(record: &EncodedRecord) -> BTreeMap<String, FieldView> {
    let mut views = BTreeMap::new();
    for (field, buf) in &record.entries {
        let view = match buf.split_first() {
            Some((&byte, payload)) if byte == Tag::Message.as_byte() => {
                FieldView::Message { len: payload.len() }
            }
            _ => match tag::decode(field, buf, None) {
                Ok(Some(value)) => FieldView::Value(value),
                Ok(None) => FieldView::Unknown { tag: buf[0] },
                Err(e) => FieldView::Invalid(e.to_string()),
            },
        };
        views.insert(field.clone(), view);
    }
    for (field, entries) in &record.buckets {
        views.insert(field.clone(), FieldView::Map(entries.clone()));
    }
    views
}

pub fn text(view: &FieldView) -> String {
    match view {
        FieldView::Value(value) => value.to_string(),
        FieldView::Map(entries) => Value::Map(entries.clone().into_iter().collect()).to_string(),
        FieldView::Message { len } => format!("<message, {len} bytes>").dimmed().to_string(),
        FieldView::Unknown { tag } => format!("<unknown tag 0x{tag:02x}>").yellow().to_string(),
        FieldView::Invalid(reason) => format!("<invalid: {reason}>").red().to_string(),
    }
}

pub fn json(view: &FieldView) -> Json {
    match view {
        FieldView::Value(value) => value_json(value),
        FieldView::Map(entries) => {
            let object: JsonMap<String, Json> = entries
                .iter()
                .map(|(k, v)| (k.clone(), Json::String(v.clone())))
                .collect();
            Json::Object(object)
        }
        FieldView::Message { len } => json!({ "message_bytes": len }),
        FieldView::Unknown { tag } => json!({ "unknown_tag": tag }),
        FieldView::Invalid(reason) => json!({ "error": reason }),
    }
}

fn value_json(value: &Value) -> Json {
    match value {
        Value::String(s) => json!(s),
        Value::Bool(b) => json!(b),
        Value::I8(v) => json!(v),
        Value::I16(v) => json!(v),
        Value::I32(v) => json!(v),
        Value::I64(v) => json!(v),
        Value::U8(v) => json!(v),
        Value::U16(v) => json!(v),
        Value::U32(v) => json!(v),
        Value::U64(v) => json!(v),
        Value::Timestamp(t) => json!(t.to_rfc3339()),
        Value::Message(m) => json!({ "message": m.message_name() }),
        Value::Map(m) => json!(m),
    }
}

/// A whole record as a JSON object.
pub fn record_json(record: &EncodedRecord) -> Json {
    let object: JsonMap<String, Json> = field_views(record)
        .iter()
        .map(|(field, view)| (field.clone(), json(view)))
        .collect();
    Json::Object(object)
}
