//! Field codec for the svcreg object store.
//!
//! Records are stored as buckets of individually encoded fields rather than
//! as opaque blobs, so a single field can be read, filtered on, or updated
//! without touching the rest of the record.
//!
//! # Layers
//!
//! - [`tag`] -- scalar values to and from tagged byte buffers
//! - [`mapper`] -- field name to bucket key
//! - [`schema`] -- record shapes, the [`Record`] trait and [`record!`]
//! - [`record`] -- whole-record and single-field encoding over a [`FieldSource`]

pub mod error;
pub mod mapper;
pub mod record;
pub mod schema;
pub mod tag;
pub mod value;

pub use error::{CodecError, CodecResult};
pub use record::{
    deserialize, encode_field, read_field, read_fields, serialize, EncodedRecord, FieldSource,
};
pub use schema::{FieldDef, FieldKind, FieldValue, FieldValues, Record, Schema};
pub use tag::Tag;
pub use value::{DynMessage, MessageType, MessageValue, Value};
