//! Record shapes.
//!
//! A [`Schema`] lists a record's fields in declaration order with their
//! kinds. It is built once per shape (the [`record!`](crate::record!) macro
//! caches it in a `OnceLock`) and is what the codec consults to resolve a
//! field by name or to find the concrete type of a message field.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::mapper::RECORD_MARKER;
use crate::value::{MessageType, MessageValue, Value};

/// Declared kind of a record field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Timestamp,
    Map,
    Message(MessageType),
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::Timestamp => "timestamp",
            Self::Map => "map",
            Self::Message(_) => "message",
        }
    }

    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Self::Message(ty) => Some(*ty),
            _ => None,
        }
    }
}

/// One declared field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Ordered field list for one record shape.
#[derive(Clone, Debug)]
pub struct Schema {
    name: &'static str,
    fields: Vec<FieldDef>,
}

impl Schema {
    /// Build a schema from its field list.
    ///
    /// # Panics
    ///
    /// Panics if a field name is empty or repeated. Shapes are declared in
    /// code, so either is a programming error.
    pub fn new(name: &'static str, fields: Vec<FieldDef>) -> Self {
        for (i, field) in fields.iter().enumerate() {
            assert!(
                field.name != RECORD_MARKER,
                "record {name} declares a field with an empty name"
            );
            assert!(
                fields[..i].iter().all(|f| f.name != field.name),
                "record {name} declares field {} twice",
                field.name
            );
        }
        Self { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A Rust type that can be stored as a record field.
pub trait FieldValue: Default + Sized {
    fn kind() -> FieldKind;

    /// The value to store, or `None` to store nothing for this field.
    fn to_value(&self) -> Option<Value>;

    /// Convert a decoded value back, returning it unchanged on a kind mismatch.
    fn from_value(value: Value) -> Result<Self, Value>;
}

macro_rules! scalar_field {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn kind() -> FieldKind {
                    FieldKind::$kind
                }

                fn to_value(&self) -> Option<Value> {
                    Some(Value::$kind(self.clone()))
                }

                fn from_value(value: Value) -> Result<Self, Value> {
                    match value {
                        Value::$kind(v) => Ok(v),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

scalar_field! {
    String => String,
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    DateTime<Utc> => Timestamp,
    HashMap<String, String> => Map,
}

/// Message fields are optional, as in prost-generated code. `None` stores
/// nothing and reads back as `None`.
impl<M> FieldValue for Option<M>
where
    M: prost::Message + Default + Clone + PartialEq + 'static,
{
    fn kind() -> FieldKind {
        FieldKind::Message(MessageType::of::<M>())
    }

    fn to_value(&self) -> Option<Value> {
        self.as_ref()
            .map(|m| Value::Message(MessageValue::new(m.clone())))
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Message(m) => m.downcast::<M>().map(Some).map_err(Value::Message),
            other => Err(other),
        }
    }
}

/// Decoded field values keyed by field name.
///
/// Handed to filter predicates (only the requested fields, and only those
/// that resolved to a value) and to [`Record::from_values`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldValues {
    values: HashMap<String, Value>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Remove `field` and convert it to `T`.
    ///
    /// A missing field yields `T::default()`. A value of the wrong kind is
    /// logged and also yields the default.
    pub fn take<T: FieldValue>(&mut self, field: &str) -> T {
        match self.values.remove(field) {
            None => T::default(),
            Some(value) => T::from_value(value).unwrap_or_else(|found| {
                warn!(
                    field,
                    declared = T::kind().name(),
                    found = found.kind_name(),
                    "stored value does not match declared field kind; using default"
                );
                T::default()
            }),
        }
    }
}

impl FromIterator<(String, Value)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A struct that can be stored in a record bucket.
///
/// Usually implemented through [`record!`](crate::record!).
pub trait Record: Sized {
    fn schema() -> &'static Schema;

    /// Field values in schema order; `None` means nothing is stored.
    fn to_values(&self) -> Vec<(&'static str, Option<Value>)>;

    fn from_values(values: FieldValues) -> Self;
}

/// Declare a struct and implement [`Record`] for it.
///
/// Every field type must implement [`FieldValue`]. The schema is built on
/// first use and cached.
///
/// ```
/// use std::collections::HashMap;
/// use svcreg_codec::{record, Record};
///
/// record! {
///     #[derive(Clone, Debug, Default, PartialEq)]
///     pub struct Svc {
///         pub id: String,
///         pub name: String,
///         pub tags: HashMap<String, String>,
///     }
/// }
///
/// assert_eq!(Svc::schema().fields().len(), 3);
/// assert!(Svc::schema().field("tags").is_some());
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::Record for $name {
            fn schema() -> &'static $crate::Schema {
                static SCHEMA: ::std::sync::OnceLock<$crate::Schema> = ::std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| {
                    $crate::Schema::new(
                        stringify!($name),
                        vec![
                            $(
                                $crate::FieldDef::new(
                                    stringify!($field),
                                    <$ty as $crate::FieldValue>::kind(),
                                ),
                            )*
                        ],
                    )
                })
            }

            fn to_values(&self) -> ::std::vec::Vec<(&'static str, ::std::option::Option<$crate::Value>)> {
                vec![
                    $(
                        (stringify!($field), $crate::FieldValue::to_value(&self.$field)),
                    )*
                ]
            }

            #[allow(unused_mut, unused_variables)]
            fn from_values(mut values: $crate::FieldValues) -> Self {
                Self {
                    $(
                        $field: values.take::<$ty>(stringify!($field)),
                    )*
                }
            }
        }
    };
}
