use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

/// Object-safe view of a protobuf message.
///
/// Implemented for every [`prost::Message`] that is also `Default + Clone +
/// PartialEq`, so decoded messages can travel inside a [`Value`] and be
/// downcast back to their concrete type.
pub trait DynMessage: Any + Send + Sync + fmt::Debug {
    /// Canonical protobuf binary encoding.
    fn encode_message(&self) -> Vec<u8>;
    /// Rust type name of the concrete message.
    fn message_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_message(&self) -> Box<dyn DynMessage>;
    fn eq_message(&self, other: &dyn DynMessage) -> bool;
}

impl<M> DynMessage for M
where
    M: prost::Message + Default + Clone + PartialEq + 'static,
{
    fn encode_message(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    fn message_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_message(&self) -> Box<dyn DynMessage> {
        Box::new(self.clone())
    }

    fn eq_message(&self, other: &dyn DynMessage) -> bool {
        other.as_any().downcast_ref::<M>() == Some(self)
    }
}

/// A decoded protobuf message of some concrete type.
pub struct MessageValue(Box<dyn DynMessage>);

impl MessageValue {
    pub fn new<M>(message: M) -> Self
    where
        M: prost::Message + Default + Clone + PartialEq + 'static,
    {
        Self(Box::new(message))
    }

    /// Borrow the message as `M`, if that is its concrete type.
    pub fn get<M: 'static>(&self) -> Option<&M> {
        self.0.as_any().downcast_ref::<M>()
    }

    /// Take the message as `M`, handing `self` back on a type mismatch.
    pub fn downcast<M: 'static>(self) -> Result<M, Self> {
        if self.0.as_any().is::<M>() {
            match self.0.into_any().downcast::<M>() {
                Ok(message) => Ok(*message),
                Err(_) => unreachable!("type checked above"),
            }
        } else {
            Err(self)
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.0.encode_message()
    }

    pub fn message_name(&self) -> &'static str {
        self.0.message_name()
    }
}

impl From<Box<dyn DynMessage>> for MessageValue {
    fn from(inner: Box<dyn DynMessage>) -> Self {
        Self(inner)
    }
}

impl Clone for MessageValue {
    fn clone(&self) -> Self {
        Self(self.0.clone_message())
    }
}

impl PartialEq for MessageValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_message(other.0.as_ref())
    }
}

impl fmt::Debug for MessageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Decoder for one concrete message type, taken from a record schema.
#[derive(Clone, Copy)]
pub struct MessageType {
    name: fn() -> &'static str,
    decode: fn(&[u8]) -> Result<MessageValue, prost::DecodeError>,
}

fn decode_as<M>(buf: &[u8]) -> Result<MessageValue, prost::DecodeError>
where
    M: prost::Message + Default + Clone + PartialEq + 'static,
{
    M::decode(buf).map(MessageValue::new)
}

impl MessageType {
    pub fn of<M>() -> Self
    where
        M: prost::Message + Default + Clone + PartialEq + 'static,
    {
        Self {
            name: std::any::type_name::<M>,
            decode: decode_as::<M>,
        }
    }

    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    pub fn decode(&self, buf: &[u8]) -> Result<MessageValue, prost::DecodeError> {
        (self.decode)(buf)
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for MessageType {}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageType({})", self.name())
    }
}

/// A single field value, as stored in a record bucket.
///
/// Every storable kind is a variant here; there is no open-ended fallback.
/// Integer variants keep their declared width so a round trip through the
/// store preserves it.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Timestamp(DateTime<Utc>),
    Message(MessageValue),
    /// String map, stored as a nested bucket rather than a tagged buffer.
    Map(HashMap<String, String>),
}

impl Value {
    pub fn message<M>(message: M) -> Self
    where
        M: prost::Message + Default + Clone + PartialEq + 'static,
    {
        Self::Message(MessageValue::new(message))
    }

    /// Short name of the variant, used in logs and error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::Timestamp(_) => "timestamp",
            Self::Message(_) => "message",
            Self::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any signed integer, widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Any unsigned integer, widened to `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U8(v) => Some(u64::from(*v)),
            Self::U16(v) => Some(u64::from(*v)),
            Self::U32(v) => Some(u64::from(*v)),
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, String>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_message<M: 'static>(&self) -> Option<&M> {
        match self {
            Self::Message(m) => m.get::<M>(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::I8(v) => write!(f, "{v}i8"),
            Self::I16(v) => write!(f, "{v}i16"),
            Self::I32(v) => write!(f, "{v}i32"),
            Self::I64(v) => write!(f, "{v}i64"),
            Self::U8(v) => write!(f, "{v}u8"),
            Self::U16(v) => write!(f, "{v}u16"),
            Self::U32(v) => write!(f, "{v}u32"),
            Self::U64(v) => write!(f, "{v}u64"),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Self::Message(m) => write!(f, "<{}>", m.message_name()),
            Self::Map(m) => {
                let mut entries: Vec<_> = m.iter().collect();
                entries.sort();
                write!(f, "{{")?;
                for (i, (k, v)) in entries.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v:?}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from! {
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
    MessageValue => Message,
    HashMap<String, String> => Map,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
