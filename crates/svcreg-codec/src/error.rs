/// Errors from encoding or decoding record fields.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A tagged buffer was empty. Empty values mark nested map buckets and
    /// must be resolved before tag dispatch.
    #[error("empty tagged buffer for field {field}")]
    EmptyBuffer { field: String },

    /// The payload length does not match what the tag requires.
    #[error("invalid {tag} payload for field {field}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        field: String,
        tag: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A string payload or nested map entry was not valid UTF-8.
    #[error("invalid utf-8 in field {field}")]
    InvalidUtf8 { field: String },

    /// A bool payload held something other than 0 or 1.
    #[error("invalid bool byte {byte:#04x} in field {field}")]
    InvalidBool { field: String, byte: u8 },

    /// A timestamp payload is outside the representable range.
    #[error("invalid timestamp in field {field}: {secs}s {nanos}ns")]
    InvalidTimestamp {
        field: String,
        secs: i64,
        nanos: u32,
    },

    /// The embedded protobuf message could not be decoded.
    #[error("failed to decode message in field {field}: {source}")]
    Message {
        field: String,
        #[source]
        source: prost::DecodeError,
    },

    /// A message tag was decoded without a target message type.
    #[error("no message type supplied to decode field {field}")]
    MissingMessageType { field: String },

    /// The requested field is not declared on the record schema.
    #[error("field {field} not found in record {record}")]
    UnknownField { record: &'static str, field: String },

    /// A message tag was found on a field whose declared kind is not a message.
    #[error("field {field} in record {record} holds a message, but is declared as {declared}")]
    NotAMessage {
        record: &'static str,
        field: String,
        declared: &'static str,
    },
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
