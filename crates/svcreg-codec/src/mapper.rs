//! Mapping between record field names and keys inside a record bucket.
//!
//! The mapping is the identity. Field names are unique identifiers within a
//! record shape, which makes the mapping injective without further work.
//! The empty key is reserved for the record's own presence marker, so no
//! field may be named `""`.

/// Key reserved for the record presence marker.
pub const RECORD_MARKER: &str = "";

/// Bucket key under which `field` is stored.
pub fn to_bucket_key(field: &str) -> &str {
    field
}

/// Whether `field` maps onto the record marker and so can never be stored.
pub fn is_reserved(field: &str) -> bool {
    to_bucket_key(field) == RECORD_MARKER
}

/// Field name stored under `key`. Inverse of [`to_bucket_key`].
pub fn from_bucket_key(key: &str) -> &str {
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_reversible() {
        for field in ["name", "modify_time", "meta", "proto"] {
            assert_eq!(from_bucket_key(to_bucket_key(field)), field);
        }
    }

    #[test]
    fn distinct_fields_get_distinct_keys() {
        assert_ne!(to_bucket_key("name"), to_bucket_key("names"));
        assert_ne!(to_bucket_key("name"), RECORD_MARKER);
    }

    #[test]
    fn only_the_empty_name_is_reserved() {
        assert!(is_reserved(""));
        assert!(!is_reserved("name"));
        assert!(!is_reserved(" "));
    }
}
