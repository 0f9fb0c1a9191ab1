//! Protobuf messages embedded in registry records.

use std::collections::HashMap;

/// Physical location of an instance.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LocationSpec {
    #[prost(string, tag = "1")]
    pub region: String,
    #[prost(string, tag = "2")]
    pub zone: String,
    #[prost(string, tag = "3")]
    pub campus: String,
}

/// Wire form of a registered service instance.
#[derive(Clone, PartialEq, prost::Message)]
pub struct InstanceSpec {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub host: String,
    #[prost(uint32, tag = "3")]
    pub port: u32,
    #[prost(string, tag = "4")]
    pub protocol: String,
    #[prost(uint32, tag = "5")]
    pub weight: u32,
    #[prost(bool, tag = "6")]
    pub healthy: bool,
    #[prost(bool, tag = "7")]
    pub isolate: bool,
    #[prost(map = "string, string", tag = "8")]
    pub metadata: HashMap<String, String>,
    #[prost(string, tag = "9")]
    pub revision: String,
    #[prost(message, optional, tag = "10")]
    pub location: Option<LocationSpec>,
    /// Owning service name. Brief lookups fill it from the service record.
    #[prost(string, tag = "11")]
    pub service: String,
    #[prost(string, tag = "12")]
    pub namespace: String,
    #[prost(bool, tag = "13")]
    pub enable_health_check: bool,
}
