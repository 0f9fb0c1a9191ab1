//! Registry record shapes and the type buckets they live in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use svcreg_codec::record;

use crate::proto::{InstanceSpec, LocationSpec};

pub const TABLE_NAMESPACE: &str = "namespace";
pub const TABLE_SERVICE: &str = "service";
pub const TABLE_INSTANCE: &str = "instance";
pub const TABLE_LOCATION: &str = "location";

record! {
    /// A namespace groups services and owns their access token.
    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Namespace {
        pub name: String,
        pub comment: String,
        pub token: String,
        pub owner: String,
        pub valid: bool,
        pub create_time: DateTime<Utc>,
        pub modify_time: DateTime<Utc>,
    }
}

record! {
    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Service {
        pub id: String,
        pub namespace: String,
        pub name: String,
        pub comment: String,
        pub token: String,
        pub owner: String,
        pub revision: String,
        pub valid: bool,
        pub meta: HashMap<String, String>,
        pub create_time: DateTime<Utc>,
        pub modify_time: DateTime<Utc>,
    }
}

record! {
    /// A registered instance. Its network details live in `proto`.
    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Instance {
        pub id: String,
        pub service_id: String,
        pub service_platform_id: String,
        pub valid: bool,
        pub proto: Option<InstanceSpec>,
        pub modify_time: DateTime<Utc>,
    }
}

record! {
    /// Location resolved for an instance address, with numeric ids for
    /// region, zone and campus.
    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Location {
        pub proto: Option<LocationSpec>,
        pub region_id: u32,
        pub zone_id: u32,
        pub campus_id: u32,
        pub valid: bool,
    }
}
