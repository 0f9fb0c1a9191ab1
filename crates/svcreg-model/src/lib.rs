//! Service registry records and the stores built on them.
//!
//! Record shapes are declared with [`svcreg_codec::record!`] and stored in
//! one type bucket each (see the `TABLE_*` constants). Network details of
//! instances and locations are protobuf messages embedded as single fields.

pub mod error;
pub mod instance;
pub mod namespace;
pub mod proto;
pub mod records;
pub mod service;

pub use error::{ModelError, ModelResult};
pub use instance::InstanceStore;
pub use namespace::{NamespaceStore, DEFAULT_NAMESPACE, SYSTEM_NAMESPACE};
pub use proto::{InstanceSpec, LocationSpec};
pub use records::{
    Instance, Location, Namespace, Service, TABLE_INSTANCE, TABLE_LOCATION, TABLE_NAMESPACE,
    TABLE_SERVICE,
};
pub use service::ServiceStore;
