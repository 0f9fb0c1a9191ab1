//! Typed record store over nested buckets.
//!
//! Each record type is a bucket of record buckets; each record bucket holds
//! one tagged entry per scalar field and one nested bucket per map field.
//! [`BucketStore`] lays this out on a redb file. [`InMemoryStore`] keeps the
//! same encoded form in memory. Both implement [`RecordStore`].
//!
//! ```no_run
//! use std::collections::HashMap;
//! use svcreg_codec::record;
//! use svcreg_store::{BucketStore, Properties, RecordStore, StoreConfig};
//!
//! record! {
//!     #[derive(Clone, Debug, Default, PartialEq)]
//!     pub struct Svc {
//!         pub id: String,
//!         pub name: String,
//!     }
//! }
//!
//! let store = BucketStore::open(StoreConfig::at("svcreg.redb")).unwrap();
//! store.save_value("svc", "a", &Svc { id: "a".into(), name: "X".into() }).unwrap();
//! store.update_value("svc", "a", &Properties::new().set("name", "Y")).unwrap();
//! let loaded: HashMap<String, Svc> = store.load_values("svc", &["a"]).unwrap();
//! assert_eq!(loaded["a"].name, "Y");
//! ```

pub mod bucket;
pub mod config;
pub mod error;
pub mod memory;
pub mod properties;
pub mod store;
pub mod traits;
pub mod tx;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use properties::Properties;
pub use store::BucketStore;
pub use traits::RecordStore;
