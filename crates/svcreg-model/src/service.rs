//! Service persistence on top of any [`RecordStore`].

use std::sync::Arc;

use chrono::Utc;
use svcreg_codec::Value;
use svcreg_store::{Properties, RecordStore};
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::records::{Service, TABLE_SERVICE};

/// Service records, keyed by service id.
pub struct ServiceStore<S> {
    store: Arc<S>,
}

impl<S: RecordStore> ServiceStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Store `service` as a valid service, replacing one with the same id.
    ///
    /// Id, name and namespace are required.
    pub fn add_service(&self, service: &Service) -> ModelResult<()> {
        if service.id.is_empty() || service.name.is_empty() || service.namespace.is_empty() {
            return Err(ModelError::InvalidParam(
                "add service requires id, name and namespace".to_string(),
            ));
        }
        let service = Service {
            valid: true,
            ..service.clone()
        };
        self.store.save_value(TABLE_SERVICE, &service.id, &service)?;
        debug!(id = %service.id, name = %service.name, "added service");
        Ok(())
    }

    pub fn get_service_by_id(&self, id: &str) -> ModelResult<Option<Service>> {
        let mut values = self.store.load_values::<Service>(TABLE_SERVICE, &[id])?;
        Ok(values.remove(id))
    }

    /// The service called `name` in `namespace`.
    pub fn get_service(&self, name: &str, namespace: &str) -> ModelResult<Option<Service>> {
        let values = self.store.load_values_by_filter::<Service, _>(
            TABLE_SERVICE,
            &["name", "namespace"],
            |fields| {
                fields.get("name").and_then(Value::as_str) == Some(name)
                    && fields.get("namespace").and_then(Value::as_str) == Some(namespace)
            },
        )?;
        Ok(values.into_values().next())
    }

    /// Replace the token and revision of an existing service.
    ///
    /// Returns `false` if no service has that id.
    pub fn update_service_token(&self, id: &str, token: &str, revision: &str) -> ModelResult<bool> {
        if id.is_empty() || token.is_empty() {
            return Err(ModelError::InvalidParam(
                "update service token requires id and token".to_string(),
            ));
        }
        let props = Properties::new()
            .set("token", token)
            .set("revision", revision)
            .set("modify_time", Utc::now());
        Ok(self.store.update_value(TABLE_SERVICE, id, &props)?)
    }

    /// Remove the service with `id`. Returns whether it existed.
    pub fn delete_service(&self, id: &str) -> ModelResult<bool> {
        Ok(self.store.delete_values(TABLE_SERVICE, &[id])? == 1)
    }

    /// Services of `namespace`, sorted by name.
    pub fn list_services(&self, namespace: &str) -> ModelResult<Vec<Service>> {
        let values = self.store.load_values_by_filter::<Service, _>(
            TABLE_SERVICE,
            &["namespace"],
            |fields| fields.get("namespace").and_then(Value::as_str) == Some(namespace),
        )?;
        let mut services: Vec<Service> = values.into_values().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    pub fn get_services_count(&self) -> ModelResult<usize> {
        Ok(self.store.count_values(TABLE_SERVICE)?)
    }
}

impl<S> std::fmt::Debug for ServiceStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceStore")
            .field("table", &TABLE_SERVICE)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use svcreg_store::InMemoryStore;

    fn memory() -> ServiceStore<InMemoryStore> {
        ServiceStore::new(Arc::new(InMemoryStore::new()))
    }

    fn svc(id: &str, name: &str, namespace: &str) -> Service {
        Service {
            id: id.into(),
            namespace: namespace.into(),
            name: name.into(),
            token: format!("{id}-token"),
            owner: "owner".into(),
            revision: "r1".into(),
            meta: HashMap::from([("k1".to_string(), "v1".to_string())]),
            ..Default::default()
        }
    }

    #[test]
    fn add_requires_id_name_and_namespace() {
        let store = memory();
        assert!(matches!(
            store.add_service(&svc("", "orders", "default")),
            Err(ModelError::InvalidParam(_))
        ));
        assert!(store.add_service(&svc("s1", "", "default")).is_err());
        assert!(store.add_service(&svc("s1", "orders", "")).is_err());
        assert_eq!(store.get_services_count().unwrap(), 0);
    }

    #[test]
    fn add_get_and_delete() {
        let store = memory();
        store.add_service(&svc("s1", "orders", "default")).unwrap();
        store.add_service(&svc("s2", "orders", "staging")).unwrap();

        let s1 = store.get_service_by_id("s1").unwrap().unwrap();
        assert!(s1.valid);
        assert_eq!(s1.meta["k1"], "v1");
        let staged = store.get_service("orders", "staging").unwrap().unwrap();
        assert_eq!(staged.id, "s2");
        assert!(store.get_service("orders", "prod").unwrap().is_none());

        assert!(store.delete_service("s1").unwrap());
        assert!(!store.delete_service("s1").unwrap());
        assert!(store.get_service_by_id("s1").unwrap().is_none());
        assert_eq!(store.get_services_count().unwrap(), 1);
    }

    #[test]
    fn token_update_keeps_other_fields() {
        let store = memory();
        store.add_service(&svc("s1", "orders", "default")).unwrap();
        assert!(store.update_service_token("s1", "fresh", "r2").unwrap());
        assert!(!store.update_service_token("ghost", "fresh", "r2").unwrap());
        assert!(store.update_service_token("s1", "", "r2").is_err());

        let s1 = store.get_service_by_id("s1").unwrap().unwrap();
        assert_eq!(s1.token, "fresh");
        assert_eq!(s1.revision, "r2");
        assert_eq!(s1.owner, "owner");
    }

    #[test]
    fn list_by_namespace_sorted_by_name() {
        let store = memory();
        store.add_service(&svc("s1", "users", "default")).unwrap();
        store.add_service(&svc("s2", "orders", "default")).unwrap();
        store.add_service(&svc("s3", "audit", "staging")).unwrap();
        let names: Vec<_> = store
            .list_services("default")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["orders", "users"]);
    }
}
