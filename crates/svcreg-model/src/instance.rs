//! Instance persistence on top of any [`RecordStore`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use svcreg_codec::Value;
use svcreg_store::{Properties, RecordStore};
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::proto::InstanceSpec;
use crate::records::{Instance, Service, TABLE_INSTANCE, TABLE_SERVICE};

/// Instance records, keyed by instance id.
pub struct InstanceStore<S> {
    store: Arc<S>,
}

fn validate(instance: &Instance) -> ModelResult<&InstanceSpec> {
    if instance.id.is_empty() || instance.service_id.is_empty() {
        return Err(ModelError::InvalidParam(
            "instance requires id and service id".to_string(),
        ));
    }
    let Some(proto) = instance.proto.as_ref() else {
        let reason = format!("instance {} has no proto", instance.id);
        return Err(ModelError::InvalidParam(reason));
    };
    Ok(proto)
}

impl<S: RecordStore> InstanceStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Store `instance` as a valid instance, replacing one with the same id.
    pub fn add_instance(&self, instance: &Instance) -> ModelResult<()> {
        validate(instance)?;
        self.save_valid(instance)?;
        debug!(id = %instance.id, service_id = %instance.service_id, "added instance");
        Ok(())
    }

    /// Add every instance of `instances`. Nothing is written unless all of
    /// them are well formed.
    pub fn batch_add_instances(&self, instances: &[Instance]) -> ModelResult<()> {
        for instance in instances {
            validate(instance)?;
        }
        for instance in instances {
            self.save_valid(instance)?;
        }
        debug!(count = instances.len(), "added instances");
        Ok(())
    }

    fn save_valid(&self, instance: &Instance) -> ModelResult<()> {
        let record = Instance {
            valid: true,
            ..instance.clone()
        };
        self.store.save_value(TABLE_INSTANCE, &record.id, &record)?;
        Ok(())
    }

    pub fn get_instance(&self, id: &str) -> ModelResult<Option<Instance>> {
        let mut values = self.store.load_values::<Instance>(TABLE_INSTANCE, &[id])?;
        Ok(values.remove(id))
    }

    /// Replace the proto and service binding of an existing instance.
    ///
    /// Returns `false` if no instance has that id.
    pub fn update_instance(&self, instance: &Instance) -> ModelResult<bool> {
        let proto = validate(instance)?;
        let props = Properties::new()
            .set("proto", Value::message(proto.clone()))
            .set("service_id", instance.service_id.as_str())
            .set("service_platform_id", instance.service_platform_id.as_str())
            .set("modify_time", Utc::now());
        let key = instance.id.as_str();
        Ok(self.store.update_value(TABLE_INSTANCE, key, &props)?)
    }

    /// Remove the instance with `id`. Returns whether it existed.
    pub fn delete_instance(&self, id: &str) -> ModelResult<bool> {
        Ok(self.store.delete_values(TABLE_INSTANCE, &[id])? == 1)
    }

    /// Remove the instances under `ids`, returning how many existed.
    pub fn batch_delete_instances(&self, ids: &[&str]) -> ModelResult<usize> {
        Ok(self.store.delete_values(TABLE_INSTANCE, ids)?)
    }

    /// Set the health flag and revision of an instance.
    ///
    /// Returns `false` if no instance has that id.
    pub fn set_instance_health_status(
        &self,
        id: &str,
        healthy: bool,
        revision: &str,
    ) -> ModelResult<bool> {
        self.modify_proto(id, |spec| {
            spec.healthy = healthy;
            spec.revision = revision.to_string();
        })
    }

    /// Set the isolate flag and revision of every instance under `ids`,
    /// returning how many existed.
    pub fn batch_set_instance_isolate(
        &self,
        ids: &[&str],
        isolate: bool,
        revision: &str,
    ) -> ModelResult<usize> {
        let mut updated = 0;
        for &id in ids {
            let found = self.modify_proto(id, |spec| {
                spec.isolate = isolate;
                spec.revision = revision.to_string();
            })?;
            if found {
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Read, change and write back the `proto` field of one instance.
    ///
    /// Not atomic: a concurrent writer of the same instance can be lost.
    fn modify_proto<F>(&self, id: &str, change: F) -> ModelResult<bool>
    where
        F: FnOnce(&mut InstanceSpec),
    {
        let Some(instance) = self.get_instance(id)? else {
            return Ok(false);
        };
        let mut spec = instance.proto.unwrap_or_default();
        change(&mut spec);
        let props = Properties::new()
            .set("proto", Value::message(spec))
            .set("modify_time", Utc::now());
        Ok(self.store.update_value(TABLE_INSTANCE, id, &props)?)
    }

    pub fn get_instances_count(&self) -> ModelResult<usize> {
        Ok(self.store.count_values(TABLE_INSTANCE)?)
    }

    /// For each of `ids`, whether an instance with that id exists.
    pub fn check_instances_existed(&self, ids: &[&str]) -> ModelResult<HashMap<String, bool>> {
        let found = self.store.load_values::<Instance>(TABLE_INSTANCE, ids)?;
        let mut existed = HashMap::with_capacity(ids.len());
        for &id in ids {
            existed.insert(id.to_string(), found.contains_key(id));
        }
        Ok(existed)
    }

    /// Instances modified strictly after `mtime`, keyed by id.
    ///
    /// A non-empty `service_ids` keeps only instances of those services.
    pub fn get_more_instances(
        &self,
        mtime: DateTime<Utc>,
        service_ids: &[&str],
    ) -> ModelResult<HashMap<String, Instance>> {
        let values = self.store.load_values_by_filter::<Instance, _>(
            TABLE_INSTANCE,
            &["modify_time", "service_id"],
            |fields| {
                let newer = fields
                    .get("modify_time")
                    .and_then(Value::as_timestamp)
                    .is_some_and(|t| t > mtime);
                let wanted = match fields.get("service_id").and_then(Value::as_str) {
                    Some(s) => service_ids.is_empty() || service_ids.contains(&s),
                    None => service_ids.is_empty(),
                };
                newer && wanted
            },
        )?;
        debug!(matched = values.len(), "loaded newer instances");
        Ok(values)
    }

    /// Valid instances of `service_id` listening on `host`, sorted by id.
    pub fn get_instances_main_by_service(
        &self,
        service_id: &str,
        host: &str,
    ) -> ModelResult<Vec<Instance>> {
        let values = self.store.load_values_by_filter::<Instance, _>(
            TABLE_INSTANCE,
            &["service_id", "valid", "proto"],
            |fields| {
                let service = fields.get("service_id").and_then(Value::as_str);
                let valid = fields.get("valid").and_then(Value::as_bool);
                let spec: Option<&InstanceSpec> = fields.get("proto").and_then(Value::as_message);
                service == Some(service_id)
                    && valid == Some(true)
                    && spec.is_some_and(|spec| spec.host == host)
            },
        )?;
        let mut instances: Vec<Instance> = values.into_values().collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }

    /// The instances under `ids`, with the service name and namespace of
    /// their service copied into `proto`. Absent ids are left out.
    pub fn get_instances_brief(&self, ids: &[&str]) -> ModelResult<HashMap<String, Instance>> {
        let mut instances = self.store.load_values::<Instance>(TABLE_INSTANCE, ids)?;

        let mut service_ids: Vec<&str> =
            instances.values().map(|i| i.service_id.as_str()).collect();
        service_ids.sort_unstable();
        service_ids.dedup();
        let services: HashMap<String, Service> =
            self.store.load_values(TABLE_SERVICE, &service_ids)?;

        for instance in instances.values_mut() {
            let Some(service) = services.get(&instance.service_id) else {
                continue;
            };
            if let Some(spec) = instance.proto.as_mut() {
                spec.service = service.name.clone();
                spec.namespace = service.namespace.clone();
            }
        }
        Ok(instances)
    }
}

impl<S> std::fmt::Debug for InstanceStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceStore")
            .field("table", &TABLE_INSTANCE)
            .finish()
    }
}
