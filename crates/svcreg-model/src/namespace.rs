//! Namespace persistence on top of any [`RecordStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use svcreg_codec::Value;
use svcreg_store::{Properties, RecordStore};
use tracing::{debug, info};

use crate::error::{ModelError, ModelResult};
use crate::records::{Namespace, TABLE_NAMESPACE};

/// Namespace every registry starts with.
pub const DEFAULT_NAMESPACE: &str = "default";
/// Namespace holding the registry's own services.
pub const SYSTEM_NAMESPACE: &str = "Polaris";

const SYSTEM_OWNER: &str = "polaris";

/// Built-in namespaces with their fixed tokens and comments.
const BUILTIN_NAMESPACES: [(&str, &str, &str); 2] = [
    (
        DEFAULT_NAMESPACE,
        "e2e473081d3d4306b52264e49f7ce227",
        "Default Environment",
    ),
    (
        SYSTEM_NAMESPACE,
        "2d1bfe5d12e04d54b8ee69e62494c7fd",
        "Polaris-server",
    ),
];

/// Namespace records, keyed by name.
pub struct NamespaceStore<S> {
    store: Arc<S>,
}

impl<S: RecordStore> NamespaceStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying record store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create the built-in namespaces that do not exist yet.
    pub fn init_data(&self) -> ModelResult<()> {
        for (name, token, comment) in BUILTIN_NAMESPACES {
            if self.get_namespace(name)?.is_some() {
                continue;
            }
            let now = Utc::now();
            self.add_namespace(&Namespace {
                name: name.to_string(),
                comment: comment.to_string(),
                token: token.to_string(),
                owner: SYSTEM_OWNER.to_string(),
                valid: true,
                create_time: now,
                modify_time: now,
            })?;
            info!(namespace = name, "created built-in namespace");
        }
        Ok(())
    }

    /// Store `namespace` as a valid namespace, replacing one of the same name.
    ///
    /// Name, owner and token are required.
    pub fn add_namespace(&self, namespace: &Namespace) -> ModelResult<()> {
        if namespace.name.is_empty() || namespace.owner.is_empty() || namespace.token.is_empty() {
            return Err(ModelError::InvalidParam(
                "add namespace requires name, owner and token".to_string(),
            ));
        }
        let namespace = Namespace {
            valid: true,
            ..namespace.clone()
        };
        self.store
            .save_value(TABLE_NAMESPACE, &namespace.name, &namespace)?;
        Ok(())
    }

    /// Update owner and comment of an existing namespace.
    ///
    /// Returns `false` if no namespace of that name exists.
    pub fn update_namespace(&self, namespace: &Namespace) -> ModelResult<bool> {
        if namespace.name.is_empty() || namespace.owner.is_empty() {
            return Err(ModelError::InvalidParam(
                "update namespace requires name and owner".to_string(),
            ));
        }
        let props = Properties::new()
            .set("owner", namespace.owner.as_str())
            .set("comment", namespace.comment.as_str())
            .set("modify_time", Utc::now());
        Ok(self
            .store
            .update_value(TABLE_NAMESPACE, &namespace.name, &props)?)
    }

    /// Replace the token of an existing namespace.
    ///
    /// Returns `false` if no namespace of that name exists.
    pub fn update_namespace_token(&self, name: &str, token: &str) -> ModelResult<bool> {
        if name.is_empty() || token.is_empty() {
            return Err(ModelError::InvalidParam(
                "update namespace token requires name and token".to_string(),
            ));
        }
        let props = Properties::new()
            .set("token", token)
            .set("modify_time", Utc::now());
        Ok(self.store.update_value(TABLE_NAMESPACE, name, &props)?)
    }

    /// Namespaces whose owner contains `owner`, sorted by name.
    pub fn list_namespaces(&self, owner: &str) -> ModelResult<Vec<Namespace>> {
        if owner.is_empty() {
            return Err(ModelError::InvalidParam(
                "list namespaces requires an owner".to_string(),
            ));
        }
        let values = self
            .store
            .load_values_by_filter::<Namespace, _>(TABLE_NAMESPACE, &["owner"], |fields| {
                fields
                    .get("owner")
                    .and_then(Value::as_str)
                    .is_some_and(|o| o.contains(owner))
            })?;
        let mut namespaces: Vec<Namespace> = values.into_values().collect();
        namespaces.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(owner, matched = namespaces.len(), "listed namespaces");
        Ok(namespaces)
    }

    pub fn get_namespace(&self, name: &str) -> ModelResult<Option<Namespace>> {
        let mut values = self
            .store
            .load_values::<Namespace>(TABLE_NAMESPACE, &[name])?;
        Ok(values.remove(name))
    }

    /// One page of namespaces, most recently modified first, and the total
    /// number of namespaces.
    ///
    /// The page starts at `offset * limit`; past the end it is empty.
    pub fn get_namespaces(
        &self,
        offset: usize,
        limit: usize,
    ) -> ModelResult<(Vec<Namespace>, u32)> {
        let values = self.store.load_values_all::<Namespace>(TABLE_NAMESPACE)?;
        let total = values.len() as u32;
        let mut namespaces: Vec<Namespace> = values.into_values().collect();
        namespaces.sort_by(|a, b| {
            b.modify_time
                .cmp(&a.modify_time)
                .then_with(|| a.name.cmp(&b.name))
        });

        let start = offset.saturating_mul(limit);
        if start >= namespaces.len() {
            return Ok((Vec::new(), total));
        }
        let end = start.saturating_add(limit).min(namespaces.len());
        Ok((namespaces.drain(start..end).collect(), total))
    }

    /// Namespaces modified strictly after `mtime`, sorted by name.
    pub fn get_more_namespaces(&self, mtime: DateTime<Utc>) -> ModelResult<Vec<Namespace>> {
        let values = self
            .store
            .load_values_by_filter::<Namespace, _>(TABLE_NAMESPACE, &["modify_time"], |fields| {
                fields
                    .get("modify_time")
                    .and_then(Value::as_timestamp)
                    .is_some_and(|t| t > mtime)
            })?;
        let mut namespaces: Vec<Namespace> = values.into_values().collect();
        namespaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(namespaces)
    }
}

impl<S> std::fmt::Debug for NamespaceStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceStore")
            .field("table", &TABLE_NAMESPACE)
            .finish()
    }
}
