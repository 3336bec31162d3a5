//! Fixture-driven credential and node lookups.

use std::collections::BTreeMap;

use anyhow::anyhow;
use corral_core::{CredentialRecord, CredentialScope, CredentialSource, NodeLookup};
use serde::{Deserialize, Serialize};

/// Lookups answered from a static snapshot (a YAML/JSON fixture file or test data).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticLookups {
    /// Cluster-wide credentials.
    #[serde(default)]
    pub credentials: Vec<CredentialRecord>,
    #[serde(default)]
    pub namespaced_credentials: Vec<CredentialRecord>,
    /// Node identifier -> internal node name.
    #[serde(default)]
    pub nodes: BTreeMap<String, String>,
}

#[async_trait::async_trait]
impl CredentialSource for StaticLookups {
    async fn list_credentials(
        &self,
        scope: CredentialScope,
        namespace: Option<&str>,
    ) -> anyhow::Result<Vec<CredentialRecord>> {
        Ok(match scope {
            CredentialScope::Cluster => self.credentials.clone(),
            CredentialScope::Namespaced => self
                .namespaced_credentials
                .iter()
                .filter(|c| namespace.map_or(true, |ns| c.namespace_id.as_deref() == Some(ns)))
                .cloned()
                .collect(),
        })
    }
}

#[async_trait::async_trait]
impl NodeLookup for StaticLookups {
    async fn resolve_node_name(&self, node_id: &str) -> anyhow::Result<String> {
        self.nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| anyhow!("node {} not found", node_id))
    }
}
