//! Corral kubehub: node and registry credential lookups backed by the Kubernetes API.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use corral_core::{CredentialRecord, CredentialScope, CredentialSource, NodeLookup, RegistryCredential};
use k8s_openapi::api::core::v1::{Node, Secret};
use kube::{
    api::{Api, ListParams},
    Client,
};
use serde_json::Value;
use tracing::{debug, info, warn};

pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";
pub const DEFAULT_CLUSTER_CREDS_NS: &str = "cattle-global-data";

pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("building kube client from kubeconfig/in-cluster env")
}

/// Node identifiers may carry a `<cluster>:` prefix; the node itself is the last segment.
pub fn node_lookup_key(node_id: &str) -> &str {
    node_id.rsplit(':').next().unwrap_or(node_id)
}

/// Registry domains (the `auths` keys) of a docker config JSON blob.
pub fn registries_from_dockerconfig(raw: &[u8]) -> Result<BTreeMap<String, RegistryCredential>> {
    let v: Value = serde_json::from_slice(raw).context("parsing dockerconfigjson")?;
    let auths = v
        .get("auths")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("dockerconfigjson has no auths map"))?;
    Ok(auths
        .iter()
        .map(|(domain, entry)| {
            let username = entry.get("username").and_then(Value::as_str).map(str::to_string);
            (domain.clone(), RegistryCredential { username })
        })
        .collect())
}

/// Credential record for a docker config secret; `None` for other secrets.
pub fn record_from_secret(secret: &Secret, scoped: bool) -> Option<CredentialRecord> {
    if secret.type_.as_deref() != Some(DOCKER_CONFIG_JSON_TYPE) {
        return None;
    }
    let name = secret.metadata.name.clone()?;
    let raw = secret.data.as_ref()?.get(DOCKER_CONFIG_JSON_KEY)?;
    match registries_from_dockerconfig(&raw.0) {
        Ok(registries) => Some(CredentialRecord {
            name,
            namespace_id: if scoped { secret.metadata.namespace.clone() } else { None },
            registries,
        }),
        Err(e) => {
            warn!(secret = %name, error = %e, "skipping unreadable registry secret");
            None
        }
    }
}

/// Resolves node identifiers against cluster `Node` objects.
pub struct KubeNodeLookup {
    client: Client,
}

impl KubeNodeLookup {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl NodeLookup for KubeNodeLookup {
    async fn resolve_node_name(&self, node_id: &str) -> Result<String> {
        let key = node_lookup_key(node_id);
        let api: Api<Node> = Api::all(self.client.clone());
        if let Some(node) = api.get_opt(key).await.with_context(|| format!("getting node {}", key))? {
            return node.metadata.name.ok_or_else(|| anyhow!("node {} has no name", key));
        }
        let lp = ListParams::default().labels(&format!("{}={}", HOSTNAME_LABEL, key));
        let nodes = api.list(&lp).await.context("listing nodes by hostname")?;
        debug!(node_id = %node_id, matches = nodes.items.len(), "node hostname lookup");
        nodes
            .items
            .into_iter()
            .find_map(|n| n.metadata.name)
            .ok_or_else(|| anyhow!("node {} not found", node_id))
    }
}

/// Lists `kubernetes.io/dockerconfigjson` secrets as registry credentials.
pub struct KubeCredentialSource {
    client: Client,
    cluster_namespace: String,
}

impl KubeCredentialSource {
    pub fn new(client: Client, cluster_namespace: impl Into<String>) -> Self {
        Self { client, cluster_namespace: cluster_namespace.into() }
    }

    /// Cluster-wide credentials live in `CORRAL_CLUSTER_CREDS_NS` (default `cattle-global-data`).
    pub fn from_env(client: Client) -> Self {
        let ns = std::env::var("CORRAL_CLUSTER_CREDS_NS").unwrap_or_else(|_| DEFAULT_CLUSTER_CREDS_NS.to_string());
        Self::new(client, ns)
    }

    async fn list_in(&self, api: Api<Secret>, scoped: bool) -> Result<Vec<CredentialRecord>> {
        let lp = ListParams::default().fields(&format!("type={}", DOCKER_CONFIG_JSON_TYPE));
        let secrets = api.list(&lp).await.context("listing registry secrets")?;
        Ok(secrets.items.iter().filter_map(|s| record_from_secret(s, scoped)).collect())
    }
}

#[async_trait::async_trait]
impl CredentialSource for KubeCredentialSource {
    async fn list_credentials(&self, scope: CredentialScope, namespace: Option<&str>) -> Result<Vec<CredentialRecord>> {
        let records = match scope {
            CredentialScope::Cluster => {
                let api = Api::namespaced(self.client.clone(), &self.cluster_namespace);
                self.list_in(api, false).await?
            }
            CredentialScope::Namespaced => {
                let api = match namespace {
                    Some(ns) if !ns.is_empty() => Api::namespaced(self.client.clone(), ns),
                    _ => Api::all(self.client.clone()),
                };
                self.list_in(api, true).await?
            }
        };
        info!(scope = ?scope, ns = ?namespace, count = records.len(), "kubehub: registry credentials listed");
        Ok(records)
    }
}
