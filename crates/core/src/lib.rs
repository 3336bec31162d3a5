//! Corral core types: workload documents, collaborator traits and errors.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod error;
pub mod ids;
pub mod values;

pub use error::{CorralError, CorralResult};
pub use values::Document;

/// Label key carrying the workload id used by the generated selector.
pub const SELECTOR_LABEL: &str = "workload.user.cattle.io/workloadselector";

/// Annotation key holding the JSON-encoded scheduling state.
pub const STATE_ANNOTATION: &str = "workload.cattle.io/state";

/// Workload kinds served through the aggregate workload API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum WorkloadKind {
    Deployment,
    ReplicaSet,
    ReplicationController,
    DaemonSet,
    StatefulSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 7] = [
        WorkloadKind::Deployment,
        WorkloadKind::ReplicaSet,
        WorkloadKind::ReplicationController,
        WorkloadKind::DaemonSet,
        WorkloadKind::StatefulSet,
        WorkloadKind::Job,
        WorkloadKind::CronJob,
    ];

    /// Schema id as used in composite identifiers and selector values.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::ReplicaSet => "replicaSet",
            WorkloadKind::ReplicationController => "replicationController",
            WorkloadKind::DaemonSet => "daemonSet",
            WorkloadKind::StatefulSet => "statefulSet",
            WorkloadKind::Job => "job",
            WorkloadKind::CronJob => "cronJob",
        }
    }

    pub fn is_job_like(&self) -> bool {
        matches!(self, WorkloadKind::Job | WorkloadKind::CronJob)
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = CorralError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkloadKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CorralError::InvalidOption(format!("unknown workload kind: {}", s)))
    }
}

/// Job-like kinds get no selector and a different restart policy default.
/// Accepts any schema id, known or not.
pub fn is_job_like(kind: &str) -> bool {
    kind.eq_ignore_ascii_case("job") || kind.eq_ignore_ascii_case("cronJob")
}

/// Visibility of a registry credential.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CredentialScope {
    /// `dockerCredential`: visible to every namespace.
    Cluster,
    /// `namespacedDockerCredential`: bound to one namespace.
    Namespaced,
}

/// Per-registry detail of a credential. Only the domain key matters for resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub name: String,
    /// Set for namespaced credentials only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_id: Option<String>,
    /// Registry domain -> credential detail.
    #[serde(default)]
    pub registries: BTreeMap<String, RegistryCredential>,
}

/// Lists registry credentials visible to the caller.
#[async_trait::async_trait]
pub trait CredentialSource: Send + Sync {
    /// `namespace` is a filter hint for namespaced scope; callers still check `namespace_id`.
    async fn list_credentials(
        &self,
        scope: CredentialScope,
        namespace: Option<&str>,
    ) -> anyhow::Result<Vec<CredentialRecord>>;
}

/// Maps a human-facing node identifier to the cluster's internal node name.
#[async_trait::async_trait]
pub trait NodeLookup: Send + Sync {
    async fn resolve_node_name(&self, node_id: &str) -> anyhow::Result<String>;
}

/// Underlying persistence for workload documents.
#[async_trait::async_trait]
pub trait WorkloadStore: Send + Sync {
    async fn create(&self, kind: &str, data: Document) -> CorralResult<Document>;

    async fn update(&self, kind: &str, id: &str, data: Document) -> CorralResult<Document>;

    async fn by_id(&self, kind: &str, id: &str) -> CorralResult<Document>;
}

pub mod prelude {
    pub use super::{
        CorralError, CorralResult, CredentialRecord, CredentialScope, CredentialSource, Document,
        NodeLookup, RegistryCredential, WorkloadKind, WorkloadStore, SELECTOR_LABEL,
        STATE_ANNOTATION,
    };
}
