//! Corral creds: resolve image pull secrets from registry credentials.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use corral_core::values::{self, Document};
use corral_core::{CredentialRecord, CredentialScope, CredentialSource};
use k8s_openapi::api::core::v1::LocalObjectReference;
use metrics::counter;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Registry domain -> secrets declared for it.
pub type DomainCreds = HashMap<String, Vec<LocalObjectReference>>;

/// Add one reference per (record, registry) pair, preserving record order.
pub fn index_credentials(records: &[CredentialRecord], into: &mut DomainCreds) {
    for record in records {
        for domain in record.registries.keys() {
            into.entry(domain.clone())
                .or_default()
                .push(LocalObjectReference { name: Some(record.name.clone()) });
        }
    }
}

/// Credentials visible from `namespace_id`: its namespaced credentials first,
/// then cluster-wide ones. Lookup failures count as "no credentials".
pub async fn domain_credentials(source: &dyn CredentialSource, namespace_id: &str) -> DomainCreds {
    let mut out = DomainCreds::new();
    match source.list_credentials(CredentialScope::Namespaced, Some(namespace_id)).await {
        Ok(records) => {
            let scoped: Vec<CredentialRecord> = records
                .into_iter()
                .filter(|r| r.namespace_id.as_deref().unwrap_or("") == namespace_id)
                .collect();
            index_credentials(&scoped, &mut out);
        }
        Err(e) => {
            counter!("creds_lookup_err_total", 1u64);
            warn!(ns = %namespace_id, error = %e, "listing namespaced credentials failed");
        }
    }
    match source.list_credentials(CredentialScope::Cluster, None).await {
        Ok(records) => index_credentials(&records, &mut out),
        Err(e) => {
            counter!("creds_lookup_err_total", 1u64);
            warn!(error = %e, "listing cluster credentials failed");
        }
    }
    out
}

/// Fill `imagePullSecrets` from the credentials matching each container image.
///
/// Caller-supplied `imagePullSecrets` win. References are appended per
/// container, so two containers on one registry list its secrets twice.
pub async fn set_secrets(data: &mut Document, source: &dyn CredentialSource) {
    if !matches!(values::get_value(data, &["imagePullSecrets"]), None | Some(Value::Null)) {
        return;
    }
    let images: Vec<String> = match values::get_slice(data, &["containers"]) {
        Some(containers) if !containers.is_empty() => containers
            .iter()
            .filter_map(Value::as_object)
            .map(|c| values::get_string(c, &["image"]))
            .filter(|image| !image.is_empty())
            .collect(),
        _ => return,
    };

    let creds = domain_credentials(source, &values::get_string(data, &["namespaceId"])).await;
    let mut secrets: Vec<LocalObjectReference> = Vec::new();
    for image in &images {
        match corral_image::registry_domain(image) {
            Ok(domain) => {
                if let Some(refs) = creds.get(&domain) {
                    secrets.extend(refs.iter().cloned());
                }
            }
            Err(e) => debug!(image = %image, error = %e, "unparsable image; skipping credential match"),
        }
    }
    if secrets.is_empty() {
        return;
    }
    match serde_json::to_value(&secrets) {
        Ok(v) => {
            info!(count = secrets.len(), "creds: image pull secrets resolved");
            values::put_value(data, v, &["imagePullSecrets"]);
        }
        Err(e) => warn!(error = %e, "failed to encode image pull secrets"),
    }
}
