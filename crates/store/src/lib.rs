//! Corral store: the workload normalization pipeline and in-RAM storage.
//!
//! [`CustomizeStore`] wraps any [`WorkloadStore`] and rewrites documents in
//! flight before they reach it. Create runs every pass, update re-runs the
//! passes that depend on mutable fields, and reads only normalize the id.

#![forbid(unsafe_code)]

mod lookups;
mod mem;
mod passes;

use std::sync::Arc;
use std::time::Instant;

use corral_core::{ids, CorralResult, CredentialSource, Document, NodeLookup, WorkloadStore};
use metrics::{counter, histogram};
use tracing::{debug, info, warn};

pub use lookups::StaticLookups;
pub use mem::MemStore;
pub use passes::{set_selector, set_strategy, set_workload_defaults};

/// Pipeline decorator over an inner store.
pub struct CustomizeStore<S> {
    inner: S,
    creds: Arc<dyn CredentialSource>,
    nodes: Arc<dyn NodeLookup>,
}

impl<S: WorkloadStore> CustomizeStore<S> {
    pub fn new(inner: S, creds: Arc<dyn CredentialSource>, nodes: Arc<dyn NodeLookup>) -> Self {
        Self { inner, creds, nodes }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Passes applied to a new workload, in order.
    pub async fn prepare_create(&self, kind: &str, data: &mut Document) -> CorralResult<()> {
        let started = Instant::now();
        passes::set_selector(kind, data);
        passes::set_workload_defaults(kind, data);
        corral_creds::set_secrets(data, self.creds.as_ref()).await;
        let name = corral_core::values::get_string(data, &["name"]);
        corral_ports::set_ports(&name, data)?;
        corral_sched::set_scheduling(data, self.nodes.as_ref()).await;
        passes::set_strategy(data);
        histogram!("workload_pipeline_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    /// Passes applied to an update of `id`; selector, defaults and secrets are
    /// fixed at creation.
    pub async fn prepare_update(&self, id: &str, data: &mut Document) -> CorralResult<()> {
        let started = Instant::now();
        corral_ports::set_ports(ids::short_id(id), data)?;
        corral_sched::set_scheduling(data, self.nodes.as_ref()).await;
        passes::set_strategy(data);
        histogram!("workload_pipeline_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: WorkloadStore> WorkloadStore for CustomizeStore<S> {
    async fn create(&self, kind: &str, mut data: Document) -> CorralResult<Document> {
        info!(kind = %kind, "store: create start");
        counter!("workload_create_total", 1u64);
        if let Err(e) = self.prepare_create(kind, &mut data).await {
            counter!("workload_rejected_total", 1u64);
            warn!(kind = %kind, error = %e, "store: create rejected");
            return Err(e);
        }
        self.inner.create(kind, data).await
    }

    async fn update(&self, kind: &str, id: &str, mut data: Document) -> CorralResult<Document> {
        info!(kind = %kind, id = %id, "store: update start");
        counter!("workload_update_total", 1u64);
        if let Err(e) = self.prepare_update(id, &mut data).await {
            counter!("workload_rejected_total", 1u64);
            warn!(kind = %kind, id = %id, error = %e, "store: update rejected");
            return Err(e);
        }
        self.inner.update(kind, id, data).await
    }

    async fn by_id(&self, kind: &str, id: &str) -> CorralResult<Document> {
        counter!("workload_read_total", 1u64);
        let read = ids::read_id(id);
        debug!(kind = %kind, id = %id, read = %read, "store: read");
        self.inner.by_id(kind, read).await
    }
}
