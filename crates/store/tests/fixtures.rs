use std::sync::Arc;

use corral_core::{Document, WorkloadStore};
use corral_store::{CustomizeStore, MemStore, StaticLookups};
use serde_json::json;

fn lookups() -> Arc<StaticLookups> {
    let fixture = json!({
        "credentials": [
            { "name": "global-quay", "registries": { "quay.io": {} } }
        ],
        "namespacedCredentials": [
            { "name": "team-quay", "namespaceId": "team-a", "registries": { "quay.io": { "username": "bot" } } },
            { "name": "other-quay", "namespaceId": "team-b", "registries": { "quay.io": {} } }
        ],
        "nodes": { "c-1:m-7": "ip-10-0-0-7" }
    });
    Arc::new(serde_json::from_value(fixture).unwrap())
}

fn doc(v: serde_json::Value) -> Document {
    v.as_object().cloned().unwrap()
}

#[tokio::test]
async fn fixture_lookups_drive_the_pipeline() {
    let l = lookups();
    let store = CustomizeStore::new(MemStore::new(), l.clone(), l);
    let mut created = store
        .create(
            "statefulSet",
            doc(json!({
                "name": "db",
                "namespaceId": "team-a",
                "containers": [ { "image": "quay.io/org/postgres:16" } ],
                "scheduling": { "node": { "nodeId": "c-1:m-7" } }
            })),
        )
        .await
        .unwrap();

    assert_eq!(
        created["imagePullSecrets"],
        json!([ { "name": "team-quay" }, { "name": "global-quay" } ])
    );
    assert_eq!(created["scheduling"]["node"]["nodeId"], json!("ip-10-0-0-7"));

    assert!(corral_sched::restore_node_id(&mut created));
    assert_eq!(created["scheduling"]["node"]["nodeId"], json!("c-1:m-7"));
}

#[tokio::test]
async fn long_ids_read_the_stored_workload() {
    let l = lookups();
    let store = CustomizeStore::new(MemStore::new(), l.clone(), l);
    store.create("daemonSet", doc(json!({ "name": "agent" }))).await.unwrap();
    let read = store.by_id("daemonSet", "daemonSet:agent:pod-1").await.unwrap();
    assert_eq!(read["id"], json!("daemonSet:agent"));
}
