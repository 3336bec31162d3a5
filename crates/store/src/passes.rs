//! Document passes with no external collaborators.

use corral_core::values::{self, Document};
use corral_core::{ids, is_job_like, SELECTOR_LABEL};
use serde_json::{Map, Value};
use tracing::debug;

/// Give non-job workloads without a selector a selector on their workload id,
/// and carry the same label into `workloadLabels` and `labels`.
pub fn set_selector(kind: &str, data: &mut Document) {
    if is_job_like(kind) || !values::is_empty(data.get("selector")) {
        return;
    }
    let workload_id = ids::workload_id(kind, data);
    debug!(kind = %kind, workload_id = %workload_id, "assigning selector");

    let mut match_labels = Map::new();
    match_labels.insert(SELECTOR_LABEL.into(), Value::String(workload_id.clone()));
    let mut selector = Map::new();
    selector.insert("matchLabels".into(), Value::Object(match_labels));
    data.insert("selector".into(), Value::Object(selector));

    for field in ["workloadLabels", "labels"] {
        values::put_value(data, Value::String(workload_id.clone()), &[field, SELECTOR_LABEL]);
    }
}

/// Jobs restart on failure unless told otherwise.
pub fn set_workload_defaults(kind: &str, data: &mut Document) {
    if is_job_like(kind) && !data.contains_key("restartPolicy") {
        data.insert("restartPolicy".into(), Value::String("OnFailure".into()));
    }
}

/// Surge settings mean nothing to a Recreate rollout.
pub fn set_strategy(data: &mut Document) {
    if values::get_string(data, &["deploymentConfig", "strategy"]) == "Recreate" {
        values::remove_value(data, &["deploymentConfig", "maxSurge"]);
        values::remove_value(data, &["deploymentConfig", "maxUnavailable"]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn selector_and_labels_are_assigned() {
        let mut d = doc(json!({ "name": "nginx", "namespaceId": "default", "labels": { "app": "web" } }));
        set_selector("deployment", &mut d);
        assert_eq!(d["selector"], json!({ "matchLabels": { SELECTOR_LABEL: "deployment-default-nginx" } }));
        assert_eq!(d["workloadLabels"], json!({ SELECTOR_LABEL: "deployment-default-nginx" }));
        assert_eq!(d["labels"], json!({ "app": "web", SELECTOR_LABEL: "deployment-default-nginx" }));
    }

    #[test]
    fn existing_selector_and_jobs_are_left_alone() {
        let mut d = doc(json!({ "name": "nginx", "selector": { "matchLabels": { "app": "web" } } }));
        let before = d.clone();
        set_selector("deployment", &mut d);
        assert_eq!(d, before);

        let mut job = doc(json!({ "name": "pi" }));
        set_selector("cronJob", &mut job);
        assert!(!job.contains_key("selector"));
        assert!(!job.contains_key("labels"));
    }

    #[test]
    fn empty_selector_counts_as_missing() {
        let mut d = doc(json!({ "name": "db", "namespaceId": "prod", "selector": {} }));
        set_selector("statefulSet", &mut d);
        assert_eq!(d["selector"]["matchLabels"][SELECTOR_LABEL], json!("statefulSet-prod-db"));
        let once = d.clone();
        set_selector("statefulSet", &mut d);
        assert_eq!(d, once);
    }

    #[test]
    fn jobs_default_to_on_failure() {
        let mut job = doc(json!({}));
        set_workload_defaults("Job", &mut job);
        assert_eq!(job["restartPolicy"], json!("OnFailure"));

        let mut explicit = doc(json!({ "restartPolicy": "Never" }));
        set_workload_defaults("cronJob", &mut explicit);
        assert_eq!(explicit["restartPolicy"], json!("Never"));

        let mut deploy = doc(json!({}));
        set_workload_defaults("deployment", &mut deploy);
        assert!(!deploy.contains_key("restartPolicy"));
    }

    #[test]
    fn recreate_drops_surge_settings() {
        let mut d = doc(json!({ "deploymentConfig": { "strategy": "Recreate", "maxSurge": 1, "maxUnavailable": 0, "minReadySeconds": 5 } }));
        set_strategy(&mut d);
        assert_eq!(d["deploymentConfig"], json!({ "strategy": "Recreate", "minReadySeconds": 5 }));

        let mut rolling = doc(json!({ "deploymentConfig": { "strategy": "RollingUpdate", "maxSurge": 1, "maxUnavailable": 0 } }));
        let before = rolling.clone();
        set_strategy(&mut rolling);
        assert_eq!(rolling, before);

        let mut none = doc(json!({ "name": "x" }));
        set_strategy(&mut none);
        assert_eq!(none, doc(json!({ "name": "x" })));
    }
}
