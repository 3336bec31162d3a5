//! Corral ports: deterministic container port names and workload DNS names.
//!
//! Service objects are named after ports and are limited to 15 characters, so a
//! generated name is `<containerPort><protocol><sourcePort><kindCode>` with no
//! separators and the port kind compressed to a single digit.

#![forbid(unsafe_code)]

use corral_core::values::{self, Document};
use corral_core::{CorralError, CorralResult};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::{debug, warn};

pub const MAX_PORT_NAME_LEN: usize = 15;

/// Single-digit code for a port kind; unknown or unset kinds map to 0.
pub fn kind_code(kind: &str) -> u8 {
    match kind {
        "NodePort" => 1,
        "ClusterIP" => 2,
        "LoadBalancer" => 3,
        _ => 0,
    }
}

/// Derived name for a port that has none.
pub fn port_name(port: &Document) -> String {
    let container_port = match port.get("containerPort").map(values::to_number) {
        Some(Ok(n)) => n,
        Some(Err(e)) => {
            warn!(container_port = ?port.get("containerPort"), error = %e, "containerPort is not a number; using 0");
            0
        }
        None => {
            warn!("port has no containerPort; using 0");
            0
        }
    };
    format!(
        "{}{}{}{}",
        container_port,
        values::get_string(port, &["protocol"]).to_lowercase(),
        values::get_string(port, &["sourcePort"]).to_lowercase(),
        kind_code(&values::get_string(port, &["kind"]))
    )
}

/// Whether a port's DNS name should be (re)derived: it is empty, or it is one
/// this module generated earlier (the workload name, or `<workload>-<kind>`)
/// and may be stale after a kind change.
pub fn should_generate_dns_name(workload_name: &str, dns_name: &str) -> bool {
    if dns_name.is_empty() {
        return true;
    }
    dns_name.eq_ignore_ascii_case(workload_name) || dns_name.starts_with(&format!("{}-", workload_name))
}

/// ClusterIP ports resolve straight to the workload; other kinds get a suffix.
pub fn dns_name(workload_name: &str, kind: &str) -> String {
    if kind == "ClusterIP" {
        workload_name.to_lowercase()
    } else {
        format!("{}-{}", workload_name.to_lowercase(), kind.to_lowercase())
    }
}

struct PortPlan {
    index: usize,
    name: String,
    dns_name: Option<String>,
}

/// Name every port of every container and derive DNS names.
///
/// Names must be unique within a container. A duplicate fails the whole call
/// with `InvalidOption`; the offending container's ports are left untouched.
pub fn set_ports(workload_name: &str, data: &mut Document) -> CorralResult<()> {
    let Some(containers) = values::get_value_mut(data, &["containers"]).and_then(Value::as_array_mut) else {
        return Ok(());
    };

    for (ci, container) in containers.iter_mut().enumerate() {
        let Some(container) = container.as_object_mut() else {
            warn!(container = ci, "container is not a map; skipping port naming");
            continue;
        };
        let Some(ports) = container.get_mut("ports").and_then(Value::as_array_mut) else {
            continue;
        };
        let plan = plan_ports(workload_name, ports)?;
        for step in plan {
            if let Some(port) = ports.get_mut(step.index).and_then(Value::as_object_mut) {
                port.insert("name".into(), Value::String(step.name));
                if let Some(dns) = step.dns_name {
                    port.insert("dnsName".into(), Value::String(dns));
                }
            }
        }
    }
    Ok(())
}

fn plan_ports(workload_name: &str, ports: &[Value]) -> CorralResult<Vec<PortPlan>> {
    let mut used: SmallVec<[String; 8]> = SmallVec::new();
    let mut plan = Vec::with_capacity(ports.len());
    for (index, p) in ports.iter().enumerate() {
        let Some(port) = p.as_object() else {
            warn!(port = index, "port is not a map; skipping");
            continue;
        };
        let name = if values::is_empty(port.get("name")) {
            port_name(port)
        } else {
            values::get_string(port, &["name"])
        };

        if used.iter().any(|n| n == &name) {
            return Err(CorralError::InvalidOption(format!(
                "Duplicated port kind={}, containerPort={}, protocol={}",
                values::get_string(port, &["kind"]),
                values::get_string(port, &["containerPort"]),
                values::get_string(port, &["protocol"]),
            )));
        }
        used.push(name.clone());

        let kind = values::get_string(port, &["kind"]);
        let current = values::get_string(port, &["dnsName"]);
        let dns_name = if should_generate_dns_name(workload_name, &current) {
            Some(dns_name(workload_name, &kind))
        } else {
            debug!(dns_name = %current, "keeping user-provided dnsName");
            None
        };
        plan.push(PortPlan { index, name, dns_name });
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    fn ports_of(d: &Document, container: usize) -> Vec<Value> {
        d["containers"][container]["ports"].as_array().cloned().unwrap()
    }

    #[test]
    fn derives_names_from_port_fields() {
        let p = doc(json!({ "containerPort": 8080, "protocol": "TCP", "sourcePort": "30080", "kind": "NodePort" }));
        assert_eq!(port_name(&p), "8080tcp300801");
        let p = doc(json!({ "containerPort": "53", "protocol": "UDP", "kind": "ClusterIP" }));
        assert_eq!(port_name(&p), "53udp2");
        let p = doc(json!({ "containerPort": "http", "protocol": "TCP" }));
        assert_eq!(port_name(&p), "0tcp0");
    }

    #[test]
    fn generated_names_fit_service_name_limit() {
        for protocol in ["TCP", "UDP", "SCTP"] {
            for kind in ["NodePort", "ClusterIP", "LoadBalancer", ""] {
                let p = doc(json!({ "containerPort": 65535, "protocol": protocol, "sourcePort": "65535", "kind": kind }));
                let name = port_name(&p);
                assert!(name.len() <= MAX_PORT_NAME_LEN, "{} is too long", name);
            }
        }
    }

    #[test]
    fn dns_names_follow_kind() {
        let mut d = doc(json!({ "containers": [ { "image": "nginx", "ports": [
            { "containerPort": 80, "protocol": "TCP", "kind": "ClusterIP" },
            { "containerPort": 443, "protocol": "TCP", "kind": "NodePort" }
        ] } ] }));
        set_ports("web", &mut d).unwrap();
        let ports = ports_of(&d, 0);
        assert_eq!(ports[0]["name"], json!("80tcp2"));
        assert_eq!(ports[0]["dnsName"], json!("web"));
        assert_eq!(ports[1]["name"], json!("443tcp1"));
        assert_eq!(ports[1]["dnsName"], json!("web-nodeport"));
    }

    #[test]
    fn workload_name_is_lowercased_in_dns_names() {
        assert_eq!(dns_name("Web", "LoadBalancer"), "web-loadbalancer");
        assert_eq!(dns_name("Web", "ClusterIP"), "web");
    }

    #[test]
    fn regenerates_stale_dns_name_after_kind_change() {
        let mut d = doc(json!({ "containers": [ { "ports": [
            { "name": "http", "containerPort": 80, "kind": "ClusterIP", "dnsName": "web-nodeport" },
            { "name": "admin", "containerPort": 81, "kind": "NodePort", "dnsName": "admin.internal" }
        ] } ] }));
        set_ports("web", &mut d).unwrap();
        let ports = ports_of(&d, 0);
        assert_eq!(ports[0]["dnsName"], json!("web"));
        assert_eq!(ports[1]["dnsName"], json!("admin.internal"));
    }

    #[test]
    fn duplicate_names_in_one_container_are_rejected() {
        let mut d = doc(json!({ "containers": [ { "ports": [
            { "containerPort": 8080, "protocol": "TCP" },
            { "containerPort": 8080, "protocol": "TCP" }
        ] } ] }));
        let before = d.clone();
        let err = set_ports("web", &mut d).unwrap_err();
        assert_eq!(err.code(), "InvalidOption");
        assert!(err.to_string().contains("containerPort=8080"), "{}", err);
        assert!(err.to_string().contains("protocol=TCP"), "{}", err);
        assert_eq!(d, before);
    }

    #[test]
    fn same_name_in_different_containers_is_allowed() {
        let mut d = doc(json!({ "containers": [
            { "ports": [ { "name": "8080tcp", "containerPort": 8080 } ] },
            { "ports": [ { "name": "8080tcp", "containerPort": 8080 } ] }
        ] }));
        assert!(set_ports("web", &mut d).is_ok());
    }

    #[test]
    fn second_run_changes_nothing() {
        let mut d = doc(json!({ "containers": [ { "ports": [
            { "name": "http", "containerPort": 80, "protocol": "TCP", "kind": "ClusterIP" },
            { "name": "metrics", "containerPort": 9090, "protocol": "TCP", "kind": "NodePort" }
        ] } ] }));
        set_ports("web", &mut d).unwrap();
        let once = d.clone();
        set_ports("web", &mut d).unwrap();
        assert_eq!(d, once);
        assert_eq!(ports_of(&d, 0)[0]["name"], json!("http"));
    }

    #[test]
    fn documents_without_ports_are_untouched() {
        let mut d = doc(json!({ "containers": [ { "image": "nginx" }, "bogus" ] }));
        let before = d.clone();
        set_ports("web", &mut d).unwrap();
        assert_eq!(d, before);
        let mut empty = Document::new();
        set_ports("web", &mut empty).unwrap();
        assert!(empty.is_empty());
    }
}
