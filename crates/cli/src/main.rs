use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use corral_core::{ids, values, CredentialSource, Document, NodeLookup, WorkloadKind, WorkloadStore};
use corral_persist::SqliteStore;
use corral_store::{CustomizeStore, MemStore, StaticLookups};
use serde_json::Value;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "corralctl", version, about = "Corral workload normalization CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// SQLite database file
    #[arg(long = "db", global = true, env = "CORRAL_DB_PATH")]
    db: Option<String>,

    /// Keep workloads in memory for this invocation only
    #[arg(long = "memory", global = true, action = ArgAction::SetTrue)]
    memory: bool,

    /// YAML/JSON fixture with credentials and nodes
    #[arg(long = "lookups", global = true)]
    lookups: Option<PathBuf>,

    /// Resolve credentials and nodes against the current kube context
    #[arg(long = "kube", global = true, action = ArgAction::SetTrue, conflicts_with = "lookups")]
    kube: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Normalize and store a new workload
    Create {
        /// Workload kind, e.g. "deployment" or "cronJob"
        #[arg(long = "kind")]
        kind: String,
        /// Workload document (YAML or JSON; "-" for stdin)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Normalize and store an updated workload
    Update {
        /// Composite id, e.g. "deployment:web"
        #[arg(long = "id")]
        id: String,
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Read a stored workload
    Get {
        /// Composite id, e.g. "deployment:web"
        #[arg(long = "id")]
        id: String,
        /// Show the node identifier originally submitted instead of the resolved node
        #[arg(long = "display", action = ArgAction::SetTrue)]
        display: bool,
    },
    /// Print the scheduling state recorded on a workload document
    State {
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Print the derived name for a port
    PortName {
        #[arg(long = "container-port")]
        container_port: i64,
        #[arg(long = "protocol", default_value = "TCP")]
        protocol: String,
        #[arg(long = "source-port")]
        source_port: Option<String>,
        /// NodePort, ClusterIP or LoadBalancer
        #[arg(long = "kind")]
        kind: Option<String>,
    },
}

fn init_tracing() {
    let env = std::env::var("CORRAL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CORRAL_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CORRAL_METRICS_ADDR; expected host:port");
        }
    }
}

fn read_document(path: &Path) -> Result<Document> {
    let raw = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("reading document from stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    // YAML is a superset of JSON
    serde_yaml::from_str(&raw).with_context(|| format!("parsing {} as a workload document", path.display()))
}

async fn collaborators(cli: &Cli) -> Result<(Arc<dyn CredentialSource>, Arc<dyn NodeLookup>)> {
    if cli.kube {
        let client = corral_kubehub::get_kube_client().await?;
        let creds = corral_kubehub::KubeCredentialSource::from_env(client.clone());
        let nodes = corral_kubehub::KubeNodeLookup::new(client);
        return Ok((Arc::new(creds), Arc::new(nodes)));
    }
    let lookups: StaticLookups = match &cli.lookups {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_yaml::from_str(&raw).with_context(|| format!("parsing lookups {}", path.display()))?
        }
        None => StaticLookups::default(),
    };
    let lookups = Arc::new(lookups);
    Ok((lookups.clone(), lookups))
}

fn print_document(output: Output, data: &Document) -> Result<()> {
    match output {
        Output::Human => {
            println!("ID                   NAMESPACE   NODE");
            let node = values::get_string(data, &["scheduling", "node", "nodeId"]);
            let ns = values::get_string(data, &["namespaceId"]);
            println!(
                "{:<20} {:<11} {}",
                values::get_string(data, &["id"]),
                if ns.is_empty() { "-" } else { ns.as_str() },
                if node.is_empty() { "-" } else { node.as_str() },
            );
            for container in values::get_slice(data, &["containers"]).into_iter().flatten().filter_map(Value::as_object) {
                for port in values::get_slice(container, &["ports"]).into_iter().flatten().filter_map(Value::as_object) {
                    println!(
                        "  port {} -> {}",
                        values::get_string(port, &["name"]),
                        values::get_string(port, &["dnsName"])
                    );
                }
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(data)?),
        Output::Yaml => print!("{}", serde_yaml::to_string(data)?),
    }
    Ok(())
}

async fn run<S: WorkloadStore>(store: CustomizeStore<S>, command: Commands, output: Output) -> Result<()> {
    match command {
        Commands::Create { kind, file } => {
            let kind = WorkloadKind::from_str(&kind)?;
            let data = read_document(&file)?;
            info!(kind = %kind, file = %file.display(), "create invoked");
            let created = store.create(kind.as_str(), data).await?;
            print_document(output, &created)?;
        }
        Commands::Update { id, file } => {
            let kind = kind_of(&id)?;
            let data = read_document(&file)?;
            info!(kind = %kind, id = %id, "update invoked");
            let updated = store.update(kind.as_str(), &id, data).await?;
            print_document(output, &updated)?;
        }
        Commands::Get { id, display } => {
            let kind = kind_of(&id)?;
            let mut data = store.by_id(kind.as_str(), &id).await?;
            if display && !corral_sched::restore_node_id(&mut data) {
                info!(id = %id, "no recorded node identifier to restore");
            }
            print_document(output, &data)?;
        }
        Commands::State { .. } | Commands::PortName { .. } => {
            return Err(anyhow!("command does not read or write workloads"));
        }
    }
    Ok(())
}

fn kind_of(id: &str) -> Result<WorkloadKind> {
    match ids::split_type_and_id(id) {
        (Some(ty), _) => Ok(WorkloadKind::from_str(ty)?),
        (None, _) => Err(anyhow!("id {} has no kind prefix (expect <kind>:<name>)", id)),
    }
}

fn print_state(output: Output, file: &Path) -> Result<()> {
    let data = read_document(file)?;
    let state = corral_sched::decode_state(&data);
    match output {
        Output::Human => {
            println!("NODE                 NODE ID");
            for (key, node_id) in state.iter() {
                let node = corral_sched::node_name_from_key(key).unwrap_or_else(|| format!("<{}>", key));
                println!("{:<20} {}", node, node_id);
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&state)?),
        Output::Yaml => print!("{}", serde_yaml::to_string(&state)?),
    }
    Ok(())
}

fn port_document(container_port: i64, protocol: &str, source_port: Option<&str>, kind: Option<&str>) -> Document {
    let mut port = Document::new();
    port.insert("containerPort".into(), Value::from(container_port));
    port.insert("protocol".into(), Value::from(protocol));
    if let Some(sp) = source_port {
        port.insert("sourcePort".into(), Value::from(sp));
    }
    if let Some(k) = kind {
        port.insert("kind".into(), Value::from(k));
    }
    port
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match &cli.command {
        Commands::State { file } => return print_state(cli.output, file),
        Commands::PortName { container_port, protocol, source_port, kind } => {
            let port = port_document(*container_port, protocol, source_port.as_deref(), kind.as_deref());
            println!("{}", corral_ports::port_name(&port));
            return Ok(());
        }
        _ => {}
    }

    let (creds, nodes) = collaborators(&cli).await?;
    let output = cli.output;
    let result = if cli.memory {
        run(CustomizeStore::new(MemStore::new(), creds, nodes), cli.command, output).await
    } else {
        let sqlite = match &cli.db {
            Some(path) => SqliteStore::open(path)?,
            None => SqliteStore::open_default()?,
        };
        run(CustomizeStore::new(sqlite, creds, nodes), cli.command, output).await
    };
    if let Err(e) = &result {
        error!(error = ?e, "command failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_come_from_id_prefix() {
        assert_eq!(kind_of("cronJob:backup").unwrap(), WorkloadKind::CronJob);
        assert!(kind_of("backup").is_err());
        assert!(kind_of("pod:web").is_err());
    }

    #[test]
    fn port_flags_build_named_port() {
        let port = port_document(8080, "UDP", Some("30080"), Some("NodePort"));
        assert_eq!(corral_ports::port_name(&port), "8080udp300801");
        let bare = port_document(80, "TCP", None, None);
        assert_eq!(corral_ports::port_name(&bare), "80tcp0");
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::try_parse_from(["corralctl", "--memory", "-o", "yaml", "get", "--id", "deployment:web"]).unwrap();
        assert!(cli.memory);
        assert_eq!(cli.output, Output::Yaml);
        assert!(matches!(cli.command, Commands::Get { ref id, display: false } if id == "deployment:web"));
    }
}
