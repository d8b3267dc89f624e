//! `flowsmith` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`: start the authoring API server.
//! - `validate`: check a saved workflow document.
//! - `catalog`: list the integrations a catalog offers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{EditorConfig, WorkflowDocument, WorkflowEditor};
use integrations::{CapabilityRegistry, SimulatedClient, StaticRegistry};

#[derive(Parser)]
#[command(name = "flowsmith", about = "Workflow graph authoring engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        /// Integration catalog JSON; the built-in catalog when omitted.
        #[arg(long, env = "FLOW_CATALOG")]
        catalog: Option<PathBuf>,
        #[arg(long, env = "FLOW_TEST_TIMEOUT_MS", default_value_t = 5000)]
        test_timeout_ms: u64,
        /// Simulated latency of node tests.
        #[arg(long, default_value_t = 200)]
        test_latency_ms: u64,
    },
    /// Validate a workflow document JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
        #[arg(long, env = "FLOW_CATALOG")]
        catalog: Option<PathBuf>,
    },
    /// Print the integrations and operations of a catalog.
    Catalog {
        #[arg(long, env = "FLOW_CATALOG")]
        catalog: Option<PathBuf>,
    },
}

fn load_registry(catalog: Option<&PathBuf>) -> anyhow::Result<StaticRegistry> {
    match catalog {
        Some(path) => StaticRegistry::from_path(path)
            .with_context(|| format!("cannot load catalog {}", path.display())),
        None => StaticRegistry::builtin().context("built-in catalog is invalid"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            catalog,
            test_timeout_ms,
            test_latency_ms,
        } => {
            let registry = load_registry(catalog.as_ref())?;
            info!("Loaded {} integrations", registry.len());
            let config = EditorConfig {
                test_timeout: Duration::from_millis(test_timeout_ms),
            };
            let client = SimulatedClient::new(Duration::from_millis(test_latency_ms));
            let state = api::AppState::new(Arc::new(registry), Arc::new(client), config);

            info!("Starting API server on {bind}");
            api::serve(&bind, state).await.context("API server failed")?;
        }
        Command::Validate { path, catalog } => {
            let registry = Arc::new(load_registry(catalog.as_ref())?);
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let document: WorkflowDocument =
                serde_json::from_str(&content).context("invalid workflow JSON")?;

            let editor = match WorkflowEditor::from_document(&document, registry, EditorConfig::default()) {
                Ok(editor) => editor,
                Err(e) => {
                    eprintln!("❌ Cannot load workflow: {e}");
                    std::process::exit(1);
                }
            };

            let report = editor.validate();
            for issue in report.errors.iter().chain(&report.warnings).chain(&report.notices) {
                let node = issue.node_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
                println!("{:?}\t{}\t{}\t{}", issue.severity, node, issue.code, issue.message);
            }

            if report.can_execute {
                let order = engine::dag::topological_order(editor.graph())?;
                println!("✅ '{}' can execute. Order: {order:?}", editor.flow_name());
            } else {
                eprintln!("❌ '{}' cannot execute ({} error(s))", editor.flow_name(), report.errors.len());
                std::process::exit(1);
            }
        }
        Command::Catalog { catalog } => {
            let registry = load_registry(catalog.as_ref())?;
            for spec in registry.integrations() {
                let auth = if spec.auth_required { " (auth)" } else { "" };
                println!("{} - {}{}", spec.id, spec.name, auth);
                for op in &spec.operations {
                    println!(
                        "    {:<8} {:<16} required: {:?}",
                        format!("{:?}", op.role).to_lowercase(),
                        op.id,
                        op.required_names().collect::<Vec<_>>()
                    );
                }
            }
        }
    }

    Ok(())
}
