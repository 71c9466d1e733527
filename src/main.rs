use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use shardboot::{BootstrapState, ClusterConfig, ClusterTopology, InMemoryBackend, simulate};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shardboot")]
#[command(about = "Bootstrap sharded replica-set clusters")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the default configuration as JSON
    DefaultConfig,
    /// Load and validate a configuration file
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Run the bootstrap against the in-memory backend and print every call
    Simulate {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Address lookups answered with "not assigned" before each node gets one
        #[arg(long, default_value_t = 0)]
        address_delay: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::DefaultConfig => {
            println!("{}", ClusterConfig::default().to_json_pretty()?);
            Ok(())
        }
        Command::Validate { config } => validate(&config),
        Command::Simulate {
            config,
            address_delay,
        } => run_simulation(config.as_deref(), address_delay).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shardboot=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: &Path) -> Result<ClusterConfig> {
    ClusterConfig::from_json_file(path)
        .with_context(|| format!("Failed to load config '{}'", path.display()))
}

fn validate(path: &Path) -> Result<()> {
    let topology = ClusterTopology::new(load_config(path)?)
        .with_context(|| format!("Config '{}' is not a valid topology", path.display()))?;

    println!(
        "{} nodes ({}_0..{}_{}), shard set '{}' on port {}, config set '{}' on port {}",
        topology.shard_count(),
        topology.config().environment_name_prefix,
        topology.config().environment_name_prefix,
        topology.shard_count() - 1,
        topology.shard_replica_set_name(),
        topology.shard_port(),
        topology.config_replica_set_name(),
        topology.config_port()
    );
    Ok(())
}

async fn run_simulation(path: Option<&Path>, address_delay: u32) -> Result<()> {
    let config = match path {
        Some(path) => load_config(path)?,
        None => ClusterConfig::default(),
    };

    let backend = InMemoryBackend::new();
    backend.set_default_address_delay(address_delay).await;

    let simulation = simulate(config, backend).await;
    println!("{}", serde_json::to_string_pretty(&simulation)?);

    match &simulation.state {
        BootstrapState::Ready => {
            info!(run_id = %simulation.report.run_id, "simulation reached ready");
            Ok(())
        }
        BootstrapState::Failed { phase, error } => {
            Err(anyhow!("simulation failed during {}: {}", phase, error))
        }
        BootstrapState::Pending { phase } => Err(anyhow!("simulation stopped before {}", phase)),
    }
}
