//! Command-line host for the Stratum provider.

mod config;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use std::io::Read;
use std::path::{Path, PathBuf};
use stratum_core::{AccessGrant, EncryptionKey};
use stratum_provider::{OperationContext, Provider, ResourceState};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stratumctl")]
#[command(about = "Reconcile Storj buckets, objects, access grants and edge credentials")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct GlobalArgs {
    /// Provider config file (TOML). STORJ_ environment variables override it.
    #[arg(long, global = true, env = "STRATUM_CONFIG")]
    config: Option<PathBuf>,

    /// Print sensitive attribute values instead of a placeholder
    #[arg(long, global = true, default_value_t = false)]
    show_sensitive: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a resource from a JSON configuration and print its state
    Apply {
        /// Resource type, e.g. storj_bucket
        type_name: String,
        /// Configuration file, or - for stdin
        #[arg(value_name = "CONFIG")]
        file: PathBuf,
    },
    /// Refresh a resource from a state file printed by apply
    Read {
        type_name: String,
        /// State file, or - for stdin
        state: PathBuf,
    },
    /// Destroy a resource described by a state file
    Destroy {
        type_name: String,
        /// State file, or - for stdin
        state: PathBuf,
    },
    /// Read a data source
    Query {
        /// Data source type, e.g. storj_objects
        type_name: String,
        /// Configuration file, or - for stdin
        #[arg(value_name = "CONFIG")]
        file: PathBuf,
    },
    /// List resource and data source types
    Types,
    /// Access grant utilities
    Grant {
        #[command(subcommand)]
        command: GrantCommands,
    },
}

#[derive(Subcommand)]
enum GrantCommands {
    /// Mint an unrestricted root grant for a local network
    Issue {
        /// Satellite address recorded in the grant
        #[arg(long)]
        satellite: String,
        /// Root secret of the network the grant is for
        #[arg(long, env = "STRATUM_ROOT_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Print the satellite, permission and scopes of a grant
    Inspect {
        /// Serialized grant (defaults to STORJ_ACCESS_GRANT)
        #[arg(long, env = "STORJ_ACCESS_GRANT", hide_env_values = true)]
        grant: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli { global, command } = Cli::parse();

    match command {
        Commands::Grant { command } => handle_grant_command(command),
        Commands::Types => {
            let provider = configure(&global).await?;
            let types = json!({
                "resources": provider.resource_types().collect::<Vec<_>>(),
                "data_sources": provider.data_source_types().collect::<Vec<_>>(),
            });
            print_json(&types)
        }
        Commands::Apply { type_name, file } => {
            let provider = configure(&global).await?;
            let config = read_json(&file)?;
            let ctx = cancellable_context(&provider);
            let resource = provider.resource(&type_name)?;
            let state = resource
                .create(&ctx, &config)
                .await
                .with_context(|| format!("failed to apply {type_name}"))?;
            print_state(&state, global.show_sensitive)
        }
        Commands::Read { type_name, state } => {
            let provider = configure(&global).await?;
            let state = read_state(&state)?;
            let ctx = cancellable_context(&provider);
            let resource = provider.resource(&type_name)?;
            let state = resource
                .read(&ctx, &state)
                .await
                .with_context(|| format!("failed to read {type_name}"))?;
            print_state(&state, global.show_sensitive)
        }
        Commands::Destroy { type_name, state } => {
            let provider = configure(&global).await?;
            let state = read_state(&state)?;
            let ctx = cancellable_context(&provider);
            let resource = provider.resource(&type_name)?;
            resource
                .delete(&ctx, &state)
                .await
                .with_context(|| format!("failed to destroy {type_name}"))?;
            tracing::info!(resource = %type_name, id = %state.id, "destroyed");
            Ok(())
        }
        Commands::Query { type_name, file } => {
            let provider = configure(&global).await?;
            let config = read_json(&file)?;
            let ctx = cancellable_context(&provider);
            let data_source = provider.data_source(&type_name)?;
            let state = data_source
                .read(&ctx, &config)
                .await
                .with_context(|| format!("failed to query {type_name}"))?;
            print_state(&state, global.show_sensitive)
        }
    }
}

async fn configure(global: &GlobalArgs) -> Result<Provider> {
    let config = config::load(global.config.as_deref())?;
    let provider = Provider::configure(config)
        .await
        .context("failed to configure provider")?;
    Ok(provider)
}

/// A context cancelled by Ctrl-C.
fn cancellable_context(provider: &Provider) -> OperationContext {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling operation");
            on_signal.cancel();
        }
    });
    provider.context_with_cancellation(cancel)
}

fn handle_grant_command(command: GrantCommands) -> Result<()> {
    match command {
        GrantCommands::Issue { satellite, secret } => {
            if secret.is_empty() {
                return Err(anyhow!("--secret must not be empty"));
            }
            let grant = AccessGrant::issue(satellite, secret.as_bytes(), EncryptionKey::generate())
                .context("failed to issue access grant")?;
            let serialized = grant.serialize().context("failed to serialize access grant")?;
            println!("{serialized}");
            Ok(())
        }
        GrantCommands::Inspect { grant } => {
            let grant = AccessGrant::parse(&grant).context("failed to parse access grant")?;
            let scopes: Vec<Vec<String>> = grant
                .scope_restrictions()
                .map(|set| set.iter().map(ToString::to_string).collect())
                .collect();
            print_json(&json!({
                "satellite_address": grant.satellite_address(),
                "permission": grant.effective_permission(),
                "scopes": scopes,
            }))
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let input = read_input(path)?;
    serde_json::from_str(&input).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn read_state(path: &Path) -> Result<ResourceState> {
    let input = read_input(path)?;
    serde_json::from_str(&input).with_context(|| format!("invalid state in {}", path.display()))
}

fn print_state(state: &ResourceState, show_sensitive: bool) -> Result<()> {
    if show_sensitive {
        print_json(state)
    } else {
        print_json(&state.redacted())
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{out}");
    Ok(())
}
