//! MPC Wallet CLI
//!
//! Command-line tool for inspecting the dApp provider's method table and
//! simulating dApp traffic against it.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mpc_wallet_provider::{
    Account, AccountKind, ChainType, ConnectionRecord, MemoryBackend, MemorySession, Namespace,
    PopupOutcome, PopupRoute, ProviderConfig, ProviderError, RpcResponse, VERSION, WalletProvider,
    popup::ChannelPopupHost, registry, typed_data,
};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ACCOUNT: &str = "0x1234567890123456789012345678901234567890";

#[derive(Parser)]
#[command(name = "mpc-wallet")]
#[command(about = "MPC Agent Wallet dApp provider CLI", version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show provider information
    Info,

    /// List registered dApp methods
    Methods {
        /// Only methods in this namespace (internal, wallet, evm, solana)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Only methods that open an approval popup
        #[arg(long)]
        popup_only: bool,

        /// Only methods refused while a hardware signer is active
        #[arg(long)]
        hardware_restricted: bool,

        /// Print the full method configs as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate an EIP-712 typed data payload
    ValidateTypedData {
        /// JSON file holding the payload
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Run a batch of dApp requests against an in-memory wallet
    Simulate {
        /// JSON file holding an array of request envelopes
        #[arg(short, long)]
        file: PathBuf,

        /// Provider config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Active chain family (evm, solana)
        #[arg(long, default_value = "evm")]
        chain: String,

        /// Active account address
        #[arg(long, default_value = DEFAULT_ACCOUNT)]
        account: String,

        /// Treat the active account as a hardware signer
        #[arg(long)]
        hardware: bool,

        /// Reject every popup instead of approving it
        #[arg(long)]
        reject: bool,

        /// Origins connected before the batch runs
        #[arg(long, value_delimiter = ',')]
        connect: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .pretty()
        .init();

    match cli.command {
        Commands::Info => {
            show_info();
        }

        Commands::Methods {
            namespace,
            popup_only,
            hardware_restricted,
            json,
        } => {
            list_methods(namespace.as_deref(), popup_only, hardware_restricted, json)?;
        }

        Commands::ValidateTypedData { file } => {
            validate_typed_data(&file)?;
        }

        Commands::Simulate {
            file,
            config,
            chain,
            account,
            hardware,
            reject,
            connect,
        } => {
            let kind = if hardware {
                AccountKind::Hardware
            } else {
                AccountKind::Mpc
            };
            let options = SimulateOptions {
                chain: chain.parse()?,
                account: Account::new(account, kind),
                reject,
                connect,
            };
            simulate(&file, config.as_deref(), options).await?;
        }
    }

    Ok(())
}

fn show_info() {
    println!("MPC Agent Wallet dApp Provider");
    println!("==============================");
    println!();
    println!("Version: {}", VERSION);
    println!();
    println!("Policy pipeline:");
    for (i, stage) in pipeline_stage_names().iter().enumerate() {
        println!("  {}. {}", i + 1, stage);
    }
    println!();
    println!("Registered methods: {}", registry::all().len());
    for namespace in Namespace::all() {
        println!(
            "  {:<9} {}",
            namespace.to_string(),
            registry::by_namespace(namespace).len()
        );
    }
    println!();
    println!("With approval popup:      {}", registry::popup_methods().len());
    println!(
        "Hardware restricted:      {}",
        registry::hardware_restricted_methods().len()
    );
    println!("Cached reads:             {}", registry::cacheable_methods().len());
}

/// Stage names of a default provider's pipeline
fn pipeline_stage_names() -> Vec<&'static str> {
    let (host, _popups) = ChannelPopupHost::new();
    WalletProvider::builder()
        .session(Arc::new(MemorySession::new(ChainType::Evm, None)))
        .popup_host(host)
        .build()
        .map(|provider| provider.pipeline().stage_names())
        .unwrap_or_default()
}

fn list_methods(
    namespace: Option<&str>,
    popup_only: bool,
    hardware_restricted: bool,
    as_json: bool,
) -> Result<()> {
    let namespace = match namespace {
        Some(name) => Some(
            Namespace::all()
                .into_iter()
                .find(|ns| ns.to_string().eq_ignore_ascii_case(name))
                .with_context(|| format!("unknown namespace: {}", name))?,
        ),
        None => None,
    };

    let methods: Vec<_> = registry::all()
        .iter()
        .filter(|m| namespace.is_none_or(|ns| m.namespace == ns))
        .filter(|m| !popup_only || m.has_approval_popup())
        .filter(|m| !hardware_restricted || !m.allowed_for_hardware_wallet)
        .collect();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&methods)?);
        return Ok(());
    }

    println!("{:<36} {:<9} {:<18} FLAGS", "METHOD", "NAMESPACE", "POPUP");
    for method in &methods {
        let mut flags = Vec::new();
        if method.requires_authentication {
            flags.push("auth");
        }
        if method.requires_connection {
            flags.push("connected");
        }
        if !method.allowed_for_hardware_wallet {
            flags.push("no-hw");
        }
        if method.is_blocking_operation {
            flags.push("blocking");
        }
        if method.requires_explicit_accept {
            flags.push("explicit");
        }
        if method.cache.is_some() {
            flags.push("cached");
        }
        println!(
            "{:<36} {:<9} {:<18} {}",
            method.name,
            method.namespace.to_string(),
            method.popup_route().map(|r| r.as_str()).unwrap_or("-"),
            flags.join(",")
        );
    }
    println!();
    println!("{} method(s)", methods.len());
    Ok(())
}

fn validate_typed_data(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let value: Value = serde_json::from_str(&text).context("payload is not valid JSON")?;

    match typed_data::validate(&value) {
        Ok(primary) => {
            info!("Typed data is valid");
            println!("Primary type: {}", primary);
            Ok(())
        }
        Err(e) => bail!("invalid typed data: {}", e),
    }
}

struct SimulateOptions {
    chain: ChainType,
    account: Account,
    reject: bool,
    connect: Vec<String>,
}

async fn simulate(
    file: &Path,
    config: Option<&Path>,
    options: SimulateOptions,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let requests: Vec<Value> =
        serde_json::from_str(&text).context("requests must be a JSON array")?;

    let config = match config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ProviderConfig::from_json(&json)?
        }
        None => ProviderConfig::default(),
    };

    info!(
        "Simulating {} request(s) on {} as {}",
        requests.len(),
        options.chain,
        options.account.id
    );

    let (host, mut popups) = ChannelPopupHost::new();
    let provider = Arc::new(
        WalletProvider::builder()
            .config(config)
            .session(Arc::new(MemorySession::new(
                options.chain,
                Some(options.account.clone()),
            )))
            .popup_host(host)
            .backend(Arc::new(MemoryBackend::with_defaults(ChainType::Evm)))
            .backend(Arc::new(MemoryBackend::with_defaults(ChainType::Solana)))
            .build()?,
    );

    for origin in &options.connect {
        provider
            .connections()
            .connect(ConnectionRecord::new(origin, &options.account))?;
        debug!("Pre-connected {}", origin);
    }

    // Stands in for the user: answers every popup as it opens
    let user = {
        let provider = provider.clone();
        let reject = options.reject;
        tokio::spawn(async move {
            while let Some(popup) = popups.recv().await {
                let outcome = match popup.route {
                    PopupRoute::SpamWarning => PopupOutcome::Approved(json!({ "block": reject })),
                    _ if reject => PopupOutcome::rejected(),
                    _ => PopupOutcome::approved(),
                };
                info!(
                    "Popup {} from {}: {}",
                    popup.route.as_str(),
                    popup.caller_origin,
                    if outcome.is_approved() { "approved" } else { "rejected" }
                );
                if let Err(e) =
                    provider.resolve_popup(&popup.event_name, &popup.caller_origin, outcome)
                {
                    debug!("Popup already settled: {}", e);
                }
            }
        })
    };

    let calls: Vec<_> = requests
        .into_iter()
        .map(|raw| {
            let id = raw.get("id").cloned().unwrap_or(Value::Null);
            let provider = provider.clone();
            (id, tokio::spawn(async move { provider.request_value(raw).await }))
        })
        .collect();
    let responses = collect_responses(calls).await;
    user.abort();

    println!("{}", serde_json::to_string_pretty(&responses)?);
    Ok(())
}

/// Await every call in input order; a failed task still yields an envelope
async fn collect_responses(calls: Vec<(Value, JoinHandle<RpcResponse>)>) -> Vec<RpcResponse> {
    let mut responses = Vec::with_capacity(calls.len());
    for (id, handle) in calls {
        match handle.await {
            Ok(response) => responses.push(response),
            Err(e) => {
                warn!(id = %id, "Request task failed: {}", e);
                let err = ProviderError::Internal(format!("request task failed: {}", e));
                responses.push(RpcResponse::failure(id, &err));
            }
        }
    }
    responses
}
