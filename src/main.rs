//! netcache - Transparent In-Network Key-Value Cache
//!
//! ```text
//! netcache node    --backend HOST:PORT   cache node + admin HTTP
//! netcache backend [KEY=VALUE ...]      reference backend store
//! netcache get     HOST KEY             one lookup
//! netcache rules   list|install|remove  pinned rule management
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use netcache::admin::{AdminClient, AdminServer, AdminService, NodeLifecycle};
use netcache::backend::{seed_pairs, BackendServer, BackendStore, InMemoryBackend};
use netcache::cache::DEFAULT_LEARNED_SLOTS;
use netcache::client::{self, DEFAULT_TIMEOUT};
use netcache::config::{NodeConfig, RulesFile};
use netcache::error::{Error, Result};
use netcache::node::CacheNodeServer;
use netcache::protocol::UDP_PORT;

// =============================================================================
// CLI Arguments
// =============================================================================

/// netcache - two-tier in-network key-value cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a cache node in front of a backend store
    Node(NodeArgs),

    /// Run the in-memory reference backend store
    Backend {
        /// UDP bind address
        #[arg(long, env = "NETCACHE_BACKEND_LISTEN", default_value = "0.0.0.0:1234")]
        listen: SocketAddr,

        /// Extra seed entries as KEY=VALUE on top of 1=11 2=22
        seeds: Vec<String>,
    },

    /// Look up one key
    Get {
        /// Cache node or backend host
        host: String,

        /// Key to look up
        key: u32,

        /// UDP port
        #[arg(long, default_value_t = UDP_PORT)]
        port: u16,

        /// Response timeout in milliseconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_millis() as u64)]
        timeout_ms: u64,
    },

    /// Manage pinned rules through a node's admin interface
    Rules {
        /// Admin interface base URL
        #[arg(long, env = "NETCACHE_ADMIN_URL", default_value = "http://127.0.0.1:8080")]
        admin: String,

        #[command(subcommand)]
        action: RulesAction,
    },
}

#[derive(clap::Args, Debug)]
struct NodeArgs {
    /// Client-facing UDP address
    #[arg(long, env = "NETCACHE_LISTEN", default_value = "0.0.0.0:1234")]
    listen: SocketAddr,

    /// Backend store address (host:port)
    #[arg(long, env = "NETCACHE_BACKEND")]
    backend: String,

    /// Learned cache slots (power of two)
    #[arg(long, env = "NETCACHE_SLOTS", default_value_t = DEFAULT_LEARNED_SLOTS)]
    slots: usize,

    /// How long a forwarded request waits for the backend
    #[arg(long, env = "NETCACHE_PENDING_TIMEOUT_MS", default_value = "5000")]
    pending_timeout_ms: u64,

    /// Pending sweep period
    #[arg(long, env = "NETCACHE_SWEEP_INTERVAL_MS", default_value = "1000")]
    sweep_interval_ms: u64,

    /// YAML file of pinned rules installed at startup
    #[arg(long, env = "NETCACHE_RULES_FILE")]
    rules_file: Option<PathBuf>,

    /// Admin HTTP bind address
    #[arg(long, env = "NETCACHE_ADMIN_ADDR", default_value = "0.0.0.0:8080")]
    admin_addr: SocketAddr,
}

#[derive(Subcommand, Debug)]
enum RulesAction {
    /// List pinned rules
    List,
    /// Install or overwrite a pinned rule
    Install { key: u32, value: u32 },
    /// Remove a pinned rule
    Remove { key: u32 },
    /// Show node counters
    Stats,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    match args.command {
        Command::Node(node) => run_node(node).await,
        Command::Backend { listen, seeds } => run_backend(listen, seeds).await,
        Command::Get {
            host,
            key,
            port,
            timeout_ms,
        } => run_get(&host, port, key, Duration::from_millis(timeout_ms)).await,
        Command::Rules { admin, action } => run_rules(&admin, action).await,
    }
}

async fn run_node(args: NodeArgs) -> Result<()> {
    let backend = resolve(&args.backend).await?;
    let config = NodeConfig {
        listen: args.listen,
        backend,
        slots: args.slots,
        pending_timeout: Duration::from_millis(args.pending_timeout_ms),
        sweep_interval: Duration::from_millis(args.sweep_interval_ms),
    };
    config.validate()?;

    info!("Starting netcache node");
    info!("  Listen: {}", config.listen);
    info!("  Backend: {}", config.backend);
    info!("  Learned slots: {}", config.slots);
    info!("  Pending timeout: {:?}", config.pending_timeout);

    let server = CacheNodeServer::bind(config).await?;
    let lifecycle = Arc::new(NodeLifecycle::new());
    let admin = Arc::new(AdminService::new(server.node().clone(), lifecycle.clone()));

    if let Some(path) = &args.rules_file {
        let rules = RulesFile::load(path)?;
        let installed = admin.load_rules(&rules)?;
        info!("Installed {} pinned rules from {}", installed, path.display());
    }

    let admin_server = AdminServer::bind(args.admin_addr, admin).await?;
    lifecycle.mark_ready();

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let admin_task = tokio::spawn(admin_server.run(shutdown.clone()));
    let result = server.run(shutdown.clone()).await;

    lifecycle.mark_stopping();
    shutdown.cancel();

    match admin_task.await {
        Ok(Err(e)) => error!("Admin server error: {}", e),
        Err(e) => error!("Admin server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Node shutdown complete");
    result
}

async fn run_backend(listen: SocketAddr, seeds: Vec<String>) -> Result<()> {
    let store = Arc::new(InMemoryBackend::with_entries(seed_pairs(&seeds)?));
    info!("Backend store seeded with {} keys", store.stats().keys);
    let server = BackendServer::bind(listen, store).await?;

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());
    server.run(shutdown).await
}

async fn run_get(host: &str, port: u16, key: u32, timeout: Duration) -> Result<()> {
    let server = resolve(&format!("{}:{}", host, port)).await?;

    match client::lookup(server, key, timeout).await {
        Ok(lookup) => {
            println!("{}", lookup);
            Ok(())
        }
        Err(Error::Timeout { .. }) => {
            eprintln!("No response from {} within {:?}", server, timeout);
            std::process::exit(1);
        }
        Err(e) => Err(e),
    }
}

async fn run_rules(admin: &str, action: RulesAction) -> Result<()> {
    let client = AdminClient::new(admin)?;

    match action {
        RulesAction::List => {
            for rule in client.list().await? {
                println!("{}\t{}\t{}", rule.key, rule.value, rule.installed_at.to_rfc3339());
            }
        }
        RulesAction::Install { key, value } => {
            let rule = client.install(key, value).await?;
            println!("{} -> {}", rule.key, rule.value);
        }
        RulesAction::Remove { key } => match client.remove(key).await? {
            Some(removed) => println!("removed {} -> {}", removed.key, removed.value),
            None => {
                eprintln!("no rule for key {}", key);
                std::process::exit(1);
            }
        },
        RulesAction::Stats => {
            let stats = client.stats().await?;
            let text = serde_json::to_string_pretty(&stats)
                .map_err(|e| Error::Internal(format!("Failed to render stats: {}", e)))?;
            println!("{}", text);
        }
    }

    Ok(())
}

async fn resolve(addr: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| Error::Config(format!("'{}' did not resolve to any address", addr)))
}

fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "hyper_util=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
