//! meshcache node daemon.

use clap::Parser;
use server::banner::print_banner;
use server::config::Config;
use server::{logging, signal, CacheNode, NoHooks};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "meshcached")]
#[command(about = "Replicated persistent cache node for mail-filtering clusters")]
struct Args {
    /// Path to configuration file
    config: Option<PathBuf>,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return;
    }

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            eprintln!("No config file specified. Use meshcached <path> or --print-config");
            std::process::exit(1);
        }
    };

    logging::init(&config.logging);

    let shutdown = signal::shutdown_flag();

    if let Err(e) = run(config, shutdown) {
        tracing::error!(error = %e, "node error");
        std::process::exit(1);
    }
}

fn run(
    config: Config,
    shutdown: std::sync::Arc<std::sync::atomic::AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    print_banner(env!("CARGO_PKG_VERSION"), &config);

    let node = CacheNode::new(&config, Box::new(NoHooks))?;
    node.start()?;
    tracing::info!("node running");

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    tracing::info!("stopping node");
    node.stop();
    Ok(())
}

fn print_default_config() {
    let config = r#"# meshcached configuration

[store]
# Path of the cache database file
path = "/var/cache/meshcache/node.db"

# Open the store read-only (the file must already exist)
# read_only = false

# Recovery behavior on a damaged file: "exit", "rename", or "replace"
corruption = "rename"

# Durability level: "off" (no forced flush), "normal" (flush on commit),
# or "full" (full flush including directory metadata)
sync = "normal"

[replication]
# Shared secret authenticating peer frames.
# Required whenever any plane or peer is configured.
# secret = "change-me"

# Unicast listen address for frames from explicit peers
# listen = "0.0.0.0:6920"

# Unicast peers to which local mutations are sent
# peers = ["192.0.2.10:6920", "192.0.2.11:6920"]

# Multicast group membership
# [replication.multicast]
# group = "239.255.70.90"
# port = 6921
# ttl = 1

[gc]
# Seconds between sweeps of expired rows
interval_secs = 300

[rate]
# Maximum frames per minute accepted from one source IP (0 = unlimited)
limit = 0

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
# Can be overridden with RUST_LOG environment variable
level = "info"
# Log format: "pretty" (human-readable), "json", or "compact"
format = "pretty"
# Include timestamps
timestamps = true
# Include thread names
thread_names = false
# Include module target
target = true
"#;
    print!("{}", config);
}
