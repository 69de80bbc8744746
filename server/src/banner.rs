//! Startup banner utilities.

use crate::config::Config;
use cache_store::{CorruptionPolicy, SyncLevel};
use std::fmt::Write;

/// Print a startup banner summarizing the effective configuration.
pub fn print_banner(version: &str, config: &Config) {
    let mut output = String::with_capacity(512);

    let name = "meshcached";
    writeln!(output, "{} v{}", name, version).unwrap();
    writeln!(
        output,
        "{}",
        "=".repeat(name.len() + version.len() + 2)
    )
    .unwrap();
    writeln!(output).unwrap();

    writeln!(output, "Store:").unwrap();
    writeln!(output, "  Path:       {}", config.store.path.display()).unwrap();
    let sync = match config.store.sync {
        SyncLevel::Off => "off",
        SyncLevel::Normal => "normal",
        SyncLevel::Full => "full",
    };
    let corruption = match config.store.corruption {
        CorruptionPolicy::Exit => "exit",
        CorruptionPolicy::Rename => "rename",
        CorruptionPolicy::Replace => "replace",
    };
    writeln!(output, "  Sync:       {}", sync).unwrap();
    writeln!(output, "  Corruption: {}", corruption).unwrap();
    if config.store.read_only {
        writeln!(output, "  Mode:       read-only").unwrap();
    }
    writeln!(output).unwrap();

    writeln!(output, "Replication:").unwrap();
    match config.replication.listen {
        Some(addr) => writeln!(output, "  Unicast:    {}", addr).unwrap(),
        None => writeln!(output, "  Unicast:    disabled").unwrap(),
    }
    match config.replication.multicast {
        Some(ref mc) => writeln!(
            output,
            "  Multicast:  {}:{} (ttl {})",
            mc.group, mc.port, mc.ttl
        )
        .unwrap(),
        None => writeln!(output, "  Multicast:  disabled").unwrap(),
    }
    writeln!(output, "  Peers:      {}", config.replication.peers.len()).unwrap();
    writeln!(output).unwrap();

    writeln!(output, "GC interval:  {}s", config.gc.interval_secs).unwrap();
    if config.rate.limit > 0 {
        writeln!(output, "Rate limit:   {}/min per source", config.rate.limit).unwrap();
    }
    writeln!(output).unwrap();

    print!("{}", output);
}
