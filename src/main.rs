//! Huddle messaging hub
//!
//! Runs the QUIC connection broker with the in-memory store and a static
//! development token table.
//!
//! Usage:
//!   cargo run -- server                    # Run the hub
//!   cargo run -- server --port 4433       # Run on a specific port

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use huddle::auth::{Identity, StaticTokenAuth};
use huddle::server::broker::{Broker, BrokerConfig};
use huddle::store::MemoryStore;
use huddle::new_id;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "server" => run_server(&args).await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("Huddle - QUIC Messaging Hub");
    println!();
    println!("USAGE:");
    println!("    cargo run -- server [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    server              Start the messaging hub");
    println!("    help                Show this help message");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>       Port to listen on (default: 4433)");
    println!("    --max-conn <NUM>    Maximum connections (default: 10000)");
    println!();
    println!("ENVIRONMENT:");
    println!("    HUDDLE_DEV_TOKENS   Comma-separated token=username pairs for");
    println!("                        the development auth table");
    println!();
    println!("EXAMPLES:");
    println!("    HUDDLE_DEV_TOKENS=s3cret=alice cargo run -- server");
    println!("    RUST_LOG=debug cargo run -- server --port 5000");
}

fn parse_port(args: &[String]) -> u16 {
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            if let Ok(port) = args[i + 1].parse() {
                return port;
            }
        }
    }
    4433
}

fn parse_max_connections(args: &[String]) -> usize {
    for i in 0..args.len() {
        if args[i] == "--max-conn" && i + 1 < args.len() {
            if let Ok(max) = args[i + 1].parse() {
                return max;
            }
        }
    }
    10000
}

/// Build the development auth table from HUDDLE_DEV_TOKENS
///
/// Format: `token=username,token=username`. Each entry gets a freshly
/// generated user ID.
fn dev_auth_from_env() -> anyhow::Result<StaticTokenAuth> {
    let mut auth = StaticTokenAuth::new();

    if let Ok(raw) = env::var("HUDDLE_DEV_TOKENS") {
        for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
            let (token, username) = entry
                .split_once('=')
                .with_context(|| format!("invalid HUDDLE_DEV_TOKENS entry: {}", entry))?;
            auth.insert(
                token.trim(),
                Identity {
                    user_id: new_id(),
                    username: username.trim().to_string(),
                },
            );
        }
    }

    Ok(auth)
}

async fn run_server(args: &[String]) -> anyhow::Result<()> {
    let config = BrokerConfig {
        bind_addr: format!("0.0.0.0:{}", parse_port(args)).parse()?,
        max_connections: parse_max_connections(args),
        idle_timeout: Duration::from_secs(300),
        ..Default::default()
    };

    let auth = dev_auth_from_env()?;
    if auth.is_empty() {
        info!("HUDDLE_DEV_TOKENS not set; no client will be able to authenticate");
    } else {
        info!("Loaded {} development token(s)", auth.len());
    }

    info!("Configuration:");
    info!("  - Bind address: {}", config.bind_addr);
    info!("  - Max connections: {}", config.max_connections);

    let broker = Arc::new(Broker::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(auth),
    ));

    broker.run().await.context("broker exited with error")
}
