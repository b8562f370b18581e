//! meshlink node
//!
//! Starts a node on the local broadcast domain: announces itself,
//! collects peers, and answers `/ping` so other nodes can reach it.

use clap::Parser;
use serde_json::json;
use tracing::{info, Level};

use meshlink_core::{ephemeral_port, resolve_local_ip, NodeIdentity};
use meshlink_mesh::{Node, Payload};

#[derive(Parser)]
#[command(name = "meshlink-node")]
#[command(about = "LAN peer discovery and messaging node")]
struct Args {
    /// Port to serve requests on (random ephemeral port if omitted)
    #[arg(short, long)]
    port: Option<u16>,

    /// How often to log the current peer table, in seconds
    #[arg(long, default_value = "10")]
    status_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    // Fail fast: a node without a network identity must not run.
    let addr = resolve_local_ip()?;
    let port = args.port.unwrap_or_else(ephemeral_port);
    let identity = NodeIdentity::new(addr, port)?;

    info!("🆔 Node id: {}", identity.id());
    info!("🔌 Serving port: {}", identity.port());

    let mut node = Node::new(identity);

    node.register("/ping", |_, ctx| {
        let mut reply = Payload::new();
        reply.insert("id".into(), json!(ctx.local.id().as_str()));
        reply
    })
    .await;

    node.start().await?;

    let status_interval = tokio::time::Duration::from_secs(args.status_interval.max(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            _ = tokio::time::sleep(status_interval) => {
                let peers = node.peers().await;
                if peers.is_empty() {
                    info!("📡 no peers discovered yet");
                } else {
                    let ids: Vec<String> = peers.iter().map(|p| p.id.to_string()).collect();
                    info!("📡 {} peer(s): {}", ids.len(), ids.join(", "));
                }
            }
        }
    }

    node.shutdown().await;
    Ok(())
}
