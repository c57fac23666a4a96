use autoscaling_cluster::cluster::local::LocalCluster;
use autoscaling_cluster::cluster::server;
use autoscaling_cluster::config::{RedirectPolicy, ScalingConfig};
use std::net::SocketAddr;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--threshold <n>] [--redirect <deferred|immediate>]",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:6000", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:6000 --threshold 3 --redirect immediate",
            args[0]
        );

        std::process::exit(1);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut scaling = ScalingConfig::from_env();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--bind", Some(value)) => {
                bind_addr = Some(value.parse()?);
                i += 2;
            }
            ("--threshold", Some(value)) => {
                scaling.threshold = value.parse()?;
                i += 2;
            }
            ("--redirect", Some(value)) => {
                scaling.redirect = value
                    .parse::<RedirectPolicy>()
                    .map_err(anyhow::Error::msg)?;
                i += 2;
            }
            (flag, _) => {
                tracing::warn!("Ignoring argument {}", flag);
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.ok_or_else(|| anyhow::anyhow!("--bind is required"))?;
    if scaling.threshold == 0 {
        anyhow::bail!("--threshold must be at least 1");
    }

    tracing::info!("Starting node on {}", bind_addr);
    tracing::info!(
        "Autoscale threshold {} with {:?} redirect",
        scaling.threshold,
        scaling.redirect
    );

    // 1. Index + units:
    let cluster = LocalCluster::new(scaling);

    // 2. Spawn stats reporter:
    let stats_index = cluster.index();
    let stats_directory = cluster.directory();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let keys = stats_index.partition_keys();
            tracing::info!(
                "Node stats: {} partition keys, {} units",
                keys.len(),
                stats_directory.len()
            );
            for pk in keys {
                tracing::info!("  - {} -> {} partitions", pk, stats_index.partition_count(&pk));
            }
        }
    });

    // 3. Start HTTP server:
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    server::serve(listener, cluster).await?;

    Ok(())
}
