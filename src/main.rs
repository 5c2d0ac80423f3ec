use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sctplb::config::Config;
use sctplb::context::LbContext;
use sctplb::{backend, service};

/// SCTP load balancer fronting a pool of AMF instances.
#[derive(Debug, Parser)]
#[command(name = "sctplb", about = "SCTP Load Balancer")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long = "cfg", value_name = "FILE")]
    cfg: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.cfg)
        .with_context(|| format!("failed to initialize config {}", cli.cfg.display()))?;
    let configuration = cfg.configuration;
    info!(
        sctp_port = configuration.ngap_port,
        grpc_port = configuration.sctp_grpc_port,
        "sctp-lb started"
    );

    let lb_id = std::env::var("HOSTNAME").unwrap_or_default();
    let ctx = Arc::new(LbContext::new(lb_id));

    let mut front_end = tokio::spawn(service::run(
        ctx.clone(),
        configuration.ngap_ip_list.clone(),
        configuration.ngap_port,
    ));
    tokio::spawn(backend::discovery::run(ctx.clone(), configuration));

    tokio::select! {
        res = &mut front_end => {
            // The front-end only returns early on a fatal error.
            ctx.shutdown.cancel();
            return match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            };
        }
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            ctx.shutdown.cancel();
        }
    }

    match front_end.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(e.into()),
    }
}
