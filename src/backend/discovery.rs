//! DNS-driven pool convergence.
//!
//! Every pass resolves each configured service name and appends any
//! IPv4 answer not yet pooled, spawning a connector task per
//! addition. Discovery never removes entries; eviction belongs to the
//! connection manager. An unchanged DNS answer leaves the pool
//! untouched.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::net;
use tracing::{debug, info, warn};

use crate::backend::{Backend, GrpcBackend};
use crate::config::Configuration;
use crate::context::{LbContext, State};
use crate::DISCOVERY_INTERVAL;

pub async fn run(ctx: Arc<LbContext>, cfg: Configuration) {
    loop {
        discover_pass(&ctx, &cfg).await;
        tokio::select! {
            _ = ctx.shutdown.cancelled() => return,
            _ = tokio::time::sleep(DISCOVERY_INTERVAL) => {}
        }
    }
}

async fn discover_pass(ctx: &Arc<LbContext>, cfg: &Configuration) {
    for svc in &cfg.services {
        debug!(service = %svc.uri, "discover service");
        let ips = match net::lookup_host((svc.uri.as_str(), cfg.sctp_grpc_port)).await {
            Ok(addrs) => addrs.map(|a| a.ip()).collect::<Vec<_>>(),
            Err(e) => {
                // Retried on the next pass.
                warn!(service = %svc.uri, error = %e, "discover service error");
                continue;
            }
        };

        let added = {
            let mut state = ctx.lock().await;
            integrate_addresses(&mut state, &ips, &cfg.backend_type, &ctx.lb_id)
        };
        for address in added {
            info!(service = %svc.uri, %address, "new server found");
            tokio::spawn(super::connect_to_server(
                ctx.clone(),
                address,
                cfg.sctp_grpc_port,
            ));
        }
    }
}

/// One convergence step against a resolved answer: appends a backend
/// for every IPv4 not yet pooled and returns the added addresses in
/// resolution order. IPv6 answers are skipped (only A records are
/// honoured); an unknown backend type tag is logged and skipped.
pub fn integrate_addresses(
    state: &mut State,
    ips: &[IpAddr],
    backend_type: &str,
    lb_id: &str,
) -> Vec<String> {
    let mut added = Vec::new();
    for ip in ips {
        let IpAddr::V4(ipv4) = ip else {
            continue;
        };
        let address = ipv4.to_string();
        if state.has_backend(&address) {
            continue;
        }
        match backend_type {
            "grpc" => {
                state.add_backend(Backend::Grpc(GrpcBackend::new(
                    address.clone(),
                    lb_id.to_string(),
                )));
                added.push(address);
            }
            other => {
                warn!(backend_type = %other, "unsupported backend type");
            }
        }
    }
    added
}
