// LoRaNet HTTP daemon: collect and registration endpoints, broadcast forwarding, status page.

use std::sync::Arc;

use lora_core::Failure;
use lora_http::{config, Adapter, Applications, Collect, Healthz, PubSub, StatusPage};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<(), Box<dyn std::error::Error>> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("lora-http {}", VERSION);
            return Ok(());
        }
    }

    let cfg = config::load();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let adapter = Arc::new(Adapter::new(cfg.adapter_options())?);
        adapter.bind(Collect::new());
        adapter.bind(PubSub::new());
        adapter.bind(Applications::new());
        adapter.bind(Healthz);
        adapter.bind(StatusPage::new(cfg.status_loopback_only));
        let local = adapter.listen(cfg.listen_addr).await?;
        info!(
            "lora-http {} on {} ({} broadcast recipient(s))",
            VERSION,
            local,
            adapter.broadcast_recipients().len()
        );

        tokio::spawn(forward_packets(adapter.clone()));
        tokio::spawn(accept_registrations(adapter.clone()));

        shutdown_signal().await?;
        info!("shutting down");
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

/// Forward every collected packet and answer the collector with the outcome.
async fn forward_packets(adapter: Arc<Adapter>) {
    loop {
        let (packet, an) = match adapter.next().await {
            Ok(next) => next,
            Err(e) => {
                error!("packet consumer stopped: {}", e);
                return;
            }
        };
        let delivered = match adapter.send(&packet, &[]).await {
            Ok(answer) => an.ack(Some(&answer)).await,
            Err(e) => {
                debug!("forward failed: {}", e);
                an.nack(Some(&Failure::from(e))).await
            }
        };
        if let Err(e) = delivered {
            warn!("packet answer lost: {}", e);
        }
    }
}

async fn accept_registrations(adapter: Arc<Adapter>) {
    loop {
        let (registration, an) = match adapter.next_registration().await {
            Ok(next) => next,
            Err(e) => {
                error!("registration consumer stopped: {}", e);
                return;
            }
        };
        info!(
            "{} registered to {}",
            registration.dev_addr, registration.recipient
        );
        if let Err(e) = an.ack(None).await {
            warn!("registration answer lost: {}", e);
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
