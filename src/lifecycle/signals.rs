//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, configuration check)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second SIGTERM/SIGINT forces exit
//! - SIGHUP checks the configuration store now, not shutdown

use crate::currency::ConfigCurrency;
use crate::lifecycle::shutdown::Shutdown;

/// Handle signals until the process exits.
#[cfg(unix)]
pub async fn listen(shutdown: Shutdown, currency: ConfigCurrency) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut stopping = false;

    loop {
        let name = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
            _ = hangup.recv() => {
                refresh(&currency).await;
                continue;
            }
        };

        if stopping {
            tracing::warn!(signal = name, "Second shutdown signal, exiting immediately");
            std::process::exit(130);
        }
        tracing::info!(signal = name, "Shutdown signal received");
        stopping = true;
        shutdown.trigger();
    }
}

/// Handle Ctrl+C until the process exits.
#[cfg(not(unix))]
pub async fn listen(shutdown: Shutdown, _currency: ConfigCurrency) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    shutdown.trigger();
    tokio::signal::ctrl_c().await?;
    std::process::exit(130);
}

#[cfg(unix)]
async fn refresh(currency: &ConfigCurrency) {
    tracing::info!("SIGHUP received, checking configuration store");
    match currency.detector().check_now(crate::currency::RefreshTrigger::Signal).await {
        Ok(check) if check.was_stale => {
            tracing::info!(config_id = ?check.new_identifier, "Configuration refreshed on SIGHUP");
        }
        Ok(_) => tracing::info!("Configuration already current"),
        Err(e) => tracing::warn!(error = %e, "Configuration check on SIGHUP failed"),
    }
}
