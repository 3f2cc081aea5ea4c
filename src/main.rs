use anyhow::Result;
use pylonlink::{CommandSession, Config, Poller};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    pylonlink::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "pylonlink {} starting on {} @ {} baud",
        env!("APP_VERSION"),
        config.serial.port,
        config.serial.baud_rate
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let session = CommandSession::from_config(&config, shutdown_rx.clone());
    let poller = Poller::new(session, config.poll_interval(), shutdown_rx.clone());
    let handles = poller.handles();

    if config.clock.sync_on_start {
        let now = chrono::Local::now().naive_local();
        match poller.sync_clock(now).await {
            Ok(()) => info!("BMS clock set to {}", now.format("%Y-%m-%d %H:%M:%S")),
            Err(e) => warn!("BMS clock sync failed: {}", e),
        }
    }

    let web_task = config.web.enabled.then(|| {
        let host = config.web.host.clone();
        let port = config.web.port;
        let mut stop = shutdown_rx.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = stop.wait_for(|s| *s).await;
            };
            if let Err(e) = pylonlink::web::serve(handles, &host, port, shutdown).await {
                error!("Web server error: {}", e);
            }
        })
    });

    let poll_task = tokio::spawn(poller.run());

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    shutdown_tx.send_replace(true);

    match poll_task.await {
        Ok(Ok(())) => info!("Poller stopped"),
        Ok(Err(e)) => error!("Poller failed: {}", e),
        Err(e) => error!("Poller task panicked: {}", e),
    }
    if let Some(task) = web_task {
        let _ = task.await;
    }
    Ok(())
}
