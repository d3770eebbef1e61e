use anyhow::Result;
use energy_price_level::Config;
use energy_price_level::host::{EntityHost, EntitySnapshot, MemoryHost, StateStore};
use energy_price_level::persistence::PersistenceManager;
use energy_price_level::sensor::{HourSource, PriceLevelSensor};
use energy_price_level::setup::ConfigEntry;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    energy_price_level::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Energy Price Level {} starting with {} sensor(s)",
        env!("APP_VERSION"),
        config.sensors.len()
    );
    if config.sensors.is_empty() {
        warn!("No sensors configured; published states will stay empty");
    }

    let host = MemoryHost::new();
    let persistence = PersistenceManager::new(&config.persistence.state_file);
    if let Err(e) = persistence.load() {
        // A corrupt cache only costs the restored values
        warn!("Ignoring persisted state: {}", e);
    }
    let store: Arc<dyn StateStore> = Arc::new(persistence);
    let clock: Arc<dyn HourSource> = Arc::new(config.hour_zone()?);
    let entity_host: Arc<dyn EntityHost> = Arc::new(host.clone());

    let mut published = host.published_events();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = published.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => {
                    if stdout.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = stdout.flush().await;
                }
                Err(e) => error!("Failed to serialize published state: {}", e),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sensors = Vec::with_capacity(config.sensors.len());
    for entry in &config.sensors {
        let entry = ConfigEntry::from_config(entry);
        let sensor = PriceLevelSensor::new(
            &entry,
            Arc::clone(&entity_host),
            Arc::clone(&store),
            Arc::clone(&clock),
        );
        sensors.push(tokio::spawn(sensor.run(shutdown_rx.clone())));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => feed_line(&host, &line),
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for sensor in sensors {
        if let Err(e) = sensor.await {
            error!("Sensor task failed: {}", e);
        }
    }
    // Releasing the host closes the published stream and ends the writer
    drop(entity_host);
    drop(host);
    let _ = writer.await;

    info!("Shutdown complete");
    Ok(())
}

/// Apply one upstream state line (`{"entity_id", "state", "attributes"}`)
fn feed_line(host: &MemoryHost, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<EntitySnapshot>(line) {
        Ok(snapshot) => host.apply(snapshot),
        Err(e) => warn!("Ignoring malformed state line: {}", e),
    }
}
