use mbus2mqtt::{metering_mbus::{reader::ToolReader, TokioSleeper}, Config, MbusManager, MqttManager};
use log::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let default_filter = std::env::var("MBUS2MQTT_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {e}");
            return Err(e.into());
        }
    };
    info!("Using {} at {} baud for addresses {:?}", config.mbus.serial, config.mbus.baud, config.mbus.addresses);

    /* Not being able to reach the broker at startup is fatal, there is no one to report to */
    let (publisher, eventloop) = match MqttManager::connect(&config.mqtt).await {
        Ok(r) => r,
        Err(e) => {
            error!("{e}");
            return Err(e.into());
        }
    };

    let reader = ToolReader::new(config.mbus.tool.clone());
    let mut mbus = MbusManager::new(&config, Box::new(reader), Box::new(publisher), Box::new(TokioSleeper));

    tokio::select! {
        _ = mbus.start_thread() => {
            error!("Polling loop exited without need to do so");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
        },
    }

    eventloop.abort();
    Ok(())
}
