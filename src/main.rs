pub mod config;
pub mod connectivity;
pub mod scheduler;
pub mod sensor;

use std::path::PathBuf;
use std::time::Instant;

use color_eyre::Result;
use rppal::gpio::Gpio;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::BridgeConfig;
use crate::connectivity::{GpioRadio, SessionManager};
use crate::scheduler::Scheduler;
use crate::sensor::{gpio::GpioSwitch, DebouncedSwitch};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = BridgeConfig::load(config_path).await?;
    info!(
        broker = %config.mqtt.host,
        port = config.mqtt.port,
        status_topic = %config.topics.status_topic,
        "starting doorlink bridge"
    );

    let gpio = Gpio::new()?;
    let door = GpioSwitch::new(&gpio, config.gpio.door_pin)?;
    let radio = GpioRadio::new(&gpio, config.gpio.radio_enable_pin, config.gpio.radio_link_pin)?;

    let sensor = DebouncedSwitch::new(
        door,
        config.gpio.polarity,
        config.timing.debounce(),
        Instant::now(),
    );
    let session = SessionManager::new(
        radio,
        config.mqtt.clone(),
        &config.topics,
        config.timing.session_timeout(),
    );
    let mut scheduler = Scheduler::new(
        sensor,
        session,
        config.topics.clone(),
        &config.timing,
        config.publish_on_boot,
    );

    let mut ticker = tokio::time::interval(config.timing.tick());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                scheduler.tick(Instant::now()).await;
            }
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    scheduler.shutdown().await;
    info!("doorlink bridge stopped");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}
