pub mod command;
pub mod config;

use std::process::ExitCode;

use config::PwmctlConfig;
use config_rs::{Config, File};
use pwmctl_core::error::ConfigError;
use pwmctl_devices::devices::pca9685::{Pca9685, Pca9685Device};
use pwmctl_i2c::{rppal::hal::Delay, LinuxI2c};
use tokio::io::{stdin, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "pwmctl=debug,pwmctl_devices=info";

fn load_config(path: &str) -> Result<PwmctlConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .and_then(|config| config.try_deserialize::<PwmctlConfig>())
        .map_err(|err| ConfigError::from_string(format!("could not load {}: {}", path, err)))?;
    config.validate()?;
    Ok(config)
}

async fn run(config: PwmctlConfig) -> Result<(), ConfigError> {
    let driver = Pca9685::new(LinuxI2c, Delay::new());
    let device = Pca9685Device::build(&config.device, driver).await?;
    info!(
        "PCA9685 {:#04x} on {} ready at {} Hz with outputs: {}",
        config.device.address(),
        config.device.bus,
        config.device.frequency_hz,
        device.channels.keys().cloned().collect::<Vec<_>>().join(", ")
    );

    tokio::select! {
        res = command::run_commands(&device, config.bus_range.range(), BufReader::new(stdin())) => {
            if let Err(err) = res {
                error!("error reading commands: {}", err);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    //dropping the outputs lets the device task silence and close the chip
    let Pca9685Device {
        join_handle,
        channels,
        ..
    } = device;
    drop(channels);
    join_handle
        .await
        .map_err(|err| ConfigError::from_string(format!("PCA9685 task failed: {}", err)))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let path = match (args.next(), args.next()) {
        (Some(path), None) => path,
        _ => {
            error!("usage: pwmctl <config file>");
            return ExitCode::from(2);
        }
    };

    let config = match load_config(&path) {
        Ok(config) => config,
        Err(err) => {
            error!("bad configuration:\n{}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Some(name) = &config.metadata.name {
        info!("{}: {}", name, config.metadata.description.as_deref().unwrap_or(""));
    }

    match run(config).await {
        Ok(()) => {
            info!("shut down");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
