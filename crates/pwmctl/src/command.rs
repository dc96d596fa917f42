use std::{ops::RangeInclusive, str::FromStr};

use embedded_hal::delay::DelayNs;
use pwmctl_core::error::DriverError;
use pwmctl_devices::devices::pca9685::{device::lock, Pca9685Device};
use pwmctl_i2c::{available_buses, BusProvider};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info};

///One line typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ///`<name> <value>`: send a normalized value to a named output
    Set { name: String, value: f64 },
    ///`freq <hz>`
    Frequency(f32),
    ///`pwm <channel> <on> <off>`
    Pwm { channel: i32, on: i32, off: i32 },
    ///`all <on> <off>`
    All { on: i32, off: i32 },
    Reset,
    Buses,
    Quit,
}

fn arg<T: FromStr>(args: &[&str], index: usize, what: &str) -> Result<T, String> {
    let raw = args
        .get(index)
        .ok_or_else(|| format!("missing {}", what))?;
    raw.parse()
        .map_err(|_| format!("\"{}\" is not a valid {}", raw, what))
}

fn arity(args: &[&str], expected: usize, usage: &str) -> Result<(), String> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(format!("usage: {}", usage))
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let (head, args) = words.split_first().ok_or("empty command")?;
        match *head {
            "quit" | "exit" => arity(args, 0, "quit").map(|_| Command::Quit),
            "reset" => arity(args, 0, "reset").map(|_| Command::Reset),
            "buses" => arity(args, 0, "buses").map(|_| Command::Buses),
            "freq" => {
                arity(args, 1, "freq <hz>")?;
                Ok(Command::Frequency(arg(args, 0, "frequency")?))
            }
            "pwm" => {
                arity(args, 3, "pwm <channel> <on> <off>")?;
                Ok(Command::Pwm {
                    channel: arg(args, 0, "channel")?,
                    on: arg(args, 1, "on tick")?,
                    off: arg(args, 2, "off tick")?,
                })
            }
            "all" => {
                arity(args, 2, "all <on> <off>")?;
                Ok(Command::All {
                    on: arg(args, 0, "on tick")?,
                    off: arg(args, 1, "off tick")?,
                })
            }
            name => {
                arity(args, 1, "<output> <value>")?;
                Ok(Command::Set {
                    name: name.to_string(),
                    value: arg(args, 0, "value")?,
                })
            }
        }
    }
}

///Reads commands line by line until `quit` or end of input. Failed commands are logged and the loop carries on.
pub async fn run_commands<P, D, R>(
    device: &Pca9685Device<P, D>,
    buses: RangeInclusive<u8>,
    input: R,
) -> std::io::Result<()>
where
    P: BusProvider + Send + 'static,
    P::Bus: Send + 'static,
    D: DelayNs + Send + 'static,
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                error!("{}: {}", line, err);
                continue;
            }
        };
        debug!("command {:?}", command);
        if command == Command::Quit {
            break;
        }
        if let Err(err) = execute(device, &buses, command).await {
            error!("{}: {}", line, err);
        }
    }
    Ok(())
}

async fn execute<P, D>(
    device: &Pca9685Device<P, D>,
    buses: &RangeInclusive<u8>,
    command: Command,
) -> Result<(), String>
where
    P: BusProvider + Send + 'static,
    P::Bus: Send + 'static,
    D: DelayNs + Send + 'static,
{
    let driver = device.driver();
    let result: Result<(), DriverError> = match command {
        Command::Set { name, value } => {
            let output = device
                .output(&name)
                .ok_or_else(|| format!("no output named \"{}\"", name))?;
            return output
                .sink()
                .send(value)
                .await
                .map_err(|_| format!("output \"{}\" has shut down", name));
        }
        Command::Frequency(hz) => {
            let mut pca = lock(&driver);
            pca.set_frequency(hz).and_then(|_| {
                pca.frequency()
                    .map(|actual| info!("frequency is now {:.2} Hz", actual))
            })
        }
        Command::Pwm { channel, on, off } => lock(&driver).set_channel(channel, on, off),
        Command::All { on, off } => lock(&driver).set_all_channels(on, off),
        Command::Reset => lock(&driver).reset(),
        Command::Buses => {
            let found = available_buses(buses.clone());
            if found.is_empty() {
                info!("no I2C buses found in {}..={}", buses.start(), buses.end());
            }
            for path in found {
                info!("found I2C bus {}", path);
            }
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    result.map_err(|err| err.to_string())
}
