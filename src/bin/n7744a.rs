use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use n7744a_control::{
    Channel, ErrorPolicy, MeasurementMode, N7744a, Options, PowerUnit, RangingMode, Vxi11Factory,
};
use tokio::time::timeout;

#[derive(Debug, Parser)]
#[command(name = "n7744a", about = "Control a Keysight N7744A optical power meter over VXI-11")]
struct Cli {
    /// VISA LAN resource or host[/device] of the meter.
    #[arg(long, short, default_value = "TCPIP0::192.168.0.10::inst0::INSTR")]
    address: String,

    /// Channel the per-channel commands act on.
    #[arg(long, short, value_enum, ignore_case = true, default_value = "1")]
    channel: Channel,

    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Only log status labels at debug level.
    #[arg(long, short)]
    quiet: bool,

    /// Log failed settings instead of exiting with an error.
    #[arg(long)]
    lenient: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the identity string.
    Idn,
    /// Show the power unit, or set it on all four channels.
    Units {
        #[arg(value_enum)]
        unit: Option<PowerUnit>,
    },
    /// Show or set the measurement mode.
    Mode {
        #[arg(value_enum)]
        mode: Option<MeasurementMode>,
    },
    /// Show or set the ranging mode.
    Ranging {
        #[arg(value_enum)]
        mode: Option<RangingMode>,
    },
    /// Show or set the averaging time, in seconds.
    SensingTime { seconds: Option<f64> },
    /// Read the power on the selected channel.
    Read,
    /// Read the power on all four channels.
    ReadAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let policy = if cli.lenient {
        ErrorPolicy::LogAndContinue
    } else {
        ErrorPolicy::Propagate
    };
    let options = Options::default()
        .verbose(cli.verbose > 0)
        .show_output(!cli.quiet)
        .initial_channel(cli.channel)
        .error_policy(policy);

    let limit = Duration::from_millis(cli.timeout_ms);
    let factory = Vxi11Factory::with_timeout(limit);
    let mut meter = timeout(limit, N7744a::open(&factory, &cli.address, options))
        .await
        .with_context(|| format!("timed out connecting to {}", cli.address))??;
    if !meter.is_connected() {
        bail!("no meter at {}", cli.address);
    }

    let result = run(&mut meter, cli.command).await;
    let released = meter.release().await;
    first_failure(result, released)
}

/// The command's own error wins over a failure to release the session.
fn first_failure(result: Result<()>, released: n7744a_control::Result<()>) -> Result<()> {
    match (result, released) {
        (Err(e), Err(close_err)) => {
            tracing::warn!("release failed: {close_err}");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), released) => Ok(released?),
    }
}

async fn run(meter: &mut N7744a, command: Command) -> Result<()> {
    match command {
        Command::Idn => {
            println!("{}", meter.device_info().unwrap_or_default());
        }
        Command::Units { unit: Some(unit) } => meter.set_units(unit).await?,
        Command::Units { unit: None } => {
            let unit = meter.current_units().await?;
            println!("CH{}: {:?}", meter.channel(), unit);
        }
        Command::Mode {
            mode: Some(MeasurementMode::Absolute),
        } => meter.set_mmode_abs().await?,
        Command::Mode {
            mode: Some(MeasurementMode::Relative),
        } => meter.set_mmode_rel().await?,
        Command::Mode { mode: None } => {
            let mode = meter.current_measurement_mode().await?;
            println!("CH{}: {:?}", meter.channel(), mode);
        }
        Command::Ranging {
            mode: Some(RangingMode::Auto),
        } => meter.set_rmode_auto().await?,
        Command::Ranging {
            mode: Some(RangingMode::Manual),
        } => meter.set_rmode_manual().await?,
        Command::Ranging { mode: None } => {
            let mode = meter.current_ranging_mode().await?;
            println!("CH{}: {:?}", meter.channel(), mode);
        }
        Command::SensingTime {
            seconds: Some(seconds),
        } => meter.set_sensing_time(seconds).await?,
        Command::SensingTime { seconds: None } => {
            let reply = meter.current_sensing_time().await?;
            println!("CH{}: {} s", meter.channel(), reply);
        }
        Command::Read => {
            let reply = meter.measure_power().await?;
            let power = n7744a_control::parse_power(&reply)?;
            println!("CH{}: {:e}", meter.channel(), power);
        }
        Command::ReadAll => {
            let readings = meter.measure_all().await?;
            for (channel, power) in Channel::ALL.iter().zip(readings) {
                println!("CH{}: {:e}", channel, power);
            }
        }
    }
    Ok(())
}
