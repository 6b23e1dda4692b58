use std::time::Duration;

use anyhow::Result;
use n7744a_control::instrument::{Channel, N7744a};
use tokio::time::timeout;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let address = args
        .get(1)
        .map(String::as_str)
        .unwrap_or("TCPIP0::192.168.0.10::inst0::INSTR");
    let channel: Channel = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(Channel::Ch1);

    let mut meter = match timeout(Duration::from_secs(5), N7744a::connect(address)).await {
        Ok(Ok(meter)) => meter,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            eprintln!("Timed out connecting to the N7744A (5 s), check power and network.");
            return Ok(());
        }
    };

    meter.set_channel(channel);
    meter.set_units_dbm().await?;
    meter.set_mmode_abs().await?;
    meter.set_rmode_auto().await?;
    meter.set_sensing_time(0.1).await?;

    // Read back what the meter actually applied.
    meter.current_units().await?;
    meter.current_measurement_mode().await?;
    meter.current_ranging_mode().await?;
    println!("CH{} avg time: {} s", channel, meter.current_sensing_time().await?);

    let reply = meter.measure_power().await?;
    println!("CH{} power: {} dBm", channel, reply);

    meter.release().await?;
    Ok(())
}
