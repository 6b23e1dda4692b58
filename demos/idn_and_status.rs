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

    let mut meter = match timeout(Duration::from_secs(5), N7744a::connect(address)).await {
        Ok(Ok(meter)) => meter,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            eprintln!("Timed out connecting to the N7744A (5 s), check power and network.");
            return Ok(());
        }
    };

    println!("IDN: {}", meter.device_info().unwrap_or_default());

    for channel in Channel::ALL {
        let unit = meter.units_on(channel).await?;
        let mode = meter.measurement_mode_on(channel).await?;
        let ranging = meter.ranging_mode_on(channel).await?;
        let avg = meter.sensing_time_on(channel).await?;
        println!("CH{channel}:");
        println!("  Unit     : {unit:?}");
        println!("  Mode     : {mode:?}");
        println!("  Ranging  : {ranging:?}");
        println!("  Avg time : {avg} s");
    }

    meter.release().await?;
    Ok(())
}
