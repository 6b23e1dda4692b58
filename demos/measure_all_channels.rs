use std::time::Duration;

use anyhow::Result;
use n7744a_control::instrument::{Channel, N7744a};
use tokio::time::{sleep, timeout};

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
    let rounds: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(5);

    let mut meter = match timeout(Duration::from_secs(5), N7744a::connect(address)).await {
        Ok(Ok(meter)) => meter,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            eprintln!("Timed out connecting to the N7744A (5 s), check power and network.");
            return Ok(());
        }
    };

    // Readings are only comparable across channels in a common unit.
    meter.set_units_watts().await?;

    for round in 1..=rounds {
        let readings = meter.measure_all().await?;
        let line: Vec<String> = Channel::ALL
            .iter()
            .zip(readings)
            .map(|(ch, w)| format!("CH{ch} {w:.3e} W"))
            .collect();
        println!("#{round:<3} {}", line.join("  "));
        sleep(Duration::from_millis(500)).await;
    }

    meter.release().await?;
    Ok(())
}
