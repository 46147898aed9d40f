//! Command-line scanner for BTHome beacons
//!
//! Lists nearby beacons with their boot/off counters, or follows them and
//! prints every advertisement as it arrives.

use beacon_scan::{get_adapter, scan, BeaconReading, BTHOME_UUID};
use btleplug::api::{Central, CentralEvent, Peripheral as _, ScanFilter};
use btleplug::platform::Adapter;
use clap::{Parser, Subcommand};
use futures::stream::StreamExt;

#[derive(Parser)]
#[command(name = "beacon-scan")]
#[command(about = "Scan for BTHome beacons and show their counters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan once and list beacons
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Print every BTHome advertisement until interrupted
    Watch {
        /// Only show devices whose name or address contains this
        #[arg(short, long)]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let adapter = get_adapter().await?;

    match cli.command {
        Commands::Scan { duration } => {
            println!("Scanning for BTHome beacons ({} seconds)...", duration);
            let readings = scan(&adapter, duration).await?;
            println!("\nFound {} beacons:", readings.len());
            for reading in &readings {
                print_reading(reading);
            }
        }
        Commands::Watch { device } => {
            watch(&adapter, device).await?;
        }
    }

    Ok(())
}

async fn watch(
    adapter: &Adapter,
    target: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = adapter.events().await?;
    adapter
        .start_scan(ScanFilter {
            services: vec![BTHOME_UUID],
        })
        .await?;
    println!("Watching for BTHome advertisements (Ctrl-C to stop)...");

    while let Some(event) = events.next().await {
        let CentralEvent::ServiceDataAdvertisement { id, service_data } = event else {
            continue;
        };

        let peripheral = adapter.peripheral(&id).await?;
        let props = peripheral.properties().await?.unwrap_or_default();
        let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
        let address = peripheral.address().to_string();

        let matches = match &target {
            Some(t) => name.contains(t.as_str()) || address.contains(t.as_str()),
            None => true,
        };
        if !matches {
            continue;
        }

        if let Some(reading) =
            BeaconReading::from_service_data(name, address, props.rssi, &service_data)
        {
            print_reading(&reading);
        }
    }

    adapter.stop_scan().await?;
    Ok(())
}

fn print_reading(reading: &BeaconReading) {
    let rssi = reading
        .rssi
        .map(|r| format!("{} dBm", r))
        .unwrap_or_else(|| "N/A".to_string());

    match &reading.decoded {
        Ok(decoded) => {
            let boots = decoded
                .boots()
                .map(|b| b.to_string())
                .unwrap_or_else(|| "-".to_string());
            let off = decoded
                .off_count()
                .map(|o| format!(" off={}", o))
                .unwrap_or_default();
            println!(
                "  {} ({}) RSSI: {} boots={}{}",
                reading.name, reading.address, rssi, boots, off
            );
        }
        Err(e) => {
            println!(
                "  {} ({}) RSSI: {} undecodable [{}]: {}",
                reading.name,
                reading.address,
                rssi,
                reading.raw_hex(),
                e
            );
        }
    }
}
