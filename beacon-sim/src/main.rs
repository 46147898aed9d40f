//! Host simulator for the BTHome beacon
//!
//! Plays a virtual beacon through power cycles, with corruption, power cuts
//! and radio faults injected on request, and prints what each boot put on
//! the air.

mod report;

use std::time::Duration;

use beacon_mcu::sim::{SimDevice, TransportFaults};
use beacon_mcu::{LifecycleConfig, Phase, DEFAULT_DEVICE_NAME};
use beacon_proto::{CounterSnapshot, Layout};
use clap::{Parser, Subcommand, ValueEnum};
use log::*;

use report::CycleSummary;

#[derive(Parser)]
#[command(name = "beacon-sim")]
#[command(about = "Run simulated power cycles of the BTHome beacon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Power-cycle a virtual beacon
    Run {
        /// Number of boots to simulate
        #[arg(short, long, default_value = "5")]
        cycles: u32,
        /// Active window per boot, in milliseconds
        #[arg(long, default_value = "10000")]
        window_ms: u64,
        /// Payload refresh interval during the window, in milliseconds (0 = off)
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
        #[arg(long, value_enum, default_value = "minimal")]
        layout: LayoutArg,
        /// Advertised device name
        #[arg(long, default_value = DEFAULT_DEVICE_NAME)]
        name: String,
        /// Corrupt the retained block before boot N: N:BYTE[:MASK]
        #[arg(long, value_parser = parse_corruption)]
        corrupt: Vec<Corruption>,
        /// Cut power on boot N right after PHASE: N:PHASE
        #[arg(long, value_parser = parse_cut)]
        cut: Vec<Cut>,
        /// Radio fault injected on every boot
        #[arg(long, value_enum)]
        fault: Option<FaultArg>,
        /// Print one JSON object per boot
        #[arg(long)]
        json: bool,
    },
    /// Print the advertising payload for a counter state
    Encode {
        boots: u32,
        #[arg(long, default_value = "0")]
        off_count: u32,
        #[arg(long, value_enum, default_value = "minimal")]
        layout: LayoutArg,
        #[arg(long, default_value = DEFAULT_DEVICE_NAME)]
        name: String,
    },
    /// Decode BTHome service data (hex, UUID included)
    Decode { hex: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Minimal,
    Extended,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Minimal => Layout::Minimal,
            LayoutArg::Extended => Layout::Extended,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FaultArg {
    Init,
    Ready,
    Silent,
    Start,
    Update,
    Stop,
}

impl From<FaultArg> for TransportFaults {
    fn from(arg: FaultArg) -> Self {
        let mut faults = TransportFaults::default();
        match arg {
            FaultArg::Init => faults.init = true,
            // -ENOMEM, what a starved host stack typically reports
            FaultArg::Ready => faults.ready = Some(-12),
            FaultArg::Silent => faults.silent = true,
            FaultArg::Start => faults.start = true,
            FaultArg::Update => faults.update = true,
            FaultArg::Stop => faults.stop = true,
        }
        faults
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Corruption {
    boot: u32,
    byte: usize,
    mask: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cut {
    boot: u32,
    after: Phase,
}

fn parse_corruption(s: &str) -> Result<Corruption, String> {
    let mut parts = s.split(':');
    let boot = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| format!("invalid boot number in '{}'", s))?;
    let byte = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| format!("invalid byte index in '{}'", s))?;
    let mask = match parts.next() {
        Some(m) => u8::from_str_radix(m.trim_start_matches("0x"), 16)
            .map_err(|e| format!("invalid mask in '{}': {}", s, e))?,
        None => 0xff,
    };
    if byte >= beacon_mcu::BLOCK_LEN {
        return Err(format!(
            "byte index {} outside the {}-byte retained block",
            byte,
            beacon_mcu::BLOCK_LEN
        ));
    }
    Ok(Corruption { boot, byte, mask })
}

fn parse_cut(s: &str) -> Result<Cut, String> {
    let (boot, phase) = s
        .split_once(':')
        .ok_or_else(|| format!("expected N:PHASE, got '{}'", s))?;
    let boot = boot
        .parse()
        .map_err(|_| format!("invalid boot number in '{}'", s))?;
    let after = match phase {
        "cold-start" => Phase::ColdStart,
        "validating" => Phase::Validating,
        "advertising" => Phase::Advertising,
        "active-window" => Phase::ActiveWindow,
        "persisting" => Phase::Persisting,
        other => return Err(format!("unknown phase '{}'", other)),
    };
    Ok(Cut { boot, after })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            cycles,
            window_ms,
            interval_ms,
            layout,
            name,
            corrupt,
            cut,
            fault,
            json,
        } => {
            let config = LifecycleConfig {
                active_window: Duration::from_millis(window_ms),
                update_interval: Duration::from_millis(interval_ms),
                ready_timeout: Duration::from_millis(100),
                device_name: name,
                layout: layout.into(),
                ..Default::default()
            };
            let faults = fault.map(TransportFaults::from).unwrap_or_default();
            let summaries = run(config, cycles, &corrupt, &cut, faults);
            print_summaries(&summaries, json)?;
        }
        Commands::Encode {
            boots,
            off_count,
            layout,
            name,
        } => {
            let snapshot = CounterSnapshot {
                boots,
                off_count,
                uptime_ms: 0,
            };
            let service_data = beacon_proto::encode(&snapshot, layout.into());
            let adv = beacon_proto::AdvertisementData::new(&name, &service_data)?;
            println!("service data: {}", data_encoding::HEXLOWER.encode(service_data.as_bytes()));
            println!("advertising:  {}", data_encoding::HEXLOWER.encode(adv.as_bytes()));
        }
        Commands::Decode { hex } => {
            let bytes = data_encoding::HEXLOWER_PERMISSIVE.decode(hex.trim().as_bytes())?;
            let decoded = beacon_proto::parse_service_data(&bytes)?;
            println!("device info: 0x{:02x}", decoded.device_info);
            for object in &decoded.objects {
                println!("  {:?}", object);
            }
            if let Some(boots) = decoded.boots() {
                println!("boots: {}", boots);
            }
            if let Some(off_count) = decoded.off_count() {
                println!("off count: {}", off_count);
            }
        }
    }

    Ok(())
}

fn run(
    config: LifecycleConfig,
    cycles: u32,
    corrupt: &[Corruption],
    cut: &[Cut],
    faults: TransportFaults,
) -> Vec<CycleSummary> {
    let mut device = SimDevice::new(config);
    device.faults = faults;

    let mut summaries = Vec::with_capacity(cycles as usize);
    for boot in 1..=cycles {
        for c in corrupt.iter().filter(|c| c.boot == boot) {
            info!("Corrupting retained byte {} with mask 0x{:02x}", c.byte, c.mask);
            if let Err(e) = device.corrupt_byte(c.byte, c.mask) {
                warn!("Skipping corruption of byte {}: {}", c.byte, e.0);
            }
        }

        let cycle = match cut.iter().find(|c| c.boot == boot) {
            Some(c) => device.power_cut_after(c.after),
            None => device.power_cycle(),
        };
        summaries.push(CycleSummary::from_cycle(boot, &cycle));
    }
    summaries
}

fn print_summaries(
    summaries: &[CycleSummary],
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        for summary in summaries {
            println!("{}", serde_json::to_string(summary)?);
        }
        return Ok(());
    }

    for summary in summaries {
        println!("{}", summary.line());
        for fault in &summary.faults {
            println!("    ! {}", fault);
        }
    }
    Ok(())
}
