//! Binary entrypoint for the Amberlink CLI.
//!
//! Commands:
//! - `init` - write a starter `amberlink.toml`
//! - `demo [--channels <v,..>] [--run-ms <ms>]` - drive the configured demo devices through the event loop
//! - `decode <HEX>` - unwrap and decode one notification payload, printed as JSON
//! - `encode <v,..> [--max-write-len <n>]` - print the writes for a full channel batch
//!
//! See the library crate docs for module-level details: `amberlink::`.
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use amberlink::config::Config;
use amberlink::logutil::hex_snippet;
use amberlink::names::MemoryNameStore;
use amberlink::registry::{DeviceKind, DeviceRegistry};
use amberlink::runtime::LinkRuntime;
use amberlink::scheduler::DeadlineScheduler;
use amberlink::transport::{NullTransport, TransportHandle, DEFAULT_MAX_WRITE_LEN};
use amberlink::uart::frame::{self, FRAME_LEN};
use amberlink::uart::{CommandCoalescer, SerialChannel, CHANNEL_COUNT};

#[derive(Parser)]
#[command(name = "amberlink")]
#[command(about = "BLE device registry and UART link for Amber lights")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "amberlink.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Run the event loop with the configured demo devices
    Demo {
        /// Channel values to send to each demo device (brightness,red,green,blue,white)
        #[arg(long, value_delimiter = ',', default_values_t = [1.0, 1.0, 0.5, 0.0, 0.0])]
        channels: Vec<f32>,
        /// How long to let the loop run before printing the final state
        #[arg(long, default_value_t = 500)]
        run_ms: u64,
    },
    /// Decode a notification payload given as hex (header byte included)
    Decode {
        hex: String,
    },
    /// Print the wire writes for one batch of channel values
    Encode {
        /// Channel values in [0,1] (brightness,red,green,blue,white)
        #[arg(value_delimiter = ',', required = true)]
        values: Vec<f32>,
        /// Transport maximum write length
        #[arg(long, default_value_t = DEFAULT_MAX_WRITE_LEN)]
        max_write_len: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            info!("Initializing new Amberlink configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Demo { channels, run_ms } => {
            let config = match pre_config {
                Some(c) => c,
                None => {
                    warn!("No usable config at {}; using defaults", cli.config);
                    Config::default()
                }
            };
            run_demo(config, &channels, Duration::from_millis(run_ms)).await?;
        }
        Commands::Decode { hex } => {
            let bytes = parse_hex(&hex)?;
            println!("{}", serde_json::to_string_pretty(&decode_report(&bytes))?);
        }
        Commands::Encode {
            values,
            max_write_len,
        } => {
            for write in encode_batch(&values, max_write_len)? {
                println!("{}", write);
            }
        }
    }

    Ok(())
}

async fn run_demo(config: Config, channels: &[f32], run_for: Duration) -> Result<()> {
    info!("Starting Amberlink v{} (demo)", env!("CARGO_PKG_VERSION"));
    let mut registry = DeviceRegistry::new(
        config.registry_settings(),
        NullTransport::new(TransportHandle(1)),
        Box::new(MemoryNameStore::new()),
    );
    let mut events = registry.subscribe();

    let mut ids = Vec::new();
    if config.demo_devices.is_empty() {
        ids.push(registry.add_demo_device("Demo Amber", DeviceKind::Amber));
    }
    for demo in &config.demo_devices {
        ids.push(registry.add_demo_device(&demo.name, demo.kind));
    }

    let (_transport_tx, transport_rx) = tokio::sync::mpsc::unbounded_channel();
    let (runtime, handle) = LinkRuntime::new(registry, transport_rx);
    let task = runtime.spawn();

    for id in &ids {
        handle.connect(*id).await?;
        for (index, value) in channels.iter().enumerate().take(CHANNEL_COUNT) {
            // Generic demo devices have no driver; that is expected.
            if let Err(e) = handle.set_channel(*id, index, *value).await {
                info!("{}: {}", id, e);
                break;
            }
        }
    }

    tokio::time::sleep(run_for).await;
    let snapshot = handle.snapshot().await?;
    handle.shutdown().await;
    task.await
        .map_err(|e| anyhow!("event loop task failed: {}", e))?;

    while let Ok(event) = events.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let cleaned = cleaned.trim_start_matches("0x");
    if !cleaned.is_ascii() {
        return Err(anyhow!("hex input contains non-ASCII characters"));
    }
    if cleaned.len() % 2 != 0 {
        return Err(anyhow!("hex input has an odd number of digits"));
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&cleaned[i..i + 2], 16)
                .map_err(|e| anyhow!("invalid hex at offset {}: {}", i, e))
        })
        .collect()
}

fn decode_report(bytes: &[u8]) -> serde_json::Value {
    let serial = SerialChannel::new(DEFAULT_MAX_WRITE_LEN);
    let Some(payload) = serial.unwrap_inbound(bytes) else {
        return serde_json::json!({
            "user_data": false,
            "frames": [],
            "errors": ["missing or unknown header byte"],
        });
    };
    let mut frames = Vec::new();
    let mut errors = Vec::new();
    for (i, chunk) in payload.chunks(FRAME_LEN).enumerate() {
        match frame::decode(chunk) {
            Ok(f) => frames.push(f),
            Err(e) => errors.push(format!("frame {}: {}", i, e)),
        }
    }
    serde_json::json!({
        "user_data": true,
        "frames": frames,
        "errors": errors,
    })
}

fn encode_batch(values: &[f32], max_write_len: usize) -> Result<Vec<String>> {
    if values.len() > CHANNEL_COUNT {
        return Err(anyhow!(
            "at most {} channel values, got {}",
            CHANNEL_COUNT,
            values.len()
        ));
    }
    let mut timers = DeadlineScheduler::new();
    let mut driver = CommandCoalescer::new(
        (),
        Duration::ZERO,
        SerialChannel::new(max_write_len),
    );
    let now = std::time::Instant::now();
    for (index, value) in values.iter().enumerate() {
        driver.set_channel(index, *value, &mut timers, now)?;
    }
    Ok(driver
        .flush(&mut timers)
        .iter()
        .map(|w| hex_snippet(w, usize::MAX))
        .collect())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let file = config.as_ref().and_then(|c| c.logging.file.clone());
    let opened = file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    if let Some(f) = opened {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when attached to a terminal.
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_with_separators() {
        assert_eq!(parse_hex("01 04:01").unwrap(), vec![0x01, 0x04, 0x01]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
        assert!(parse_hex("aéb").is_err());
        assert!(parse_hex("éé").is_err());
    }

    #[test]
    fn decode_report_lists_frames_and_errors() {
        let report = decode_report(&[0x01, 0x04, 0x01, 0x00, 0x02, 0xff, 0x04, 0x01]);
        assert_eq!(report["user_data"], true);
        assert_eq!(report["frames"].as_array().unwrap().len(), 1);
        assert_eq!(report["frames"][0]["channel"], 2);
        assert_eq!(report["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn encode_splits_for_small_writes() {
        let writes = encode_batch(&[1.0, 0.0, 0.0, 0.0, 0.0], 20).unwrap();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].starts_with("010401000"));
        assert!(encode_batch(&[0.0; 6], 20).is_err());
    }
}
