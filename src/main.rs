use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rfm69_radio::logging::{init_logger_with_level, log_packet};
use rfm69_radio::{
    log_info, FrequencyBand, Radio, RadioConfig, RaspberryPiHal, RaspberryPiHalBuilder,
    SendOptions, SendOutcome,
};

#[derive(Parser)]
#[command(name = "rfm69-cli")]
#[command(about = "CLI tool for RFM69 packet radios on Raspberry Pi")]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frequency band: 315, 433, 868 or 915 [default: 433]
    #[arg(short, long)]
    band: Option<FrequencyBand>,

    /// Address of this node [default: 1]
    #[arg(short, long)]
    node: Option<u8>,

    /// Network id, 1..=254
    #[arg(long)]
    network: Option<u8>,

    /// AES key, 16 characters or 32 hex digits
    #[arg(long)]
    key: Option<String>,

    /// Transmit power in percent
    #[arg(long)]
    power: Option<u8>,

    /// Module without the PA boost stages (RFM69W/CW)
    #[arg(long)]
    low_power: bool,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message to one node
    Send {
        to: u8,
        message: String,
        #[arg(short, long, default_value = "3")]
        attempts: u32,
        /// Milliseconds to wait for each ack
        #[arg(short, long, default_value = "50")]
        wait: u64,
        #[arg(long)]
        no_ack: bool,
    },
    /// Send a message to every node
    Broadcast { message: String },
    /// Print received packets
    Listen {
        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
        /// Accept frames addressed to other nodes
        #[arg(short, long)]
        promiscuous: bool,
        /// Print packets as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Read the chip temperature
    Temperature {
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        calibration: i16,
    },
    /// Measure the signal strength
    Rssi,
    /// Dump registers 0x01..=0x4F
    Registers,
    /// Wake a node in listen mode
    Burst {
        to: u8,
        message: String,
        #[arg(long, default_value = "256")]
        rx_us: u32,
        #[arg(long, default_value = "1000000")]
        idle_us: u32,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<RadioConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            RadioConfig::from_json_str(&json)?
        }
        None => RadioConfig::new(FrequencyBand::Mhz433, 1),
    };
    if let Some(band) = cli.band {
        config.frequency_band = band;
    }
    if let Some(node) = cli.node {
        config.node_id = node;
    }
    if let Some(network) = cli.network {
        config = config.with_network_id(network);
    }
    if let Some(key) = &cli.key {
        config = config.with_encryption_key(key);
    }
    if let Some(power) = cli.power {
        config = config.with_power_percent(power);
    }
    if cli.low_power {
        config = config.with_high_power(false);
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger_with_level(&cli.log_level).context("installing logger")?;

    let config = load_config(&cli)?;
    let mut builder = RaspberryPiHalBuilder::new()
        .spi_bus(config.spi_bus)
        .slave_select(config.spi_slave_select)
        .spi_speed(config.spi_speed_hz)
        .interrupt_pin(config.pins.interrupt);
    builder = match config.pins.reset {
        Some(pin) => builder.reset_pin(pin),
        None => builder.no_reset(),
    };
    if let Some(pin) = config.pins.select {
        builder = builder.select_pin(pin);
    }
    let hal = builder.build().context("opening SPI and GPIO")?;
    let radio = Radio::new(hal, config).await.context("bringing up the radio")?;

    let result = run(&radio, cli.command).await;
    radio.shutdown().await?;
    result
}

async fn run(radio: &Radio<RaspberryPiHal>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Send {
            to,
            message,
            attempts,
            wait,
            no_ack,
        } => {
            let options = SendOptions::default()
                .with_attempts(attempts)
                .with_wait(Duration::from_millis(wait))
                .with_require_ack(!no_ack);
            match radio.send(to, message.as_bytes(), options).await? {
                SendOutcome::Acknowledged { attempts } => {
                    log_info(&format!("Acknowledged by node {to} after {attempts} attempt(s)"))
                }
                SendOutcome::NotRequested => log_info(&format!("Sent to node {to}")),
                SendOutcome::NoAck { attempts } => {
                    bail!("no ack from node {to} after {attempts} attempt(s)")
                }
            }
        }
        Commands::Broadcast { message } => {
            radio.broadcast(message.as_bytes()).await?;
            log_info("Broadcast sent");
        }
        Commands::Listen {
            seconds,
            promiscuous,
            json,
        } => {
            radio.set_promiscuous(promiscuous);
            let deadline = seconds.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));
            loop {
                let remaining = match deadline {
                    Some(deadline) => {
                        let left = deadline.saturating_duration_since(tokio::time::Instant::now());
                        if left.is_zero() {
                            break;
                        }
                        left
                    }
                    None => Duration::from_secs(1),
                };
                tokio::select! {
                    packet = radio.wait_for_packet(remaining) => {
                        if let Some(packet) = packet {
                            if json {
                                println!("{}", packet.to_json()?);
                            } else {
                                log_packet(&packet);
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            let stats = radio.stats();
            log_info(&format!(
                "Received {} packet(s), ignored {} frame(s)",
                stats.packets_queued, stats.frames_ignored
            ));
        }
        Commands::Temperature { calibration } => {
            let temperature = radio.read_temperature(calibration).await?;
            println!("{temperature} °C");
        }
        Commands::Rssi => {
            let rssi = radio.read_rssi(true).await?;
            println!("{rssi} dBm");
        }
        Commands::Registers => {
            for (addr, value) in radio.read_registers().await? {
                println!("0x{addr:02X}: 0x{value:02X} 0b{value:08b}");
            }
        }
        Commands::Burst {
            to,
            message,
            rx_us,
            idle_us,
        } => {
            let (rx, idle) = radio.set_listen_durations(rx_us, idle_us).await?;
            log_info(&format!("Listen cycle: {rx} us RX, {idle} us idle"));
            let frames = radio.listen_mode_send_burst(to, message.as_bytes()).await?;
            log_info(&format!("Burst of {frames} frame(s) sent to node {to}"));
        }
    }
    Ok(())
}
