//! RyFi: an IP link over a pair of RF carriers.
//!
//! Wires the TUN interface to the TX and RX pipelines and the pipelines
//! to the SDR through the driver registry, then pumps packets until
//! SIGINT. Everything configuration-shaped is a CLI flag; anything that
//! fails during bring-up logs and exits nonzero.

mod tun;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ryfi_core::agc::{Agc, AgcConfig};
use ryfi_core::fir::FirFilter;
use ryfi_core::packet::Packet;
use ryfi_core::receiver::Receiver;
use ryfi_core::stage::Stage;
use ryfi_core::stream::Stream;
use ryfi_core::transmitter::Transmitter;
use ryfi_sdr::driver::Registry;
use ryfi_sdr::loopback::{LoopbackDriver, LOOPBACK_DRIVER_NAME};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tun::{TunDevice, TUN_MAX_IP_PACKET_SIZE};

/// Baseband sample rate of the SDRs.
const SDR_SAMPLERATE: f64 = 1.5e6;

#[derive(Parser, Debug)]
#[command(name = "ryfi", version, about = "IP over radio via SDR")]
struct Cli {
    /// TUN interface name
    #[arg(short = 'd', long = "tun", default_value = "ryfi0")]
    tun: String,

    /// Receive device, as driver[:serial]
    #[arg(short = 'i', long = "rxdev")]
    rxdev: Option<String>,

    /// Transmit device, as driver[:serial]
    #[arg(short = 'o', long = "txdev")]
    txdev: Option<String>,

    /// Receive carrier frequency in Hz
    #[arg(short = 'r', long = "rxfreq", default_value_t = 435e6)]
    rxfreq: f64,

    /// Transmit carrier frequency in Hz
    #[arg(short = 't', long = "txfreq", default_value_t = 2315e6)]
    txfreq: f64,

    /// Symbol rate in baud
    #[arg(short = 'b', long = "baudrate", default_value_t = 720e3)]
    baudrate: f64,

    /// Receive filter bandwidth in Hz
    #[arg(long = "rxbw", default_value_t = 800e3)]
    rx_bandwidth: f64,

    /// Enumerate devices and exit
    #[arg(short = 'l', long = "list", default_value_t = false)]
    list: bool,

    /// Enumerate drivers and exit
    #[arg(long = "drivers", default_value_t = false)]
    drivers: bool,
}

static RUN: AtomicBool = AtomicBool::new(true);

extern "C" fn on_sigint(_sig: libc::c_int) {
    RUN.store(false, Ordering::SeqCst);
}

fn build_registry() -> Result<Registry> {
    let mut registry = Registry::new();
    registry
        .register(LOOPBACK_DRIVER_NAME, Box::new(LoopbackDriver::new()))
        .context("registering drivers")?;
    Ok(registry)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(err) = run(Cli::parse()) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    info!("RyFi starting up");

    let registry = build_registry()?;

    if cli.drivers {
        for name in registry.driver_names() {
            println!("{name}");
        }
        return Ok(());
    }

    if cli.list {
        for dev in registry.list() {
            let mut caps = Vec::new();
            if dev.caps.receive {
                caps.push("RX");
            }
            if dev.caps.transmit {
                caps.push("TX");
            }
            println!("{}:{} [{}]", dev.driver, dev.identifier, caps.join(" "));
        }
        return Ok(());
    }

    let Some(rxdev) = cli.rxdev.as_deref() else {
        bail!("no receive device given (use --rxdev driver[:serial])");
    };
    let Some(txdev) = cli.txdev.as_deref() else {
        bail!("no transmit device given (use --txdev driver[:serial])");
    };

    unsafe {
        libc::signal(
            libc::SIGINT,
            on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t,
        )
    };

    // TUN interface.
    info!("creating TUN interface '{}'", cli.tun);
    let tun = Arc::new(
        TunDevice::open(&cli.tun)
            .with_context(|| format!("failed to create TUN interface '{}'", cli.tun))?,
    );

    let params = ryfi_core::LinkParams {
        baudrate: cli.baudrate,
        samplerate: SDR_SAMPLERATE,
    };

    // TX chain: transmitter → AGC → SDR.
    info!("initialising the transmitter");
    let mut tx = Transmitter::new(params.baudrate, params.samplerate);
    let agc_out: Arc<Stream<ryfi_core::IQSample>> = Arc::new(Stream::new());
    let mut tx_agc = Agc::new(AgcConfig {
        target: 0.5,
        ..Default::default()
    });
    let mut agc_stage = Stage::spawn("tx-agc", tx.output(), agc_out.clone(), move |buf| {
        tx_agc.process_block(buf)
    });

    info!("initialising the SDR");
    let mut tx_dev = registry
        .open_tx(txdev, agc_out)
        .context("failed to open TX device")?;
    tx_dev.set_samplerate(params.samplerate)?;
    tx_dev.tune(cli.txfreq)?;

    let mut rx_dev = registry
        .open_rx(rxdev)
        .context("failed to open RX device")?;
    rx_dev.set_samplerate(params.samplerate)?;
    rx_dev.set_bandwidth(cli.rx_bandwidth)?;
    rx_dev.tune(cli.rxfreq)?;

    // RX chain: SDR → lowpass → receiver → TUN.
    info!("initialising the receiver");
    let lp_out: Arc<Stream<ryfi_core::IQSample>> = Arc::new(Stream::new());
    let mut lowpass = FirFilter::lowpass(
        cli.rx_bandwidth / 2.0,
        cli.rx_bandwidth / 20.0,
        SDR_SAMPLERATE,
    );
    let mut lp_stage = Stage::spawn("rx-lowpass", rx_dev.output(), lp_out.clone(), move |buf| {
        lowpass.process_block(buf)
    });

    let tun_out = tun.clone();
    let mut rx = Receiver::new(lp_out, params.baudrate, params.samplerate, move |pkt| {
        if let Err(err) = tun_out.send(pkt.data()) {
            warn!(%err, "failed to hand packet to TUN");
        }
    });

    // Bring everything up, DSP first, hardware last.
    info!("starting the DSP");
    tx.start();
    rx.start();

    info!("starting the SDR");
    if let Err(err) = rx_dev.start() {
        tx.stop();
        rx.stop();
        return Err(err).context("failed to start RX device");
    }
    if let Err(err) = tx_dev.start() {
        rx_dev.stop();
        tx.stop();
        rx.stop();
        return Err(err).context("failed to start TX device");
    }

    info!("ready, press CTRL+C to stop");

    // Pump IP packets from the TUN into the transmit queue.
    let mut buf = vec![0u8; TUN_MAX_IP_PACKET_SIZE];
    while RUN.load(Ordering::SeqCst) {
        match tun.recv_timeout(&mut buf, 100) {
            Ok(Some(len)) if len > 0 => {
                let Some(packet) = Packet::new(buf[..len].to_vec()) else {
                    warn!(len, "ignoring oversized IP packet");
                    continue;
                };
                // Drops on overflow are logged by the transmitter.
                let _ = tx.send(packet);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "TUN read failed, shutting down");
                break;
            }
        }
    }

    // Tear down in dependency order: RX hardware first so the receive
    // side drains, then the TX side from the queue outwards.
    info!("stopping the SDR");
    rx_dev.stop();
    tx_dev.stop();

    info!("stopping the DSP");
    lp_stage.stop();
    rx.stop();
    tx.stop();
    agc_stage.stop();

    info!("all done");
    Ok(())
}
