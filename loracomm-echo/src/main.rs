use anyhow::Result;
use std::time::{Duration, Instant};

use loracomm::device::memory::Ether;
use loracomm::{CommConfig, LoRaComm, RadioId};

mod echo_client;
mod echo_server;

const TERMINAL_ID: RadioId = 0b0101_0010;
const ECHO_TAG: u8 = 1;
const PHRASE: u8 = 0x2a;
const POLL_DELAY: Duration = Duration::from_millis(250);
const MAX_TICKS: u32 = 1_000;

/// Runs an echo client (Gateway) and an echo server (Terminal) sharing an in-memory ether,
/// driven by a simulated clock.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let ether = Ether::new();
    let gateway = LoRaComm::new(
        ether.attach(-82, 6.5),
        CommConfig::gateway().with_phrase(PHRASE),
    );
    let terminal = LoRaComm::new(
        ether.attach(-97, -2.25),
        CommConfig::terminal(TERMINAL_ID)
            .with_phrase(PHRASE)
            .with_ack_delay(Duration::from_millis(500)),
    );
    log::info!("LoRa radios are ready.");

    let mut client = echo_client::EchoClient::new(
        gateway,
        TERMINAL_ID,
        ECHO_TAG,
        vec![
            "HELO1",
            "HELO2",
            "Enchante de pouvoir communiquer avec vous!",
        ]
        .into_iter()
        .map(|s| s.as_bytes().to_owned())
        .collect(),
    )?;
    let mut server = echo_server::EchoServer::new(terminal, ECHO_TAG)?;

    let start = Instant::now();
    for tick in 0..MAX_TICKS {
        let now = start + POLL_DELAY * tick;
        client.poll(now)?;
        server.poll(now)?;
        if client.is_done() {
            break;
        }
    }

    let stats = client.comm.statistics();
    println!(
        "Gateway: {} packet(s) sent, {}/{} valid packet(s) received.",
        stats.packets_sent, stats.packets_valid, stats.packets_received
    );
    for quality in client.comm.signal_qualities() {
        println!(
            "Terminal {:#x}: rssi {} dBm, snr {:.2} dB",
            quality.radio_id, quality.rssi, quality.snr
        );
    }
    println!("Stopping!");

    Ok(())
}
