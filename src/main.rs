//! Entry point for `abp-over-udp`.
//!
//! Parses CLI arguments and dispatches into either **sender** or **receiver**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing).

use std::net::SocketAddrV4;

use clap::{Parser, Subcommand};
use tokio::net::UdpSocket;

use abp_over_udp::l4::{L4Sap, SapError};
use abp_over_udp::segment::L4_PAYLOAD_SIZE;

/// Stop-and-wait reliable datagram transport over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send messages to a peer, waiting for each acknowledgement.
    Sender {
        /// Local address to bind (e.g. 0.0.0.0:5700).
        #[arg(short, long, default_value = "0.0.0.0:5700")]
        bind: String,
        /// Peer address (e.g. 127.0.0.1:5701).
        #[arg(short, long)]
        peer: SocketAddrV4,
        /// Message payload.
        #[arg(short, long, default_value = "hello over stop-and-wait")]
        message: String,
        /// How many copies of the message to send.
        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },
    /// Print received messages until the peer resets the session.
    Receiver {
        /// Local address to bind (e.g. 0.0.0.0:5701).
        #[arg(short, long, default_value = "0.0.0.0:5701")]
        bind: String,
        /// Peer address (e.g. 127.0.0.1:5700).
        #[arg(short, long)]
        peer: SocketAddrV4,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Sender {
            bind,
            peer,
            message,
            count,
        } => {
            let socket = UdpSocket::bind(&bind).await?;
            let mut sap = L4Sap::from_socket(socket, peer)?;
            log::info!("sending {count} message(s) to {peer}");
            for i in 0..count {
                let n = sap.send(message.as_bytes()).await?;
                log::info!("message {i} delivered ({n} bytes)");
            }
            sap.close().await;
        }
        Mode::Receiver { bind, peer } => {
            let socket = UdpSocket::bind(&bind).await?;
            let mut sap = L4Sap::from_socket(socket, peer)?;
            log::info!("receiving from {peer}");
            let mut buf = [0u8; L4_PAYLOAD_SIZE];
            loop {
                match sap.recv(&mut buf).await {
                    Ok(n) => println!("{}", String::from_utf8_lossy(&buf[..n])),
                    Err(SapError::Reset) => {
                        log::info!("peer reset the session, exiting");
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    Ok(())
}
