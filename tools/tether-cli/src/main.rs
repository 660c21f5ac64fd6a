//! Tether CLI tool
//!
//! A line-oriented chat harness for exercising tether servers and
//! connections over either transport: every stdin line goes to the other
//! side, every received packet prints to stdout.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tether_client::Connection;
use tether_server::{DatagramServer, StreamServer};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Tether CLI - framed messaging over TCP or UDP")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TransportKind {
    Tcp,
    Udp,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for peers; stdin lines broadcast to everyone connected
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:7400")]
        bind: String,

        #[arg(short, long, value_enum, default_value_t = TransportKind::Tcp)]
        transport: TransportKind,
    },

    /// Connect to a server; stdin lines go to it ("/ping" probes latency)
    Dial {
        /// Server address (host:port)
        addr: String,

        #[arg(short, long, value_enum, default_value_t = TransportKind::Tcp)]
        transport: TransportKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Serve { bind, transport } => serve(&bind, transport).await,
        Commands::Dial { addr, transport } => dial(&addr, transport).await,
    }
}

async fn serve(bind: &str, transport: TransportKind) -> Result<()> {
    match transport {
        TransportKind::Tcp => {
            let server = StreamServer::builder()
                .on_join(|id| println!("* joined: {id}"))
                .on_packet(|packet| println!("<{}> {}", packet.sender, packet.payload))
                .bind(bind)
                .await?;
            info!(addr = %server.local_addr(), "serving over tcp; stdin broadcasts");

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                server.broadcast(&line).await?;
            }
            server.close().await;
        }
        TransportKind::Udp => {
            let server = DatagramServer::builder()
                .on_join(|id| println!("* joined: {id}"))
                .on_packet(|packet| println!("<{}> {}", packet.sender, packet.payload))
                .bind(bind)
                .await?;
            info!(addr = %server.local_addr(), "serving over udp; stdin broadcasts");

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                server.broadcast(&line).await?;
            }
            server.close().await;
        }
    }
    Ok(())
}

async fn dial(addr: &str, transport: TransportKind) -> Result<()> {
    let builder = Connection::builder(addr)
        .on_packet(|packet| println!("<{}> {}", packet.sender, packet.payload));

    let conn = match transport {
        TransportKind::Tcp => builder.connect_stream().await?,
        TransportKind::Udp => builder.connect_datagram().await?,
    };
    info!(%addr, "connected; stdin sends, /ping probes, /rtt prints the last round trip");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.as_str() {
            "/ping" => conn.ping().await?,
            "/rtt" => match conn.rtt() {
                Some(rtt) => println!("* rtt: {rtt:?}"),
                None => println!("* rtt: not measured yet"),
            },
            _ => conn.send(&line).await?,
        }
        if !conn.is_open() {
            println!("* connection closed");
            break;
        }
    }

    conn.close().await;
    Ok(())
}
