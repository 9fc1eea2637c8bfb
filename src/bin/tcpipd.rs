//! `tcpipd`: a thin CLI driving the crate's user-space TCP stack over a TUN
//! device, generalizing the teacher's separate hard-coded client/server
//! binaries into one binary with `connect`/`listen` subcommands.

use std::io::{Read, Write};
use std::net::Ipv4Addr;
use std::str::FromStr;

use clap::{Parser, Subcommand};

use tcpip::{Dual, Quad, TcpConfig};

#[derive(Parser)]
#[command(name = "tcpipd", about = "user-space TCP over a TUN device")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Actively open a connection to `peer`.
    Connect {
        tun_name: String,
        local_addr: String,
        local_port: u16,
        peer_addr: String,
        peer_port: u16,
    },
    /// Wait for the peer named by `peer_addr`/`peer_port` to speak first.
    Listen {
        tun_name: String,
        local_addr: String,
        local_port: u16,
        peer_addr: String,
        peer_port: u16,
    },
}

fn quad_from_args(
    local_addr: &str,
    local_port: u16,
    peer_addr: &str,
    peer_port: u16,
) -> Result<Quad, std::net::AddrParseError> {
    Ok(Quad {
        src: Dual {
            ipv4: Ipv4Addr::from_str(local_addr)?,
            port: local_port,
        },
        dst: Dual {
            ipv4: Ipv4Addr::from_str(peer_addr)?,
            port: peer_port,
        },
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let netmask = Ipv4Addr::new(255, 255, 255, 0);

    // `connect` seeds the initial SYN itself; `listen` waits for the peer's
    // SYN to arrive before sending anything, exactly like the original
    // `TCPSocket::connect` vs. `listen_and_accept` split.
    let (stack, mut stream) = match cli.command {
        Command::Connect {
            tun_name,
            local_addr,
            local_port,
            peer_addr,
            peer_port,
        } => {
            let quad = quad_from_args(&local_addr, local_port, &peer_addr, peer_port)?;
            tcpip::NetStack::connect(&tun_name, quad.src.ipv4, netmask, quad, TcpConfig::default())?
        }
        Command::Listen {
            tun_name,
            local_addr,
            local_port,
            peer_addr,
            peer_port,
        } => {
            let quad = quad_from_args(&local_addr, local_port, &peer_addr, peer_port)?;
            tcpip::NetStack::listen(&tun_name, quad.src.ipv4, netmask, quad, TcpConfig::default())?
        }
    };

    let stdin_copier = stream.writer().map(|mut writer| {
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match std::io::stdin().read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if writer.write_all(&buf[..n]).is_err() {
                            break;
                        }
                    }
                }
            }
        })
    });

    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => std::io::stdout().write_all(&buf[..n])?,
            Err(err) => {
                tracing::error!(?err, "read failed");
                break;
            }
        }
    }

    drop(stdin_copier);
    stack.join();
    Ok(())
}
