use std::io::ErrorKind;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

#[derive(Parser)]
#[command(name = "harness-probe")]
#[command(about = "Exercise a running fault harness", long_about = None)]
struct Cli {
    /// Give up on any single exchange after this many seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message to the TCP echo listener and print the reply
    Tcp {
        #[arg(default_value = "127.0.0.1:5600")]
        addr: String,
        #[arg(default_value = "hello")]
        message: String,
    },
    /// Send a datagram to the UDP echo listener and print the reply
    Udp {
        #[arg(default_value = "127.0.0.1:5700")]
        addr: String,
        #[arg(default_value = "hello")]
        message: String,
    },
    /// Hit the control listener's /reset and report how the connection ended
    ControlReset {
        #[arg(default_value = "127.0.0.1:5800")]
        addr: String,
        /// Ask for a reset instead of a normal close
        #[arg(long = "do")]
        do_reset: bool,
    },
    /// Hit the debug service's /reset and report how the connection ended
    DebugReset {
        #[arg(default_value = "http://127.0.0.1:8080")]
        url: String,
        #[arg(long = "do")]
        do_reset: bool,
    },
}

#[derive(Debug)]
enum Ending {
    Closed(Vec<u8>),
    Reset(Vec<u8>),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Tcp { addr, message } => {
            let mut stream = TcpStream::connect(&addr).await?;
            stream.write_all(message.as_bytes()).await?;
            let mut buf = vec![0u8; message.len()];
            tokio::time::timeout(timeout, stream.read_exact(&mut buf)).await??;
            println!("{}", String::from_utf8_lossy(&buf));
        }
        Commands::Udp { addr, message } => {
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect(&addr).await?;
            socket.send(message.as_bytes()).await?;
            let mut buf = vec![0u8; 65535];
            let n = tokio::time::timeout(timeout, socket.recv(&mut buf)).await??;
            println!("{}", String::from_utf8_lossy(&buf[..n]));
        }
        Commands::ControlReset { addr, do_reset } => {
            let mut stream = TcpStream::connect(&addr).await?;
            let head = format!("GET /reset?do={do_reset} HTTP/1.1\r\nHost: {addr}\r\n\r\n");
            stream.write_all(head.as_bytes()).await?;
            report(tokio::time::timeout(timeout, read_until_end(&mut stream)).await??);
        }
        Commands::DebugReset { url, do_reset } => {
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            let res = client
                .get(format!("{}/reset", url.trim_end_matches('/')))
                .query(&[("do", do_reset)])
                .send()
                .await;

            match res {
                Ok(res) => {
                    let status = res.status();
                    let closes = res
                        .headers()
                        .get(reqwest::header::CONNECTION)
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.eq_ignore_ascii_case("close"))
                        .unwrap_or(false);
                    let body = res.text().await?;
                    println!("{status} (connection close: {closes})");
                    println!("{body}");
                }
                Err(e) => eprintln!("Request failed: {e}"),
            }
        }
    }

    Ok(())
}

async fn read_until_end(stream: &mut TcpStream) -> std::io::Result<Ending> {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => return Ok(Ending::Closed(received)),
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::ConnectionReset => return Ok(Ending::Reset(received)),
            Err(e) => return Err(e),
        }
    }
}

fn report(ending: Ending) {
    match ending {
        Ending::Closed(bytes) => {
            println!("closed (FIN) after {} bytes", bytes.len());
            print!("{}", String::from_utf8_lossy(&bytes));
        }
        Ending::Reset(bytes) => {
            println!("reset (RST) after {} bytes", bytes.len());
            if !bytes.is_empty() {
                print!("{}", String::from_utf8_lossy(&bytes));
            }
        }
    }
}
