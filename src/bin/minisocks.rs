use anyhow::{Result, bail};
use clap::Parser;
use minisocks::{Socks5Server, StaticCredentials};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "A pluggable SOCKS5 proxy server", long_about = None)]
struct Args {
    /// Listener address
    #[arg(short, long, default_value = "127.0.0.1:1080")]
    listen: String,

    /// Username for SOCKS5 proxy
    #[arg(short, long)]
    username: Option<String>,

    /// Password for SOCKS5 proxy
    #[arg(short, long)]
    password: Option<String>,

    /// Upstream connect timeout in seconds
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    let mut server = Socks5Server::new(args.listen)
        .with_connect_timeout(std::time::Duration::from_secs(args.timeout));

    // Check for auth and apply it if present
    server = match (args.username, args.password) {
        (Some(u), Some(p)) => {
            info!("Authentication enabled");
            let creds: StaticCredentials = [(u, p)].into_iter().collect();
            server.with_credentials(creds)
        }
        (None, None) => server,
        _ => bail!("must provide both username and password (or neither)"),
    };

    server.run().await?;
    Ok(())
}
