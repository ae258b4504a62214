//! tunroute command - full-tunnel route transitions.

mod commands;

use clap::{Parser, Subcommand};

/// Options shared by every subcommand.
pub struct GlobalOpts {
    pub json: bool,
    pub netns: Option<String>,
}

#[derive(Parser)]
#[command(
    name = "tunroute",
    version,
    about = "Route all traffic through a tunnel and back"
)]
struct Cli {
    /// Output JSON.
    #[arg(short = 'j', long, global = true)]
    json: bool,

    /// Log route commands and lookups.
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Operate inside a named network namespace.
    #[arg(short = 'n', long, global = true)]
    netns: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the default gateway.
    #[command(visible_alias = "gw")]
    Gateway(commands::gateway::GatewayCmd),

    /// Redirect the default route into the tunnel.
    Up(commands::up::UpCmd),

    /// Restore the default route of an active session.
    Down(commands::down::DownCmd),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let opts = GlobalOpts {
        json: cli.json,
        netns: cli.netns,
    };

    let result = match cli.command {
        Command::Gateway(cmd) => cmd.run(&opts).await,
        Command::Up(cmd) => cmd.run(&opts).await,
        Command::Down(cmd) => cmd.run(&opts).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
