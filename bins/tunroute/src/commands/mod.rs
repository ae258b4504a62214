//! Subcommand implementations.

pub mod down;
pub mod gateway;
pub mod up;

use clap::ValueEnum;
use tunlink::Result;
use tunlink::netlink::Connection;
use tunlink::route::RouteSyntax;

use crate::GlobalOpts;

/// Where `up` records the session for `down`.
pub const DEFAULT_STATE_PATH: &str = "/run/tunroute/session.json";

/// Route command dialect.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SyntaxArg {
    /// ip route add|del <prefix> via <gateway>
    Iproute2,
    /// route add|delete <prefix> <gateway>
    WindowsRoute,
}

impl From<SyntaxArg> for RouteSyntax {
    fn from(arg: SyntaxArg) -> Self {
        match arg {
            SyntaxArg::Iproute2 => Self::Iproute2,
            SyntaxArg::WindowsRoute => Self::WindowsRoute,
        }
    }
}

/// Open a routing connection in the selected namespace.
fn connection(opts: &GlobalOpts) -> Result<Connection> {
    match &opts.netns {
        Some(name) => Connection::new_in_namespace(name),
        None => Connection::new(),
    }
}

/// Print the commands a dry run would have executed.
fn print_commands(commands: &[String], opts: &GlobalOpts) -> Result<()> {
    if opts.json {
        println!("{}", serde_json::to_string_pretty(commands)?);
    } else {
        for line in commands {
            println!("{}", line);
        }
    }
    Ok(())
}
