//! tunroute down - restore the default route of an active session.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use tunlink::config::SessionState;
use tunlink::route::{CommandRunner, DryRunRunner, NamespaceRunner, ProcessRunner};
use tunlink::{Error, Result};

use super::DEFAULT_STATE_PATH;
use crate::GlobalOpts;

#[derive(Args)]
pub struct DownCmd {
    /// Session state file written by `tunroute up`.
    #[arg(long, default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,

    /// Print the route commands instead of running them.
    #[arg(long)]
    dry_run: bool,
}

impl DownCmd {
    pub async fn run(self, opts: &GlobalOpts) -> Result<()> {
        let session = SessionState::load(&self.state).map_err(|e| {
            if e.is_not_found() {
                Error::Config(format!("no active session ({})", self.state.display()))
            } else {
                e
            }
        })?;

        if self.dry_run {
            let mut routes = session.controller(DryRunRunner::new());
            routes.restore(session.tunnel_gateway, session.server).await?;
            return super::print_commands(&routes.runner().commands(), opts);
        }

        match &opts.netns {
            Some(name) => restore(&session, NamespaceRunner::new(name.clone())).await?,
            None => restore(&session, ProcessRunner).await?,
        }

        fs::remove_file(&self.state)?;
        if opts.json {
            let value = serde_json::json!({ "gateway": session.gateway });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("default via {}", session.gateway);
        }
        Ok(())
    }
}

async fn restore<R: CommandRunner>(session: &SessionState, runner: R) -> Result<()> {
    let mut routes = session.controller(runner);
    routes.restore(session.tunnel_gateway, session.server).await
}
