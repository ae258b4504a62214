//! tunroute up - redirect the default route into the tunnel.

use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Args;
use tunlink::config::{SessionState, TunnelConfig};
use tunlink::route::{
    CommandRunner, DryRunRunner, NamespaceRunner, ProcessRunner, RouteController, RouteState,
    resolve_default_gateway_with_probe,
};
use tunlink::{Error, Result};

use super::{DEFAULT_STATE_PATH, SyntaxArg};
use crate::GlobalOpts;

#[derive(Args)]
pub struct UpCmd {
    /// JSON tunnel configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tunnel server address.
    #[arg(long)]
    server: Option<Ipv4Addr>,

    /// Next hop inside the tunnel.
    #[arg(long)]
    tunnel_gateway: Option<Ipv4Addr>,

    /// Baseline gateway (discovered when omitted).
    #[arg(long)]
    gateway: Option<Ipv4Addr>,

    /// Destination used to discover the baseline gateway.
    #[arg(long)]
    probe: Option<Ipv4Addr>,

    /// Route command dialect.
    #[arg(long, value_enum)]
    syntax: Option<SyntaxArg>,

    /// Session state file.
    #[arg(long, default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,

    /// Print the route commands instead of running them.
    #[arg(long)]
    dry_run: bool,
}

impl UpCmd {
    pub async fn run(self, opts: &GlobalOpts) -> Result<()> {
        let config = self.tunnel_config()?;
        let gateway = match config.gateway {
            Some(gateway) => gateway,
            None => {
                let conn = super::connection(opts)?;
                resolve_default_gateway_with_probe(&conn, config.probe).await?
            }
        };

        if self.dry_run {
            let mut routes = RouteController::new(gateway, DryRunRunner::new(), config.syntax);
            establish(&mut routes, &config).await?;
            return super::print_commands(&routes.runner().commands(), opts);
        }

        if self.state.exists() {
            return Err(Error::Config(format!(
                "a session is already active ({}); run `tunroute down` first",
                self.state.display()
            )));
        }

        match &opts.netns {
            Some(name) => {
                let runner = NamespaceRunner::new(name.clone());
                self.commit(RouteController::new(gateway, runner, config.syntax), &config, opts)
                    .await
            }
            None => {
                let routes = RouteController::new(gateway, ProcessRunner, config.syntax);
                self.commit(routes, &config, opts).await
            }
        }
    }

    /// Merge the configuration file with command-line overrides.
    fn tunnel_config(&self) -> Result<TunnelConfig> {
        let mut config = match &self.config {
            Some(path) => TunnelConfig::load(path)?,
            None => {
                let server = self
                    .server
                    .ok_or_else(|| Error::Config("--server or --config is required".into()))?;
                let tunnel_gateway = self.tunnel_gateway.ok_or_else(|| {
                    Error::Config("--tunnel-gateway or --config is required".into())
                })?;
                TunnelConfig::new(server, tunnel_gateway)
            }
        };

        if let Some(server) = self.server {
            config.server = server;
        }
        if let Some(tunnel_gateway) = self.tunnel_gateway {
            config.tunnel_gateway = tunnel_gateway;
        }
        if let Some(gateway) = self.gateway {
            config.gateway = Some(gateway.into());
        }
        if let Some(probe) = self.probe {
            config.probe = probe;
        }
        if let Some(syntax) = self.syntax {
            config.syntax = syntax.into();
        }

        config.validate()?;
        Ok(config)
    }

    /// Record the session, then redirect the routes.
    ///
    /// The state file is written first so that redirected routes always have
    /// a record for `tunroute down`. It is removed again if setup leaves the
    /// routes as they were.
    async fn commit<R: CommandRunner>(
        &self,
        mut routes: RouteController<R>,
        config: &TunnelConfig,
        opts: &GlobalOpts,
    ) -> Result<()> {
        let session = SessionState {
            server: config.server,
            tunnel_gateway: config.tunnel_gateway,
            gateway: routes.gateway(),
            syntax: config.syntax,
        };
        session.save(&self.state)?;

        if let Err(e) = establish(&mut routes, config).await {
            if routes.state() == RouteState::Normal {
                if let Err(remove) = fs::remove_file(&self.state) {
                    tracing::warn!(
                        error = %remove,
                        path = %self.state.display(),
                        "cannot remove state file"
                    );
                }
            } else {
                tracing::error!(
                    state = %routes.state(),
                    path = %self.state.display(),
                    "routes left partially redirected; state file kept"
                );
            }
            return Err(e);
        }

        if opts.json {
            println!("{}", serde_json::to_string_pretty(&session)?);
        } else {
            println!(
                "default via {} (server {} via {})",
                session.tunnel_gateway, session.server, session.gateway
            );
        }
        Ok(())
    }
}

/// Run setup, undoing any partially applied steps on failure.
async fn establish<R: CommandRunner>(
    routes: &mut RouteController<R>,
    config: &TunnelConfig,
) -> Result<()> {
    let Err(e) = routes
        .establish_and_redirect(config.server, config.tunnel_gateway)
        .await
    else {
        return Ok(());
    };

    if matches!(routes.state(), RouteState::Partial { .. }) {
        tracing::warn!(state = %routes.state(), "route setup failed, rolling back");
        if let Err(rollback) = routes.rollback().await {
            tracing::error!(error = %rollback, state = %routes.state(), "rollback failed");
        }
    }
    Err(e)
}
