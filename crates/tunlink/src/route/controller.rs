//! Full-tunnel route transitions.
//!
//! Entering tunnel mode takes three route changes, applied in order:
//!
//! 1. add a host route to the tunnel server via the baseline gateway, so the
//!    tunnel's own packets keep the physical path;
//! 2. add a default route via the tunnel gateway;
//! 3. delete the default route via the baseline gateway.
//!
//! [`RouteController::restore`] applies the exact reverse. A step that fails
//! aborts the call; the controller then reports which steps were applied and
//! [`RouteController::rollback`] can revert exactly those.
//!
//! # Example
//!
//! ```ignore
//! use tunlink::netlink::Connection;
//! use tunlink::route::{ProcessRunner, RouteController, RouteSyntax, resolve_default_gateway};
//!
//! let gateway = resolve_default_gateway(&Connection::new()?).await?;
//! let mut routes = RouteController::new(gateway, ProcessRunner, RouteSyntax::Iproute2);
//!
//! if let Err(e) = routes.establish_and_redirect(server, tunnel_gw).await {
//!     routes.rollback().await?;
//!     return Err(e);
//! }
//! // ... run the tunnel ...
//! routes.restore(tunnel_gw, server).await?;
//! ```

use std::fmt;
use std::net::Ipv4Addr;

use super::command::{CommandRunner, RouteEntry, RouteMutation, RouteSyntax, apply};
use super::gateway::Gateway;
use crate::error::{Error, Result};

/// Routing state of one tunnel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// The host routes through its baseline gateway.
    Normal,
    /// All traffic except the tunnel transport goes through the tunnel.
    Tunneled {
        server: Ipv4Addr,
        tunnel_gateway: Ipv4Addr,
    },
    /// Setup stopped after `applied` of its steps.
    Partial {
        server: Ipv4Addr,
        tunnel_gateway: Ipv4Addr,
        applied: usize,
    },
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Tunneled { .. } => f.write_str("tunneled"),
            Self::Partial { applied, .. } => write!(f, "partially tunneled ({applied}/3 steps)"),
        }
    }
}

/// Route mutations that enter tunnel mode, in application order.
pub fn setup_plan(
    gateway: Gateway,
    server: Ipv4Addr,
    tunnel_gateway: Ipv4Addr,
) -> [RouteMutation; 3] {
    let gw = gateway.addr();
    [
        RouteMutation::add(RouteEntry::host_via(server, gw)),
        RouteMutation::add(RouteEntry::default_via(tunnel_gateway)),
        RouteMutation::delete(RouteEntry::default_via(gw)),
    ]
}

/// Route mutations that leave tunnel mode, in application order.
///
/// Each step is the inverse of the matching setup step, taken in reverse.
pub fn restore_plan(
    gateway: Gateway,
    server: Ipv4Addr,
    tunnel_gateway: Ipv4Addr,
) -> [RouteMutation; 3] {
    let [host, tunnel_default, baseline_default] = setup_plan(gateway, server, tunnel_gateway);
    [
        baseline_default.inverse(),
        tunnel_default.inverse(),
        host.inverse(),
    ]
}

/// Drives the route table into and out of full-tunnel mode.
///
/// One controller per tunnel session; it owns the gateway captured when the
/// session started.
pub struct RouteController<R> {
    gateway: Gateway,
    runner: R,
    syntax: RouteSyntax,
    state: RouteState,
}

impl<R: CommandRunner> RouteController<R> {
    /// Create a controller for a host currently routing via `gateway`.
    pub fn new(gateway: Gateway, runner: R, syntax: RouteSyntax) -> Self {
        Self {
            gateway,
            runner,
            syntax,
            state: RouteState::Normal,
        }
    }

    /// Attach to a session whose routes were already redirected, e.g. by an
    /// earlier process, so that it can be restored.
    pub fn resume(
        gateway: Gateway,
        runner: R,
        syntax: RouteSyntax,
        server: Ipv4Addr,
        tunnel_gateway: Ipv4Addr,
    ) -> Self {
        Self {
            gateway,
            runner,
            syntax,
            state: RouteState::Tunneled {
                server,
                tunnel_gateway,
            },
        }
    }

    /// The baseline gateway captured for this session.
    pub fn gateway(&self) -> Gateway {
        self.gateway
    }

    /// Current routing state.
    pub fn state(&self) -> RouteState {
        self.state
    }

    /// The command runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Redirect all traffic through `tunnel_gateway`, keeping `server`
    /// reachable via the baseline gateway.
    ///
    /// On failure the remaining steps are skipped and the state becomes
    /// [`RouteState::Partial`].
    pub async fn establish_and_redirect(
        &mut self,
        server: Ipv4Addr,
        tunnel_gateway: Ipv4Addr,
    ) -> Result<()> {
        if self.state != RouteState::Normal {
            return Err(self.invalid("establish tunnel routes"));
        }

        tracing::info!(%server, %tunnel_gateway, gateway = %self.gateway, "redirecting default route");
        let plan = setup_plan(self.gateway, server, tunnel_gateway);
        for (applied, step) in plan.iter().enumerate() {
            if let Err(e) = apply(&self.runner, self.syntax, step, applied).await {
                self.state = if applied == 0 {
                    RouteState::Normal
                } else {
                    RouteState::Partial {
                        server,
                        tunnel_gateway,
                        applied,
                    }
                };
                return Err(e);
            }
        }

        self.state = RouteState::Tunneled {
            server,
            tunnel_gateway,
        };
        Ok(())
    }

    /// Put the baseline default route back and remove the tunnel routes.
    ///
    /// The addresses must match those given to
    /// [`establish_and_redirect`](Self::establish_and_redirect); otherwise
    /// [`Error::InvalidState`] is returned and no command runs. A failed
    /// step leaves the state [`RouteState::Tunneled`].
    pub async fn restore(&mut self, tunnel_gateway: Ipv4Addr, server: Ipv4Addr) -> Result<()> {
        let expected = RouteState::Tunneled {
            server,
            tunnel_gateway,
        };
        if self.state != expected {
            return Err(self.invalid("restore"));
        }

        tracing::info!(%server, %tunnel_gateway, gateway = %self.gateway, "restoring default route");
        let plan = restore_plan(self.gateway, server, tunnel_gateway);
        for (applied, step) in plan.iter().enumerate() {
            apply(&self.runner, self.syntax, step, applied).await?;
        }

        self.state = RouteState::Normal;
        Ok(())
    }

    /// Undo the steps a failed setup managed to apply, newest first.
    pub async fn rollback(&mut self) -> Result<()> {
        let RouteState::Partial {
            server,
            tunnel_gateway,
            applied,
        } = self.state
        else {
            return Err(self.invalid("roll back"));
        };

        tracing::info!(applied, "rolling back partial route setup");
        let plan = setup_plan(self.gateway, server, tunnel_gateway);
        for (undone, step) in plan[..applied].iter().rev().enumerate() {
            if let Err(e) = apply(&self.runner, self.syntax, &step.inverse(), undone).await {
                self.state = RouteState::Partial {
                    server,
                    tunnel_gateway,
                    applied: applied - undone,
                };
                return Err(e);
            }
        }

        self.state = RouteState::Normal;
        Ok(())
    }

    fn invalid(&self, operation: &'static str) -> Error {
        let state = match self.state {
            RouteState::Tunneled {
                server,
                tunnel_gateway,
            } => format!("tunneled (server {server} via {tunnel_gateway})"),
            other => other.to_string(),
        };
        Error::InvalidState { operation, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::command::ExecResult;
    use std::sync::Mutex;

    const SERVER: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);
    const GATEWAY: Gateway = Gateway::new(Ipv4Addr::new(192, 168, 1, 1));
    const TUNNEL_GW: Ipv4Addr = Ipv4Addr::new(10, 8, 0, 1);

    /// Records command lines; fails the call with the given index.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_at: Option<usize>,
    }

    impl Recorder {
        fn failing_at(index: usize) -> Self {
            Self {
                fail_at: Some(index),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for Recorder {
        async fn run(&self, program: &str, args: &[String]) -> std::io::Result<ExecResult> {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.len();
            calls.push(format!("{} {}", program, args.join(" ")));
            if self.fail_at == Some(index) {
                return Ok(ExecResult {
                    exit_code: 2,
                    stdout: String::new(),
                    stderr: "RTNETLINK answers: File exists".into(),
                });
            }
            Ok(ExecResult::ok())
        }
    }

    fn controller(runner: Recorder) -> RouteController<Recorder> {
        RouteController::new(GATEWAY, runner, RouteSyntax::Iproute2)
    }

    #[test]
    fn test_plans() {
        let setup: Vec<String> = setup_plan(GATEWAY, SERVER, TUNNEL_GW)
            .iter()
            .map(|m| m.to_string())
            .collect();
        assert_eq!(
            setup,
            [
                "add 203.0.113.5/32 via 192.168.1.1",
                "add 0.0.0.0/0 via 10.8.0.1",
                "delete 0.0.0.0/0 via 192.168.1.1",
            ]
        );

        let restore: Vec<String> = restore_plan(GATEWAY, SERVER, TUNNEL_GW)
            .iter()
            .map(|m| m.to_string())
            .collect();
        assert_eq!(
            restore,
            [
                "add 0.0.0.0/0 via 192.168.1.1",
                "delete 0.0.0.0/0 via 10.8.0.1",
                "delete 203.0.113.5/32 via 192.168.1.1",
            ]
        );
    }

    #[tokio::test]
    async fn test_establish_then_restore() {
        let mut routes = controller(Recorder::default());
        routes.establish_and_redirect(SERVER, TUNNEL_GW).await.unwrap();
        assert_eq!(
            routes.state(),
            RouteState::Tunneled {
                server: SERVER,
                tunnel_gateway: TUNNEL_GW
            }
        );

        routes.restore(TUNNEL_GW, SERVER).await.unwrap();
        assert_eq!(routes.state(), RouteState::Normal);
        assert_eq!(
            routes.runner().calls(),
            [
                "ip route add 203.0.113.5/32 via 192.168.1.1",
                "ip route add 0.0.0.0/0 via 10.8.0.1",
                "ip route del 0.0.0.0/0 via 192.168.1.1",
                "ip route add 0.0.0.0/0 via 192.168.1.1",
                "ip route del 0.0.0.0/0 via 10.8.0.1",
                "ip route del 203.0.113.5/32 via 192.168.1.1",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_step_stops_setup() {
        let mut routes = controller(Recorder::failing_at(1));
        let err = routes
            .establish_and_redirect(SERVER, TUNNEL_GW)
            .await
            .unwrap_err();

        match err {
            Error::RouteCommand {
                command,
                exit_code,
                output,
                applied,
            } => {
                assert_eq!(command, "ip route add 0.0.0.0/0 via 10.8.0.1");
                assert_eq!(exit_code, 2);
                assert_eq!(output, "RTNETLINK answers: File exists");
                assert_eq!(applied, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(routes.runner().calls().len(), 2);
        assert_eq!(
            routes.state(),
            RouteState::Partial {
                server: SERVER,
                tunnel_gateway: TUNNEL_GW,
                applied: 1
            }
        );
    }

    #[tokio::test]
    async fn test_first_step_failure_stays_normal() {
        let mut routes = controller(Recorder::failing_at(0));
        assert!(routes.establish_and_redirect(SERVER, TUNNEL_GW).await.is_err());
        assert_eq!(routes.state(), RouteState::Normal);
        assert_eq!(routes.runner().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_reverts_applied_steps() {
        let mut routes = controller(Recorder::failing_at(2));
        assert!(routes.establish_and_redirect(SERVER, TUNNEL_GW).await.is_err());

        routes.rollback().await.unwrap();
        assert_eq!(routes.state(), RouteState::Normal);
        assert_eq!(
            routes.runner().calls()[3..],
            [
                "ip route del 0.0.0.0/0 via 10.8.0.1",
                "ip route del 203.0.113.5/32 via 192.168.1.1",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_restore_stays_tunneled() {
        let mut routes = controller(Recorder::failing_at(4));
        routes.establish_and_redirect(SERVER, TUNNEL_GW).await.unwrap();
        let err = routes.restore(TUNNEL_GW, SERVER).await.unwrap_err();
        assert!(err.is_route_command());
        assert!(matches!(routes.state(), RouteState::Tunneled { .. }));
        assert_eq!(routes.runner().calls().len(), 5);
    }

    #[tokio::test]
    async fn test_wrong_state_issues_no_commands() {
        let mut routes = controller(Recorder::default());
        assert!(matches!(
            routes.restore(TUNNEL_GW, SERVER).await,
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            routes.rollback().await,
            Err(Error::InvalidState { .. })
        ));

        routes.establish_and_redirect(SERVER, TUNNEL_GW).await.unwrap();
        assert!(matches!(
            routes.establish_and_redirect(SERVER, TUNNEL_GW).await,
            Err(Error::InvalidState { .. })
        ));
        assert_eq!(routes.runner().calls().len(), 3);
    }

    #[tokio::test]
    async fn test_restore_rejects_other_addresses() {
        let mut routes = controller(Recorder::default());
        routes.establish_and_redirect(SERVER, TUNNEL_GW).await.unwrap();

        let other = Ipv4Addr::new(198, 51, 100, 9);
        let err = routes.restore(TUNNEL_GW, other).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot restore while routes are tunneled (server 203.0.113.5 via 10.8.0.1)"
        );
        assert!(matches!(
            routes.restore(other, SERVER).await,
            Err(Error::InvalidState { .. })
        ));
        assert_eq!(routes.runner().calls().len(), 3);

        routes.restore(TUNNEL_GW, SERVER).await.unwrap();
        assert_eq!(routes.state(), RouteState::Normal);
    }

    #[tokio::test]
    async fn test_resume_allows_restore() {
        let mut routes = RouteController::resume(
            GATEWAY,
            Recorder::default(),
            RouteSyntax::WindowsRoute,
            SERVER,
            TUNNEL_GW,
        );
        routes.restore(TUNNEL_GW, SERVER).await.unwrap();
        assert_eq!(
            routes.runner().calls(),
            [
                "route add 0.0.0.0/0 192.168.1.1",
                "route delete 0.0.0.0/0 10.8.0.1",
                "route delete 203.0.113.5/32 192.168.1.1",
            ]
        );
    }
}
