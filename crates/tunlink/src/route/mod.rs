//! Entering and leaving full-tunnel routing.
//!
//! - [`gateway`]: discover the baseline default gateway once per session.
//! - [`command`]: route mutations and the runners that apply them.
//! - [`controller`]: the setup/restore state machine.

pub mod command;
pub mod controller;
pub mod gateway;

pub use command::{
    CommandRunner, DryRunRunner, ExecResult, NamespaceRunner, ProcessRunner, RouteEntry,
    RouteMutation, RouteOp, RouteSyntax,
};
pub use controller::{RouteController, RouteState, restore_plan, setup_plan};
pub use gateway::{
    BestRouteQuery, DEFAULT_PROBE, ForwardRow, Gateway, resolve_default_gateway,
    resolve_default_gateway_with_probe,
};
