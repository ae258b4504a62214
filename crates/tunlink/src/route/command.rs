//! Route mutations and the command runners that apply them.
//!
//! Every route change is a single external command. The controller only
//! builds [`RouteMutation`]s; a [`RouteSyntax`] renders them into an argv
//! and a [`CommandRunner`] executes it.

use std::fmt;
use std::future::Future;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{Error, Result};

/// Whether a mutation adds or removes a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOp {
    Add,
    Delete,
}

impl RouteOp {
    /// The operation that undoes this one.
    pub fn inverse(self) -> Self {
        match self {
            Self::Add => Self::Delete,
            Self::Delete => Self::Add,
        }
    }
}

impl fmt::Display for RouteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// A destination prefix and the next hop it is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// Destination network address.
    pub destination: Ipv4Addr,
    /// Destination prefix length.
    pub prefix_len: u8,
    /// Next hop.
    pub next_hop: Ipv4Addr,
}

impl RouteEntry {
    /// The default route (0.0.0.0/0) via `next_hop`.
    pub const fn default_via(next_hop: Ipv4Addr) -> Self {
        Self {
            destination: Ipv4Addr::UNSPECIFIED,
            prefix_len: 0,
            next_hop,
        }
    }

    /// A host route (addr/32) via `next_hop`.
    pub const fn host_via(host: Ipv4Addr, next_hop: Ipv4Addr) -> Self {
        Self {
            destination: host,
            prefix_len: 32,
            next_hop,
        }
    }

    /// The destination in CIDR notation.
    pub fn prefix(&self) -> String {
        format!("{}/{}", self.destination, self.prefix_len)
    }
}

/// One route-table change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMutation {
    pub op: RouteOp,
    pub entry: RouteEntry,
}

impl RouteMutation {
    pub const fn add(entry: RouteEntry) -> Self {
        Self {
            op: RouteOp::Add,
            entry,
        }
    }

    pub const fn delete(entry: RouteEntry) -> Self {
        Self {
            op: RouteOp::Delete,
            entry,
        }
    }

    /// The mutation that undoes this one.
    pub fn inverse(&self) -> Self {
        Self {
            op: self.op.inverse(),
            entry: self.entry,
        }
    }
}

impl fmt::Display for RouteMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} via {}", self.op, self.entry.prefix(), self.entry.next_hop)
    }
}

/// Command-line dialect used to change routes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteSyntax {
    /// `ip route add|del <prefix> via <gateway>`
    #[default]
    Iproute2,
    /// `route add|delete <prefix> <gateway>`
    WindowsRoute,
}

impl RouteSyntax {
    /// Render a mutation into a program name and its arguments.
    pub fn render(&self, mutation: &RouteMutation) -> (&'static str, Vec<String>) {
        let prefix = mutation.entry.prefix();
        let next_hop = mutation.entry.next_hop.to_string();
        match self {
            Self::Iproute2 => {
                let op = match mutation.op {
                    RouteOp::Add => "add",
                    RouteOp::Delete => "del",
                };
                (
                    "ip",
                    vec!["route".into(), op.into(), prefix, "via".into(), next_hop],
                )
            }
            Self::WindowsRoute => {
                let op = match mutation.op {
                    RouteOp::Add => "add",
                    RouteOp::Delete => "delete",
                };
                ("route", vec![op.into(), prefix, next_hop])
            }
        }
    }
}

/// Result of running an external command.
///
/// Output is kept exactly as the command wrote it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// The exit code of the command (0 = success, -1 = killed by a signal).
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl ExecResult {
    /// A successful result with no output.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, unmodified.
    pub fn combined_output(&self) -> String {
        let mut output = String::with_capacity(self.stdout.len() + self.stderr.len());
        output.push_str(&self.stdout);
        output.push_str(&self.stderr);
        output
    }
}

/// Executes route commands.
pub trait CommandRunner {
    /// Run `program` with `args`, capturing its output.
    ///
    /// Returns `Err` only if the command could not be run at all; a non-zero
    /// exit is reported through [`ExecResult::exit_code`].
    fn run(
        &self,
        program: &str,
        args: &[String],
    ) -> impl Future<Output = std::io::Result<ExecResult>> + Send;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<ExecResult> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs commands inside a named network namespace via `ip netns exec`.
#[derive(Debug, Clone)]
pub struct NamespaceRunner {
    name: String,
}

impl NamespaceRunner {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl CommandRunner for NamespaceRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<ExecResult> {
        let mut full = Vec::with_capacity(args.len() + 4);
        full.extend(["netns".to_string(), "exec".to_string(), self.name.clone()]);
        full.push(program.to_string());
        full.extend_from_slice(args);
        ProcessRunner.run("ip", &full).await
    }
}

/// Records commands instead of running them.
///
/// Every command succeeds. Useful for previewing a transition.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    commands: Mutex<Vec<String>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command lines seen so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl CommandRunner for DryRunRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<ExecResult> {
        let line = command_line(program, args);
        tracing::info!(command = %line, "dry run");
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(line);
        }
        Ok(ExecResult::ok())
    }
}

/// Join a program and its arguments for logs and error messages.
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Apply one mutation, turning any failure into a route command error.
///
/// `applied` is the number of steps of the surrounding transition that had
/// already succeeded, carried into the error.
pub async fn apply<R: CommandRunner>(
    runner: &R,
    syntax: RouteSyntax,
    mutation: &RouteMutation,
    applied: usize,
) -> Result<()> {
    let (program, args) = syntax.render(mutation);
    let command = command_line(program, &args);
    tracing::debug!(%command, "applying route change");

    let result = runner
        .run(program, &args)
        .await
        .map_err(|source| Error::CommandSpawn {
            command: command.clone(),
            source,
        })?;

    if result.success() {
        return Ok(());
    }

    tracing::warn!(
        %command,
        exit_code = result.exit_code,
        stderr = result.stderr.trim(),
        "route command failed"
    );
    Err(Error::RouteCommand {
        command,
        exit_code: result.exit_code,
        output: result.combined_output(),
        applied,
    })
}
