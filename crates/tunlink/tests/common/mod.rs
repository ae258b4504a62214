//! Common utilities for kernel tests.
//!
//! Provides `TestNamespace` for isolated network namespace testing and
//! helper macros for conditional test execution.

use std::io;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

use tunlink::netlink::Connection;
use tunlink::route::NamespaceRunner;
use tunlink::{Error, Result};

/// Global counter for unique namespace names.
static NAMESPACE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a unique namespace name for this test.
fn unique_ns_name(prefix: &str) -> String {
    let id = NAMESPACE_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("tunlink-test-{}-{}-{}", prefix, std::process::id(), id)
}

/// A test network namespace, deleted on drop.
pub struct TestNamespace {
    name: String,
}

impl TestNamespace {
    /// Create a new namespace with a unique name derived from `prefix`.
    pub fn new(prefix: &str) -> Result<Self> {
        let name = unique_ns_name(prefix);

        let status = Command::new("ip")
            .args(["netns", "add", &name])
            .status()
            .map_err(|e| Error::Io(io::Error::from(e.kind())))?;

        if !status.success() {
            return Err(Error::InvalidMessage(format!(
                "failed to create namespace: {}",
                name
            )));
        }

        Ok(Self { name })
    }

    /// Get a routing connection inside this namespace.
    pub fn connection(&self) -> Result<Connection> {
        Connection::new_in_namespace(&self.name)
    }

    /// A runner whose commands execute inside this namespace.
    pub fn runner(&self) -> NamespaceRunner {
        NamespaceRunner::new(&self.name)
    }

    /// Run a command in the namespace and return its output.
    pub fn exec(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = Command::new("ip")
            .args(["netns", "exec", &self.name, cmd])
            .args(args)
            .output()
            .map_err(|e| Error::Io(io::Error::from(e.kind())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::InvalidMessage(format!(
                "command failed: {} {:?}: {}",
                cmd, args, stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Add a dummy interface with `addr` (CIDR) and bring it up.
    pub fn add_dummy(&self, name: &str, addr: &str) -> Result<()> {
        self.exec("ip", &["link", "add", name, "type", "dummy"])?;
        self.exec("ip", &["addr", "add", addr, "dev", name])?;
        self.exec("ip", &["link", "set", name, "up"])?;
        Ok(())
    }

    /// The IPv4 routing table as printed by `ip route show`.
    pub fn routes(&self) -> Result<String> {
        self.exec("ip", &["-4", "route", "show"])
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        let _ = Command::new("ip")
            .args(["netns", "del", &self.name])
            .status();
    }
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}
