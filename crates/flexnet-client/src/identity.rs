//! Client identity fields sent on every `HELLO`, and the knobs that shape a sweep.
//! `Config`'s shape mirrors `ironrdp-connector::Config`: plain data, no behavior.

use std::time::Duration;

/// Fields this machine presents to a license manager or vendor daemon. The defaults
/// match what `examples/original_source/client.py` hardcodes for its own identity.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub user: String,
    pub host: String,
    pub tty: String,
    pub pid: String,
    pub arch: String,
    pub version: (u8, u8),
}

impl ClientIdentity {
    /// Builds an identity from the process environment: `$USER`, the local hostname,
    /// and this process's pid. `tty` and `arch` fall back to fixed constants since
    /// there's no portable way to ask a blocking TCP client for its controlling
    /// terminal or FlexNet's own architecture tag.
    pub fn from_env() -> Self {
        let user = std::env::var("USER").unwrap_or_default();
        let host = gethostname::gethostname().to_string_lossy().into_owned();
        let pid = std::process::id().to_string();

        Self {
            user,
            host,
            tty: "/dev/pts/1".to_owned(),
            pid,
            arch: "x64_lsb".to_owned(),
            version: (11, 11),
        }
    }
}

/// Behavior knobs for a sweep, independent of the identity presented on the wire.
#[derive(Debug, Clone)]
pub struct Config {
    /// Applied to every TCP connect, read, and write.
    pub io_timeout: Duration,
    /// Whether to fetch and parse the manager's license-file text (the empty-command
    /// `REQ`). When `false`, vendors are still discovered and queried, but their
    /// `licenses` lists stay empty since there's nothing to reconcile against.
    pub fetch_license_file_text: bool,
    /// Whether to follow a redundant manager's `HELLO` redirect to its reported
    /// hostname before continuing the sweep.
    pub follow_redundant_manager_redirect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(10),
            fetch_license_file_text: true,
            follow_redundant_manager_redirect: true,
        }
    }
}
