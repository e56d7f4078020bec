//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built from CLI arguments and environment variables in `main.rs`, or
//! from defaults in tests.  Nothing below `main.rs` reads the environment.

use std::path::PathBuf;

/// Default RouterOS API port (plain, non-TLS).
pub const DEFAULT_API_PORT: u16 = 8728;

/// All runtime configuration for the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Hostname or IP address of the RouterOS router.
    pub router_host: String,

    /// RouterOS API port.
    pub router_port: u16,

    /// RouterOS user name.
    pub login: String,

    /// RouterOS password.
    pub password: String,

    /// LTE interface to send AT commands to.
    ///
    /// `None` selects the first interface found by discovery.
    pub interface: Option<String>,

    /// Explicit path of the lpac binary, overriding the lookup rules.
    pub lpac_bin: Option<PathBuf>,

    /// Arguments forwarded to lpac unchanged.
    pub lpac_args: Vec<String>,
}

impl BridgeConfig {
    /// `host:port` of the RouterOS API, as reported in interface listings.
    pub fn router_addr(&self) -> String {
        format!("{}:{}", self.router_host, self.router_port)
    }

    /// Returns `true` when the forwarded arguments ask for `driver apdu list`.
    ///
    /// That request is answered by the bridge itself, without starting lpac.
    pub fn is_interface_listing(&self) -> bool {
        let expected = ["driver", "apdu", "list"];
        self.lpac_args.len() >= expected.len()
            && self
                .lpac_args
                .iter()
                .zip(expected)
                .all(|(arg, want)| arg.eq_ignore_ascii_case(want))
    }
}

impl Default for BridgeConfig {
    /// | Field        | Default          |
    /// |--------------|------------------|
    /// | router_host  | `192.168.88.1`   |
    /// | router_port  | `8728`           |
    /// | login        | `admin`          |
    /// | password     | empty            |
    fn default() -> Self {
        Self {
            router_host: "192.168.88.1".to_owned(),
            router_port: DEFAULT_API_PORT,
            login: "admin".to_owned(),
            password: String::new(),
            interface: None,
            lpac_bin: None,
            lpac_args: Vec::new(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
