//! lpac-ros entry point.
//!
//! Runs lpac with its APDU driver switched to stdio and answers lpac's driver
//! requests by sending AT commands to a modem attached to a RouterOS router.
//! Everything else lpac prints is passed through to stdout unchanged, so the
//! bridge can stand in for lpac itself.
//!
//! # Usage
//!
//! ```text
//! lpac-ros [OPTIONS] <LPAC_ARGS>...
//!
//! Options:
//!   --router-host <HOST>   RouterOS address        [env: ROS_IP]
//!   --router-port <PORT>   RouterOS API port       [env: ROS_API_PORT] [default: 8728]
//!   --login <USER>         RouterOS user           [env: ROS_LOGIN] [default: admin]
//!   --password <PASS>      RouterOS password       [env: ROS_PASSWORD]
//!   --interface <ID>       LTE interface to use    [env: DEVICE_IFID]
//!   --lpac-bin <PATH>      lpac binary to launch   [env: LPAC_BIN]
//! ```
//!
//! `lpac-ros driver apdu list` prints the usable LTE interfaces instead of
//! launching lpac.
//!
//! # Architecture overview
//!
//! ```text
//! lpac (LPAC_APDU=stdio)
//!       ↕  JSON lines over stdin/stdout
//! lpac-ros  ← this process
//!   domain/          BridgeConfig
//!   application/     APDU dispatch, interface discovery
//!   infrastructure/
//!     routeros/      RouterOS API client
//!     modem/         AT commands through /interface/lte/at-chat
//!     driver_process/ locate and launch lpac
//!       ↕  RouterOS API over TCP, port 8728
//! RouterOS router → LTE modem → eUICC
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lpac_ros::application::{discover, interface_listing, ApduBridge};
use lpac_ros::domain::config::DEFAULT_API_PORT;
use lpac_ros::domain::BridgeConfig;
use lpac_ros::infrastructure::{resolve_driver_binary, spawn_driver, RouterOsClient, RouterOsModem};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// lpac APDU driver bridge for modems behind a RouterOS router.
#[derive(Debug, Parser)]
#[command(
    name = "lpac-ros",
    about = "Run lpac against a modem SIM reachable through the RouterOS API",
    version
)]
struct Cli {
    /// Hostname or IP address of the RouterOS router.
    #[arg(long, default_value = "192.168.88.1", env = "ROS_IP")]
    router_host: String,

    /// RouterOS API port.
    #[arg(long, default_value_t = DEFAULT_API_PORT, env = "ROS_API_PORT")]
    router_port: u16,

    /// RouterOS user name.
    #[arg(long, default_value = "admin", env = "ROS_LOGIN")]
    login: String,

    /// RouterOS password.
    #[arg(long, default_value = "", env = "ROS_PASSWORD", hide_env_values = true)]
    password: String,

    /// LTE interface id (e.g. `lte1`).  Defaults to the first usable one.
    #[arg(long, env = "DEVICE_IFID")]
    interface: Option<String>,

    /// Path of the lpac binary to launch.
    #[arg(long, env = "LPAC_BIN")]
    lpac_bin: Option<PathBuf>,

    /// Arguments passed to lpac, e.g. `chip info`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    lpac_args: Vec<String>,
}

impl Cli {
    fn into_bridge_config(self) -> BridgeConfig {
        BridgeConfig {
            router_host: self.router_host,
            router_port: self.router_port,
            login: self.login,
            password: self.password,
            interface: self.interface.filter(|id| !id.is_empty()),
            lpac_bin: self.lpac_bin,
            lpac_args: self.lpac_args,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // stdout carries lpac's output, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Cli::parse().into_bridge_config();

    if config.lpac_args.is_empty() {
        println!("Usage: lpac-ros [OPTIONS] <original lpac command>");
        return Ok(ExitCode::from(1));
    }

    run(config).await
}

async fn run(config: BridgeConfig) -> anyhow::Result<ExitCode> {
    let router_addr = config.router_addr();

    let mut client = RouterOsClient::connect(&router_addr)
        .await
        .with_context(|| format!("failed to connect to RouterOS at {router_addr}"))?;
    client
        .login(&config.login, &config.password)
        .await
        .with_context(|| format!("failed to log in to RouterOS as {}", config.login))?;

    let interfaces = discover(&mut client)
        .await
        .context("failed to discover modem interfaces")?;
    let Some(first) = interfaces.first() else {
        anyhow::bail!("no interfaces available for at-chat");
    };

    if config.is_interface_listing() {
        println!("{}", interface_listing(&interfaces, &router_addr)?);
        return Ok(ExitCode::SUCCESS);
    }

    let interface = config.interface.clone().unwrap_or_else(|| first.id.clone());
    let modem = RouterOsModem::new(client, interface);
    info!("using modem interface {}", modem.interface());

    let argv0 = std::env::args_os().next().map(PathBuf::from);
    let workdir = std::env::current_dir().context("failed to read working directory")?;
    let path_var: Option<OsString> = std::env::var_os("PATH");
    let bin = resolve_driver_binary(
        config.lpac_bin.as_deref(),
        argv0.as_deref().and_then(Path::file_name),
        &workdir,
        path_var.as_deref(),
    )?;

    let mut child = spawn_driver(&bin, &config.lpac_args)
        .with_context(|| format!("failed to launch {}", bin.display()))?;
    let to_host = child.stdin.take().context("lpac stdin is not piped")?;
    let from_host = child.stdout.take().context("lpac stdout is not piped")?;

    // A fatal error returns here; dropping `child` kills lpac.
    ApduBridge::new(modem)
        .run(BufReader::new(from_host), to_host, tokio::io::stdout())
        .await
        .context("APDU bridge stopped")?;

    let status = child.wait().await.context("failed to wait for lpac")?;
    info!("lpac exited with {status}");

    Ok(status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
