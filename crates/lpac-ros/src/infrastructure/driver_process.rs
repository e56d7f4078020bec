//! Locating and launching the lpac driver host.
//!
//! The bridge is often installed *as* `lpac`, with the real binary renamed to
//! `lpac.orig` next to it, so that tools which call `lpac` get the bridge
//! transparently.  Otherwise the real binary is looked up on `PATH` and in the
//! working directory.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::debug;

/// Environment variable that switches lpac's APDU driver to stdio.
pub const APDU_DRIVER_VAR: &str = "LPAC_APDU";
pub const APDU_DRIVER_STDIO: &str = "stdio";

#[cfg(windows)]
const LPAC: &str = "lpac.exe";
#[cfg(not(windows))]
const LPAC: &str = "lpac";

#[cfg(windows)]
const LPAC_ORIG: &str = "lpac.orig.exe";
#[cfg(not(windows))]
const LPAC_ORIG: &str = "lpac.orig";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriverBinaryError {
    #[error("{0} not found; copy the original lpac binary there")]
    MissingRenamedOriginal(PathBuf),

    #[error("{0} not found; download lpac and put it next to this program")]
    Missing(PathBuf),

    #[error("configured lpac binary {0} does not exist")]
    MissingExplicit(PathBuf),
}

/// Picks the lpac binary to launch.
///
/// - `explicit`  – a configured path, used as-is when it exists.
/// - `own_name`  – file name of the running executable.
/// - `workdir`   – directory relative lookups start from.
/// - `path_var`  – value of `PATH`, if any.
///
/// # Errors
///
/// Returns a [`DriverBinaryError`] naming the file that was expected.
pub fn resolve_driver_binary(
    explicit: Option<&Path>,
    own_name: Option<&OsStr>,
    workdir: &Path,
    path_var: Option<&OsStr>,
) -> Result<PathBuf, DriverBinaryError> {
    if let Some(bin) = explicit {
        return if bin.exists() {
            Ok(bin.to_path_buf())
        } else {
            Err(DriverBinaryError::MissingExplicit(bin.to_path_buf()))
        };
    }

    if own_name == Some(OsStr::new(LPAC)) {
        let orig = workdir.join(LPAC_ORIG);
        return if orig.is_file() {
            Ok(orig)
        } else {
            Err(DriverBinaryError::MissingRenamedOriginal(orig))
        };
    }

    #[cfg(not(windows))]
    if let Some(found) = path_var.and_then(|p| find_on_path(p, LPAC)) {
        return Ok(found);
    }
    #[cfg(windows)]
    let _ = path_var;

    let local = workdir.join(LPAC);
    if local.is_file() {
        Ok(local)
    } else {
        Err(DriverBinaryError::Missing(local))
    }
}

#[cfg(not(windows))]
fn find_on_path(path_var: &OsStr, name: &str) -> Option<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| {
            candidate
                .metadata()
                .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        })
}

/// Launches lpac with `args` and its APDU driver set to stdio.
///
/// The child inherits the environment and stderr; stdin and stdout are piped
/// to the bridge.  Dropping the returned [`Child`] kills the process.
///
/// # Errors
///
/// Returns the OS error if the process cannot be started.
pub fn spawn_driver(bin: &Path, args: &[String]) -> std::io::Result<Child> {
    debug!("launching {} {}", bin.display(), args.join(" "));

    Command::new(bin)
        .args(args)
        .env(APDU_DRIVER_VAR, APDU_DRIVER_STDIO)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
