//! Modem interface discovery and the `driver apdu list` answer.
//!
//! An LTE interface is usable when it is running, RouterOS reports that it
//! supports `at-chat`, and the modem answers a bare `AT` with `OK`.

use serde::Serialize;
use tracing::{debug, info};

use lpac_ros_core::domain::at;
use lpac_ros_core::protocol::envelope::LPA_TYPE;
use lpac_ros_core::{ApiCommand, Envelope, ModemInterface};

use crate::application::bridge_service::ModemError;
use crate::infrastructure::modem::at_chat;
use crate::infrastructure::routeros::{RouterApi, RouterOsError};

pub const LTE_PRINT: &str = "/interface/lte/print";
pub const LTE_CAPABILITIES: &str = "/interface/lte/show-capabilities";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to query LTE interfaces: {0}")]
    RouterOs(#[from] RouterOsError),

    #[error("failed to probe modem: {0}")]
    Modem(#[from] ModemError),
}

/// Lists the LTE interfaces that accept AT commands, in router order.
///
/// # Errors
///
/// Any failed query aborts discovery; startup cannot continue without it.
pub async fn discover<A: RouterApi>(api: &mut A) -> Result<Vec<ModemInterface>, DiscoveryError> {
    let mut found = Vec::new();

    for lte in api.run(ApiCommand::new(LTE_PRINT)).await? {
        let Some(name) = lte.get("name") else {
            continue;
        };
        if lte.get("running") != Some("true") {
            debug!("skipping {name}: not running");
            continue;
        }

        let caps = api
            .run(ApiCommand::new(LTE_CAPABILITIES).with(".id", name))
            .await?;
        let Some(caps) = caps.first() else {
            debug!("skipping {name}: no capabilities reported");
            continue;
        };
        if caps.get("at-chat") != Some("true") {
            debug!("skipping {name}: at-chat not supported");
            continue;
        }

        if at_chat(&mut *api, name, at::PROBE).await? != "OK" {
            debug!("skipping {name}: modem did not answer AT");
            continue;
        }

        let bus = caps.get("modem-bus-location").unwrap_or_default();
        info!("found modem interface {name} at {bus}");
        found.push(ModemInterface::new(name, bus));
    }

    Ok(found)
}

#[derive(Serialize)]
struct ListingPayload<'a> {
    data: &'a [ModemInterface],
    env: &'a str,
}

/// Renders the `driver apdu list` answer as one JSON line (no terminator).
///
/// `router_addr` is reported as the payload's `env`.
pub fn interface_listing(
    interfaces: &[ModemInterface],
    router_addr: &str,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope {
        kind: LPA_TYPE.to_owned(),
        payload: ListingPayload {
            data: interfaces,
            env: router_addr,
        },
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
