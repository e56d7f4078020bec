//! Modem command channel backed by `/interface/lte/at-chat`.

use async_trait::async_trait;
use tracing::{debug, warn};

use lpac_ros_core::ApiCommand;

use crate::application::bridge_service::{ModemChannel, ModemError};
use crate::infrastructure::routeros::RouterApi;

/// RouterOS command that passes one AT command to an LTE interface.
pub const AT_CHAT: &str = "/interface/lte/at-chat";

/// Sends `command` to the modem behind `interface` and returns its reply text.
///
/// A failed remote call is logged and yields an empty reply, so the caller
/// sees the same thing as a modem that did not acknowledge.
///
/// # Errors
///
/// - [`ModemError::NoReply`] when the router returns no records.
/// - [`ModemError::EmptyRecord`] when the first record has no fields.
pub async fn at_chat<A>(api: &mut A, interface: &str, command: &str) -> Result<String, ModemError>
where
    A: RouterApi + ?Sized,
{
    let request = ApiCommand::new(AT_CHAT)
        .with(".id", interface)
        .with("input", command);

    let records = match api.run(request).await {
        Ok(records) => records,
        Err(e) => {
            warn!("at-chat {command:?} on {interface} failed: {e}");
            return Ok(String::new());
        }
    };

    let record = records.first().ok_or_else(|| ModemError::NoReply {
        interface: interface.to_owned(),
    })?;

    record
        .get("output")
        .or_else(|| record.first_value())
        .map(str::to_owned)
        .ok_or_else(|| ModemError::EmptyRecord {
            interface: interface.to_owned(),
        })
}

/// [`ModemChannel`] bound to one LTE interface.
pub struct RouterOsModem<A> {
    api: A,
    interface: String,
}

impl<A: RouterApi> RouterOsModem<A> {
    pub fn new(api: A, interface: impl Into<String>) -> Self {
        Self {
            api,
            interface: interface.into(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

#[async_trait]
impl<A: RouterApi> ModemChannel for RouterOsModem<A> {
    async fn send(&mut self, command: &str) -> Result<String, ModemError> {
        debug!("AT> {command}");
        let reply = at_chat(&mut self.api, &self.interface, command).await?;
        debug!("AT< {reply:?}");
        Ok(reply)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
