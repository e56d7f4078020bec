//! Modem attachment points exposed by the router.

use serde::{Deserialize, Serialize};

/// One LTE interface that answers AT chat.
///
/// Serialized for the driver host's interface listing as
/// `{"env":"lte1","name":"lte1 at usb1-1"}`; the bus location only feeds the
/// display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemInterface {
    /// Interface name used as `.id` in RouterOS commands.
    #[serde(rename = "env")]
    pub id: String,
    #[serde(skip)]
    pub bus: String,
    pub name: String,
}

impl ModemInterface {
    /// Builds an interface whose display name is `"<id> at <bus>"`.
    pub fn new(id: impl Into<String>, bus: impl Into<String>) -> Self {
        let id = id.into();
        let bus = bus.into();
        let name = format!("{id} at {bus}");
        Self { id, bus, name }
    }
}
