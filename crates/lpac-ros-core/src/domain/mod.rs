//! Domain layer: AT grammar, session state and modem interface descriptions.
//!
//! Nothing in here performs I/O.  The binary crate owns the RouterOS
//! connection and feeds modem replies into these types.

pub mod at;
pub mod interface;
pub mod session;

pub use at::{extract_channel, extract_data, ExtractError};
pub use interface::ModemInterface;
pub use session::{Session, UNSET_CHANNEL};
