pub mod connection;
pub mod error;
pub mod ledger;
pub mod presence;
pub mod relay;

pub use error::RelayError;
pub use ledger::{Ledger, ProfileDirectory};
pub use presence::{ConnectionHandle, DeliveryStatus, PresenceTable};
pub use relay::{Relay, SendReport};
