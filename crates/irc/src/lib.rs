//! IRC protocol session used as the delivery side of the bridge.

pub mod message;
pub mod numerics;
pub mod session;
pub mod transport;

mod connection;

pub use message::Message;
pub use session::IrcSession;
