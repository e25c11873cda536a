pub mod envelope;
pub mod transport;

pub use envelope::{AccountFrame, Commit, Envelope, IdentityFrame, Operation};
pub use transport::{EventDispatcher, FirehoseConsumer};
