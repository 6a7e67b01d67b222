mod connection;
mod events;
mod state;
mod supervisor;

pub use connection::{Connection, Subscriber};
pub use state::{ConnectionState, Event};
