mod endpoint;
mod reconnect_buffer;
mod reconnector;

pub use endpoint::{Endpoint, EndpointPool, Scheme};
pub use reconnect_buffer::ReconnectBuffer;
pub use reconnector::{Reconnector, ReconnectorState};
