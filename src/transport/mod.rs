mod tls;
mod transport;

pub use tls::build_tls_connector;
pub use transport::Transport;
