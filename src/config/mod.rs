mod enums;
mod options;

pub use enums::{DiscardPolicy, TlsMode};
pub use options::Options;
