mod atomic_cell;
mod rand;
mod subject;

pub use atomic_cell::AtomicCell;
pub use rand::{inbox_token, jitter, shuffle};
pub use subject::validate_subject;
