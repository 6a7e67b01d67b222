mod inbox;
mod pending_queue;
mod registry;
mod subscription;

pub use inbox::Inbox;
pub use pending_queue::PendingQueue;
pub use registry::{DispatchOutcome, SubscriptionRegistry};
pub use subscription::{Dispatcher, Subscription};
