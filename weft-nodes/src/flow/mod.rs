//! Flow-control components: routing, timing, and pacing of messages.

pub mod delay;
pub mod mixer;
pub mod relay;
pub mod router;
pub mod scheduler;

pub use delay::Delay;
pub use mixer::Mixer;
pub use relay::AsyncRelay;
pub use router::Router;
pub use scheduler::Scheduler;
