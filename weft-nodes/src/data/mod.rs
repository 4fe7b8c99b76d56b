//! Data-path components: shaping, enriching, and inspecting payloads.

pub mod array_get;
pub mod debug;
pub mod group_by;
pub mod inject;
pub mod modify;
pub mod split;

pub use array_get::ArrayGet;
pub use debug::DebugSink;
pub use group_by::GroupBy;
pub use inject::Inject;
pub use modify::Modify;
pub use split::Split;
