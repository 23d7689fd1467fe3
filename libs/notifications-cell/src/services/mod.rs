pub mod batch_builder;
pub mod batches;
pub mod delivery;
pub mod metrics;
pub mod retry;
pub mod send;
pub mod status;

pub use batch_builder::*;
pub use batches::*;
pub use delivery::*;
pub use metrics::*;
pub use retry::*;
pub use send::*;
pub use status::*;
