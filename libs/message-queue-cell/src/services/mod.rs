pub mod queue;
pub mod memory;

pub use queue::*;
pub use memory::*;
