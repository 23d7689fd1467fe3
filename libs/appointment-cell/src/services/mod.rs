pub mod parser;
pub mod reconciler;
pub mod storage;
pub mod job;

pub use parser::*;
pub use reconciler::*;
pub use storage::*;
pub use job::*;
