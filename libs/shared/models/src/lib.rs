pub mod appointment;
pub mod error;
pub mod messaging;

pub use appointment::*;
pub use error::*;
pub use messaging::*;
