pub mod error;
pub mod processor;

pub use error::ProcessError;
pub use processor::{compile, emit, process, Processed};
