pub mod batch;
pub mod driver;
pub mod encoder;
pub mod error;
pub mod router;
pub mod session;

#[cfg(test)]
mod tests;

pub use error::CopyError;
pub use session::{CopySession, CopySummary, RowSource, SessionParams, run};
