pub mod analysis;
pub mod infra;
pub mod pipeline;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod workflows;
