#![allow(dead_code)] // Each test binary uses a different subset of helpers

pub mod builders;
pub mod strategies;

pub use builders::*;

/// Initialize logging once for integration tests
pub fn init_test_logging() {
    std::env::set_var("PROFILER_ENV", "test");
    session_profiler::logging::init_structured_logging();
}
