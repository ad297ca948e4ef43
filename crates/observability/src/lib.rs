//! Process-wide tracing setup shared by the service binaries.

pub mod tracing;

pub use self::tracing::LogFormat;

/// Install the global subscriber using `RUST_LOG` and `LOG_FORMAT`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    self::tracing::init();
}
