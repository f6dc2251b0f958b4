//! Tracing and logging setup shared by the stockroom binaries.

pub use self::tracing::LogFormat;

/// Initialize process-wide tracing from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init(LogFormat::from_env());
}

/// Tracing configuration (filters, layers).
pub mod tracing;
