//! Process-wide tracing setup for jobforge.

/// Tracing configuration (filters, formatters).
pub mod tracing;

/// Initialize process-wide observability.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize tracing for a test binary, writing through the test harness.
pub fn init_for_tests() {
    tracing::init_for_tests();
}
