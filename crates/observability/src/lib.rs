//! Process-wide logging setup shared by the storefront binaries.

pub mod logging;

/// Initialize process-wide tracing with the `info` default filter.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    logging::init(logging::DEFAULT_FILTER);
}
