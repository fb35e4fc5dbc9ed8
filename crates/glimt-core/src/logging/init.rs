use std::sync::Once;

/// Default filter: the core's own diagnostics (pool eviction warnings,
/// frame-skip traces) stay visible while wgpu's internal chatter is cut
/// down to warnings.
pub const DEFAULT_FILTER: &str = "glimt_core=info,glimt_wgpu=info,wgpu_core=warn,wgpu_hal=warn";

static INIT: Once = Once::new();

/// Initializes the process-wide logger once; later calls are no-ops.
///
/// Filter precedence: the `RUST_LOG` environment variable, then `filter`,
/// then [`DEFAULT_FILTER`]. Call early in the embedder's `main`.
pub fn init_logging(filter: Option<&str>) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        if let Ok(env) = std::env::var("RUST_LOG") {
            builder.parse_filters(&env);
        } else {
            builder.parse_filters(filter.unwrap_or(DEFAULT_FILTER));
        }
        builder.init();
    });
}

/// Logger for tests: output is captured per test by the harness, and
/// repeated initialization is tolerated so every test can call it.
pub fn init_test_logging() {
    let _ = env_logger::Builder::new()
        .parse_filters("glimt_core=debug")
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_quiets_wgpu_internals() {
        assert!(DEFAULT_FILTER.contains("glimt_core=info"));
        assert!(DEFAULT_FILTER.contains("wgpu_core=warn"));
    }

    #[test]
    fn test_init_tolerates_repeated_calls() {
        init_test_logging();
        init_test_logging();
    }
}
