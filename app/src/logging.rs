use std::sync::OnceLock;

static TRACING: OnceLock<()> = OnceLock::new();

/// Initialize tracing once, safe to call multiple times.
/// `VNODE_LOG` (falling back to `RUST_LOG`) sets the filter,
/// `VNODE_LOG_FORMAT=json` switches to JSON output.
pub fn init_logging() {
    TRACING.get_or_init(|| {
        let filter = std::env::var("VNODE_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".into());
        let fmt_json = std::env::var("VNODE_LOG_FORMAT")
            .ok()
            .is_some_and(|v| v == "json");
        let builder = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_target(false)
            .with_writer(std::io::stderr);
        let _ = if fmt_json {
            builder.json().try_init()
        } else {
            builder.compact().try_init()
        };
    });
}
