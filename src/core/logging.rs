use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sets up logging to stdout. Filter with `RUST_LOG`, by default this
/// crate and request traces are logged at debug level.
pub fn init() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // axum logs rejections from built-in extractors with the `axum::rejection`
                // target, at `TRACE` level. `axum::rejection=trace` enables showing those events
                format! {
                    "{}=debug,tower_http=debug,axum::rejection=trace",
                    env!("CARGO_CRATE_NAME")
                }
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }
}
