use carelog_core::settings::LogSettings;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr so command output stays parseable.
///
/// `RUST_LOG` wins over the configured filter.
pub fn init(settings: &LogSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if settings.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
