//! Test-only helpers shared across the workspace: a once-only tracing
//! subscriber installer, and a handful of fixed test vectors.

use std::sync::Once;

pub mod vectors;

static INIT: Once = Once::new();

/// Install a tracing subscriber suitable for test output, exactly once per
/// process. Call this at the top of every test that logs or that exercises
/// code which does.
pub fn init() {
    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::Layer::default();
        use tracing_subscriber::layer::SubscriberExt;
        let subscriber = tracing_subscriber::Registry::default()
            .with(fmt_layer)
            .with(tracing_error::ErrorLayer::default());
        tracing::subscriber::set_global_default(subscriber)
            .expect("setting the global tracing subscriber should only happen once");

        color_eyre::install().expect("color_eyre should only be installed once");
    });
}
