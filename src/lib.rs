pub mod api;
pub mod core;

use std::sync::OnceLock;

static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// Installs the log backend once per process; later calls do nothing.
pub fn init_logging() {
    LOGGER_INIT.get_or_init(|| {
        #[cfg(target_os = "android")]
        {
            android_logger::init_once(
                android_logger::Config::default()
                    .with_max_level(log::LevelFilter::Debug)
                    .with_tag("engagement_lib"),
            );
        }

        #[cfg(not(target_os = "android"))]
        {
            // RUST_LOG overrides the default filter
            let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
        }
    });
}
