use crate::config::Config;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

/// Log targets that drown out hub and listener activity below `Trace`.
///
/// Matching is by prefix. Query echo and server `NOTICE`s are muted, but the
/// rest of sqlx stays visible: a dropped `LISTEN` connection is reported from
/// `sqlx_postgres::listener` and must reach the operator.
const NOISY_TARGETS: &[&str] = &[
    "sqlx::query",
    "sqlx::postgres::notice",
    "sea_orm",
    "tungstenite",
    "tokio_tungstenite",
    "hyper",
    "h2",
    "tower_http",
];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger at the configured level.
    pub fn init_logger(config: &Config) {
        let level = config.log_level_filter;

        TermLogger::init(
            level,
            Self::build_log_config(level),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )
        .expect("Failed to start simplelog");
    }

    /// Targets dropped at `level`. `Trace` keeps everything, for chasing a
    /// misbehaving socket or notification down into the dependencies.
    fn muted_targets(level: LevelFilter) -> &'static [&'static str] {
        match level {
            LevelFilter::Trace => &[],
            _ => NOISY_TARGETS,
        }
    }

    fn build_log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();
        // Session and hub debug lines are hard to follow without their origin
        builder.set_location_level(LevelFilter::Debug);

        for target in Self::muted_targets(level) {
            builder.add_filter_ignore_str(target);
        }

        builder.build()
    }

    #[cfg(test)]
    fn is_muted(target: &str, level: LevelFilter) -> bool {
        Self::muted_targets(level)
            .iter()
            .any(|muted| target.starts_with(muted))
    }
}
