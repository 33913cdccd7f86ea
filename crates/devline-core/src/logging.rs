//! Logging setup with indicatif integration

use indicatif::MultiProgress;

/// ANSI color and padded label for a log level.
fn level_tag(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// Short module name for debug output: `devline_deviantart::crawl::snowball` → `snowball`
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

/// Logger that prints above indicatif bars so log lines don't tear them.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
    with_target: bool,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress, with_target: bool) -> Self {
        Self {
            inner,
            multi,
            with_target,
        }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        let (pre, label, post) = level_tag(record.level(), true);
        let line = if self.with_target {
            format!(
                "[{pre}{label}{post}] \x1b[2m{}\x1b[0m {}",
                short_target(record.target()),
                record.args()
            )
        } else {
            format!("[{pre}{label}{post}] {}", record.args())
        };
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize logging; pass `multi` in TTY mode to route through progress bars.
///
/// `RUST_LOG` overrides the level picked from `quiet`/`debug`.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let env = env_logger::Env::default().default_filter_or(default_level);

    if let Some(multi) = multi {
        let logger = env_logger::Builder::from_env(env).build();
        let max_level = logger.filter();
        let boxed = Box::new(IndicatifLogger::new(logger, multi.clone(), debug));
        if log::set_boxed_logger(boxed).is_ok() {
            log::set_max_level(max_level);
        }
    } else {
        // Non-TTY: no colors, timestamp for log files
        let _ = env_logger::Builder::from_env(env)
            .format(move |buf, record| {
                let (_, label, _) = level_tag(record.level(), false);
                let ts = buf.timestamp_seconds();
                if debug {
                    writeln!(
                        buf,
                        "{ts} [{label}] {} {}",
                        short_target(record.target()),
                        record.args()
                    )
                } else {
                    writeln!(buf, "{ts} [{label}] {}", record.args())
                }
            })
            .try_init();
    }
}
