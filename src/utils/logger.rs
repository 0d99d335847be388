//! Process-wide log4rs setup: rolling application, audit and metrics files,
//! plus optional routing of `devtrace!` output.

use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

use crate::errors::{RepoError, Result};

pub const AUDIT_TARGET: &str = "searchrepo::audit";
pub const METRICS_TARGET: &str = "searchrepo::metrics";
pub const DEVTRACE_TARGET: &str = "searchrepo::devtrace";

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, name: &str, keep: u32) -> Result<RollingFileAppender> {
    let config_err = |e: &dyn std::fmt::Display| RepoError::Config(format!("log appender '{name}': {e}"));
    let roller = FixedWindowRoller::builder()
        .build(&base.join(format!("{name}.{{}}.log")).display().to_string(), keep)
        .map_err(|e| config_err(&e))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{name}.log")), Box::new(policy))
        .map_err(|e| config_err(&e))
}

/// Configure logging globally for the process.
/// - dir: base directory for log files; current directory when `None`
/// - level: error|warn|info|debug|trace
/// - retention: rolled files to keep (default 7)
/// - devtrace: also persist `devtrace!` output to `devtrace.log`
///
/// # Errors
/// `Config` when the directory or appenders cannot be created, or a logger
/// is already installed for this process.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    devtrace: bool,
) -> Result<()> {
    let base = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&base).map_err(|e| RepoError::Config(format!("log dir {}: {e}", base.display())))?;
    let keep = u32::try_from(retention.unwrap_or(7)).unwrap_or(u32::MAX);
    let lvl = parse_level(level.unwrap_or("info"));

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("audit", Box::new(rolling(&base, "audit", keep)?)))
        .appender(Appender::builder().build("metrics", Box::new(rolling(&base, "metrics", keep)?)))
        .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, lvl))
        .logger(Logger::builder().appender("metrics").additive(false).build(METRICS_TARGET, lvl));

    builder = if devtrace {
        builder
            .appender(Appender::builder().build("devtrace", Box::new(rolling(&base, "devtrace", keep)?)))
            .logger(Logger::builder().appender("devtrace").additive(false).build(DEVTRACE_TARGET, LevelFilter::Trace))
    } else {
        builder.logger(Logger::builder().additive(false).build(DEVTRACE_TARGET, LevelFilter::Off))
    };

    let config = builder
        .build(Root::builder().appender("app").build(lvl))
        .map_err(|e| RepoError::Config(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| RepoError::Config(e.to_string()))?;
    Ok(())
}

/// Configure logging from environment variables if present:
/// - SEARCHREPO_LOG_DIR
/// - SEARCHREPO_LOG_LEVEL
/// - SEARCHREPO_LOG_RETENTION
/// - SEARCHREPO_DEVTRACE (1|true|yes)
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> Result<()> {
    let dir = std::env::var("SEARCHREPO_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("SEARCHREPO_LOG_LEVEL").ok();
    let retention = std::env::var("SEARCHREPO_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    let devtrace = std::env::var("SEARCHREPO_DEVTRACE")
        .is_ok_and(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
    configure_logging(dir.as_deref(), level.as_deref(), retention, devtrace)
}
