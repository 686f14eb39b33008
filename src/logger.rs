use slog::Drain;
use slog_atomic::{AtomicSwitch, AtomicSwitchCtrl};
use slog_term::{CompactFormat, TermDecorator};
use std::io;
use std::sync::Mutex;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use slog::*;

const TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");

/// Logs go to stderr so stdout only carries the deposit data
pub struct Logger {
    pub log_level: Mutex<u8>,
    logger: slog::Logger,
    ctrl: AtomicSwitchCtrl,
}

fn timestamp(w: &mut dyn io::Write) -> io::Result<()> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    write!(w, "{}", now.format(TIMESTAMP).map_err(io::Error::other)?)
}

fn new_drain(level: Level) -> Fuse<Mutex<Fuse<LevelFilter<CompactFormat<TermDecorator>>>>> {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::CompactFormat::new(decorator)
        .use_custom_timestamp(timestamp)
        .build()
        .filter_level(level)
        .fuse();
    Mutex::new(drain).fuse()
}

fn level_from(log_level: u8) -> Level {
    match log_level {
        0 => Level::Critical,
        1 => Level::Error,
        2 => Level::Warning,
        3 => Level::Info,
        4 => Level::Debug,
        _ => Level::Trace,
    }
}

fn drain_from_log_level(log_level: u8) -> AtomicSwitch {
    AtomicSwitch::new(new_drain(level_from(log_level)))
}

impl Logger {
    pub fn new(log_level: u8) -> Self {
        let drain = drain_from_log_level(log_level);
        let logger = slog::Logger::root(
            drain.clone(),
            slog::o!("version" => env!("CARGO_PKG_VERSION")),
        );
        Logger {
            log_level: Mutex::new(log_level),
            logger,
            ctrl: drain.ctrl(),
        }
    }

    pub fn set_global(&self) -> eyre::Result<&Self> {
        // slog_stdlog uses the logger from slog_scope, so set a logger there
        let guard = slog_scope::set_global_logger(self.logger.clone());
        // https://github.com/slog-rs/slog/issues/249
        guard.cancel_reset();
        slog_stdlog::init()?;
        Ok(self)
    }

    pub fn set_log_level(&self, log_level: u8) -> &Self {
        self.ctrl.set(drain_from_log_level(log_level));
        if let Ok(mut ll) = self.log_level.lock() {
            *ll = log_level;
        }
        self
    }
}
