use std::io::{IsTerminal, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::logger::{GroupEvent, get_group_event};
use crate::prelude::*;
use console::{Style, style};
use indicatif::{ProgressBar, ProgressStyle};
use lazy_static::lazy_static;
use log::{Level, LevelFilter, Log, Metadata, Record};
use simplelog::{CombinedLogger, SharedLogger};

pub const PROCGRAPH_U8_COLOR_CODE: u8 = 41; // #00D7AF

const LOG_LEVEL_ENV: &str = "PROCGRAPH_LOG";

lazy_static! {
    /// Spinner of the group in progress. Only ever set when stdout is a terminal.
    static ref GROUP_SPINNER: Mutex<Option<ProgressBar>> = Mutex::new(None);
    static ref IS_TTY: bool = std::io::stdout().is_terminal();
}

fn group_spinner() -> MutexGuard<'static, Option<ProgressBar>> {
    GROUP_SPINNER.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Level named by `PROCGRAPH_LOG`, `info` when unset or not a level name.
fn level_from_env(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|level| level.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

fn new_spinner(name: &str) -> Option<ProgressBar> {
    let template = format!(
        "  {{spinner:>.{PROCGRAPH_U8_COLOR_CODE}}} {{wide_msg:.{PROCGRAPH_U8_COLOR_CODE}.bold}}"
    );
    let style = ProgressStyle::with_template(&template).ok()?;
    let spinner = ProgressBar::new_spinner()
        .with_style(style)
        .with_message(format!("{name}..."));
    spinner.enable_steady_tick(Duration::from_millis(100));
    Some(spinner)
}

/// Text of a record, with the target shown for debug and trace output.
fn record_line(record: &Record) -> String {
    match record.level() {
        Level::Error | Level::Warn | Level::Info => record.args().to_string(),
        level => format!("[{level}::{}] {}", record.target(), record.args()),
    }
}

fn print_record(record: &Record) {
    let line = record_line(record);
    match record.level() {
        Level::Error => eprintln!("{}", Style::new().red().apply_to(line)),
        Level::Warn => eprintln!("{}", Style::new().yellow().apply_to(line)),
        Level::Info => println!("{}", Style::new().white().apply_to(line)),
        Level::Debug => println!("{}", Style::new().blue().dim().apply_to(line)),
        Level::Trace => println!("{}", Style::new().black().dim().apply_to(line)),
    }
}

/// Console logger. Log groups print a header, then a spinner on a terminal.
pub struct LocalLogger {
    level: LevelFilter,
}

impl LocalLogger {
    fn from_env() -> Self {
        Self {
            level: level_from_env(std::env::var(LOG_LEVEL_ENV).ok().as_deref()),
        }
    }

    fn start_group(name: &str) {
        println!(
            "\n{}",
            style(format!("►►► {name} "))
                .bold()
                .color256(PROCGRAPH_U8_COLOR_CODE)
        );
        if !*IS_TTY {
            println!("{name}...");
            return;
        }
        if let Some(spinner) = new_spinner(name) {
            if let Some(previous) = group_spinner().replace(spinner) {
                previous.finish_and_clear();
            }
        }
    }
}

impl Log for LocalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        match get_group_event(record) {
            Some(GroupEvent::Start(name)) => Self::start_group(&name),
            Some(GroupEvent::End) => clean_logger(),
            None => match group_spinner().as_ref() {
                Some(spinner) => spinner.suspend(|| print_record(record)),
                None => print_record(record),
            },
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

impl SharedLogger for LocalLogger {
    fn level(&self) -> LevelFilter {
        self.level
    }

    fn config(&self) -> Option<&simplelog::Config> {
        None
    }

    fn as_log(self: Box<Self>) -> Box<dyn Log> {
        Box::new(*self)
    }
}

pub fn init_local_logger() -> Result<()> {
    CombinedLogger::init(vec![Box::new(LocalLogger::from_env())])?;
    Ok(())
}

/// Stop and clear the spinner of the current group, if any
pub fn clean_logger() {
    if let Some(spinner) = group_spinner().take() {
        spinner.finish_and_clear();
    }
}
