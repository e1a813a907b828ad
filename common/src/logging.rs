use chrono::{Datelike, Local, Timelike};
use log::Record;
use std::fmt::{Arguments, Write};
use thiserror::Error;

pub const DEFAULT_FORMAT: &str = "[$Y-$m-$D $H:$M:$S $LEVEL] $MESSAGE";

#[derive(Error, Debug)]
pub enum LogError {
    #[error("IO Error.")]
    IOError(#[from] std::io::Error),

    #[error("Logger initialization error.")]
    SetLoggerError(log::SetLoggerError),
}

impl LogError {
    pub fn additional_info(&self) -> Option<String> {
        match self {
            LogError::IOError(err) => Some(err.to_string()),
            LogError::SetLoggerError(err) => Some(err.to_string()),
        }
    }
}

pub fn generate_file_name(title: &str) -> String {
    let now = Local::now();
    let date = format!(
        "{year:04}-{month:02}-{day:02}",
        year = now.year(),
        month = now.month(),
        day = now.day(),
    );

    let title_formatted = title.trim().replace(" ", "-");
    format!("{title_formatted}_{date}.log")
}

// Longer tokens first, `$MESSAGE` must not be read as `$M`.
const TOKENS: [&str; 9] = [
    "$MESSAGE", "$LEVEL", "$TARGET", "$Y", "$m", "$D", "$H", "$M", "$S",
];

/// Expands format tokens in a single pass, so text coming from the message is never
/// expanded itself. Unknown `$` sequences are kept as is.
pub fn parse_format(format: &str, message: &Arguments, record: &Record) -> String {
    let time = Local::now();
    let mut log = String::with_capacity(format.len() + 64);

    let mut rest = format.trim();
    while let Some(position) = rest.find('$') {
        log.push_str(&rest[..position]);
        let tail = &rest[position..];

        let Some(token) = TOKENS.iter().find(|token| tail.starts_with(**token)) else {
            log.push('$');
            rest = &tail[1..];
            continue;
        };
        let _ = match *token {
            "$MESSAGE" => write!(log, "{}", message),
            "$LEVEL" => write!(log, "{}", record.level().as_str()),
            "$TARGET" => write!(log, "{}", record.target()),
            "$Y" => write!(log, "{:0>2}", time.year()),
            "$m" => write!(log, "{:0>2}", time.month()),
            "$D" => write!(log, "{:0>2}", time.day()),
            "$H" => write!(log, "{:0>2}", time.hour()),
            "$M" => write!(log, "{:0>2}", time.minute()),
            _ => write!(log, "{:0>2}", time.second()),
        };
        rest = &tail[token.len()..];
    }
    log.push_str(rest);

    log
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format_substitutes_level_target_and_message() {
        let record = Record::builder()
            .level(log::Level::Warn)
            .target("stap::replay")
            .build();

        let formatted = parse_format(
            " $LEVEL $TARGET: $MESSAGE ",
            &format_args!("{} frames", 3),
            &record,
        );

        assert_eq!(formatted, "WARN stap::replay: 3 frames");
    }

    #[test]
    fn test_parse_format_leaves_message_text_alone() {
        let record = Record::builder().level(log::Level::Info).build();

        let formatted = parse_format(
            "$LEVEL $MESSAGE",
            &format_args!("price $5, $Y and $MESSAGE stay"),
            &record,
        );

        assert_eq!(formatted, "INFO price $5, $Y and $MESSAGE stay");
    }

    #[test]
    fn test_parse_format_expands_time() {
        let record = Record::builder().level(log::Level::Debug).build();

        let formatted = parse_format("[$Y-$m-$D $H:$M:$S] $X", &format_args!(""), &record);

        let year = Local::now().year().to_string();
        assert!(formatted.starts_with(&format!("[{year}-")));
        assert!(formatted.ends_with("] $X"));
        assert_eq!(formatted.len(), "[yyyy-mm-dd hh:mm:ss] $X".len());
    }

    #[test]
    fn test_generate_file_name() {
        let name = generate_file_name(" STAP CLIENT ");

        assert!(name.starts_with("STAP-CLIENT_"));
        assert!(name.ends_with(".log"));
    }
}
