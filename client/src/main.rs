// Project lints
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unsafe_code)]

use crate::config::Config;

fn main() {
    // Reading config
    let config = match Config::from_file() {
        Ok(value) => value,
        Err(err) => {
            let mut message = format!("Config initialization failed. Error: {err}.");
            if let Some(additional_info) = err.additional_info() {
                message.push_str(&format!(" Additional_info: {additional_info}"));
            }
            eprintln!("{}", message);
            std::process::exit(1);
        },
    };

    // Logging setup
    logging::setup(&config).unwrap_or_else(|err| {
        let mut message = format!("Logger initialization failed. Error: {err}.");
        if let Some(additional_info) = err.additional_info() {
            message.push_str(&format!(" Additional_info: {additional_info}"));
        }
        eprintln!("{}", message);
        std::process::exit(1);
    });

    log::info!("Starting...");
    log::debug!("Config loaded: {:#?}", config);

    core::start(config).unwrap_or_else(|err| {
        let mut message = format!("{err}");
        if let Some(additional_info) = err.additional_info() {
            message.push_str(&format!(" Additional_info: {additional_info}"));
        }
        log::error!("{}", message);
        std::process::exit(1);
    });
}

mod batch;
mod capture;
mod config;
mod core;
mod logging;
mod queue;
mod stats;
mod upload;
