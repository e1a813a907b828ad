use crate::config::{self, Config};
use common::io::FileKind;
use common::logging::LogError;
use log::LevelFilter;

const LOG_TITLE: &str = "STAP-CLIENT";

pub fn setup(config: &Config) -> Result<(), LogError> {
    if config.log_level.eq(&LevelFilter::Off) {
        return Ok(());
    }

    let format = config.log_format.clone();
    let mut dispatch = fern::Dispatch::new()
        .level(config.log_level)
        .format(move |out, message, record| {
            let formatted = common::logging::parse_format(&format, message, record);

            out.finish(format_args!("{}", formatted))
        })
        .chain(std::io::stdout());

    if config.log_to_file {
        let file_name = common::logging::generate_file_name(LOG_TITLE);
        let path =
            common::io::get_storage_file_path(config::APPLICATION, &file_name, FileKind::Data)?;
        common::io::create_parent_directories(&path)?;
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply().map_err(LogError::SetLoggerError)
}
