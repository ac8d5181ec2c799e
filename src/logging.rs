use std::io;

use log::LevelFilter;

use crate::constants::defaults;

/// Initializes the fern logger: records go to stderr,
/// and to the log file if it can be opened.
pub fn init(verbose: bool) -> Result<(), fern::InitError> {
    let level = match verbose {
        true => LevelFilter::Debug,
        false => LevelFilter::Info,
    };

    let mut logger = fern::Dispatch::new()
        .level(level)
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} prov-rs{}] {}",
                record.level(),
                match (record.file(), record.line()) {
                    (Some(file), Some(line)) if record.level() >= log::Level::Debug => {
                        format!(":{}:{}", file, line)
                    }
                    _ => "".into(),
                },
                message
            ))
        })
        .chain(io::stderr());

    match fern::log_file(defaults::LOG_FILE) {
        Ok(log) => logger = logger.chain(log),
        Err(why) => {
            eprintln!(
                "failed to create log file at {}: {}",
                defaults::LOG_FILE,
                why
            );
        }
    };

    logger.apply()?;

    Ok(())
}
