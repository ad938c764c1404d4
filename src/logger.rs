use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    ParseLevel(#[from] log::ParseLevelError),
    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}

pub fn setup(is_debug: bool) -> Result<(), Error> {
    let default_level = if is_debug {
        log::Level::Debug
    } else {
        log::Level::Info
    };

    let level_filter = std::env::var("RUST_LOG")
        .ok()
        .as_deref()
        .map(str::parse::<log::Level>)
        .transpose()?
        .unwrap_or(default_level)
        .to_level_filter();

    let mut io_sink = fern::Dispatch::new().format(|out, message, record| {
        out.finish(format_args!(
            "{}:{} -- {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            message
        ));
    });

    if is_debug {
        io_sink = io_sink.chain(std::io::stdout());
    } else {
        io_sink = io_sink.chain(fern::log_file(log_path())?);
    }

    fern::Dispatch::new()
        .level(log::LevelFilter::Off)
        .level_for("iced_wgpu", log::LevelFilter::Info)
        .level_for("candlepad_data", level_filter)
        .level_for("candlepad_exchange", level_filter)
        .level_for("candlepad", level_filter)
        .chain(io_sink)
        .apply()?;

    Ok(())
}

fn log_path() -> PathBuf {
    std::env::var("CANDLEPAD_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("candlepad.log"))
}
