use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use log::{error, info, LevelFilter};
use rust_jfif_decoder::{
    bmp::BMPEncoder,
    image::{Bitmap, ImageDecoder, ImageEncoder},
    jpeg::JPEGDecoder,
    ppm::PPMEncoder,
    Result,
};

#[derive(Parser)]
struct Opt {
    /// Input JPEG file
    input: PathBuf,

    /// Output image file, written as BMP unless it ends in .ppm or .pgm
    output: PathBuf,

    /// Also print debug messages
    #[clap(long)]
    verbose: bool,
}

fn save_image(bitmap: &Bitmap, path: &Path) -> Result<()> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("ppm") | Some("pgm") => PPMEncoder::new(bitmap).encode_to_file(path),
        _ => BMPEncoder::new(bitmap).encode_to_file(path),
    }
}

fn run(opt: &Opt) -> Result<()> {
    let data = std::fs::read(&opt.input)?;
    let bitmap = JPEGDecoder::new(&data).decode()?;
    save_image(&bitmap, &opt.output)?;
    info!("Wrote {}", opt.output.display());
    Ok(())
}

fn main() -> ExitCode {
    let opt = Opt::parse();
    if let Ok(()) = log::set_logger(&LOGGER) {
        log::set_max_level(if opt.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        });
    }

    match run(&opt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Failed to convert {}: {}", opt.input.display(), err);
            ExitCode::FAILURE
        }
    }
}

/// A simple stderr logger.
static LOGGER: SimpleLogger = SimpleLogger;
struct SimpleLogger;
impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let target = record.module_path().unwrap_or_else(|| record.target());
            match record.level() {
                log::Level::Error => eprintln!("Error: {}", record.args()),
                log::Level::Warn => eprintln!("Warning (in {}): {}", target, record.args()),
                level => eprintln!("{} (in {}): {}", level, target, record.args()),
            }
        }
    }

    fn flush(&self) {}
}
