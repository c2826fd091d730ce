use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use uef_tape::{
    audio::{load_wav, save_wav},
    codec::package_binary,
    demodulation::demodulate,
    modulation::Modulator,
    uef::{write_uef, ChunkReader},
    BitDepth, Config,
};

const DEFAULT_LOAD_ADDRESS: &str = "0x2000";

#[derive(Parser)]
#[command(name = "uef-tape")]
#[command(about = "Convert UEF tape images to and from cassette audio", long_about = None)]
#[command(version)]
struct Cli {
    /// Log every chunk as it is processed
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a UEF image as a WAV recording
    Encode {
        /// The UEF file to convert
        uef: PathBuf,

        /// Output WAV file (defaults to the UEF name with a .wav extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sample rate in Hz
        #[arg(long, default_value = "44100", value_parser = clap::builder::PossibleValuesParser::new(["11025", "22050", "44100"]))]
        frequency: String,

        /// Sample resolution in bits
        #[arg(long, default_value = "16", value_parser = clap::builder::PossibleValuesParser::new(["8", "16"]))]
        bits: String,

        /// Only report chunks and markers, do not write a WAV file
        #[arg(long)]
        norecord: bool,
    },

    /// Recover a UEF image from a 44100 Hz mono WAV recording
    Decode {
        /// The WAV file to convert
        wav: PathBuf,

        /// Output UEF file (defaults to the WAV name with a .uef extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Package a binary as Acorn tape blocks in a UEF image
    Pack {
        /// The binary file to include
        #[arg(long)]
        bin: PathBuf,

        /// The UEF file to write the binary to
        #[arg(long)]
        uef: PathBuf,

        /// Load address of the binary
        #[arg(long, default_value = DEFAULT_LOAD_ADDRESS, value_parser = parse_address)]
        load_addr: u32,

        /// Execution address of the binary (defaults to the load address)
        #[arg(long, value_parser = parse_address)]
        exec_addr: Option<u32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match cli.command {
        Commands::Encode {
            uef,
            output,
            frequency,
            bits,
            norecord,
        } => {
            let config = Config {
                sample_rate: frequency.parse()?,
                bit_depth: BitDepth::from_bits(bits.parse()?)
                    .ok_or_else(|| anyhow::anyhow!("Unsupported bit depth: {}", bits))?,
            };
            let output = output.unwrap_or_else(|| uef.with_extension("wav"));
            encode(&uef, &output, config, norecord)?;
        }

        Commands::Decode { wav, output } => {
            let output = output.unwrap_or_else(|| wav.with_extension("uef"));
            decode(&wav, &output)?;
        }

        Commands::Pack {
            bin,
            uef,
            load_addr,
            exec_addr,
        } => {
            pack(&bin, &uef, load_addr, exec_addr.unwrap_or(load_addr))?;
        }
    }

    Ok(())
}

fn parse_address(value: &str) -> std::result::Result<u32, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .or_else(|| value.strip_prefix('&'))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", value, e))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_ids<'a>(ids: impl IntoIterator<Item = &'a u16>) -> String {
    ids.into_iter()
        .map(|id| format!("&{:04x}", id))
        .collect::<Vec<_>>()
        .join(", ")
}

fn encode(input: &Path, output: &Path, config: Config, norecord: bool) -> Result<()> {
    println!("{}", display_name(input));

    let file = File::open(input).with_context(|| format!("Opening {}", input.display()))?;
    let reader = ChunkReader::new(BufReader::new(file))
        .with_context(|| format!("Reading {}", input.display()))?;
    let mut modulator = Modulator::new(config.clone())?;

    for chunk in reader {
        let recorded = chunk.and_then(|chunk| modulator.record(&chunk));
        if let Err(e) = recorded {
            log::warn!("Stopping early, keeping what was rendered so far: {}", e);
            break;
        }
    }

    let recording = modulator.finish();
    println!(
        "Chunk IDs encountered ... {}",
        format_ids(&recording.encountered)
    );
    println!(
        "Chunk IDs ignored ....... {}",
        format_ids(&recording.diagnostics.ignored)
    );
    println!("Markers:");
    for marker in &recording.markers {
        println!("  {} {}", marker.timestamp(), marker.printable());
    }

    if norecord {
        return Ok(());
    }

    save_wav(output, &recording.samples, &config)
        .with_context(|| format!("Writing {}", output.display()))?;
    eprintln!(
        "Wrote {} samples ({:.1} s) to {}",
        recording.samples.len(),
        recording.samples.len() as f64 / config.sample_rate as f64,
        output.display()
    );

    Ok(())
}

fn decode(input: &Path, output: &Path) -> Result<()> {
    let (samples, config) =
        load_wav(input).with_context(|| format!("Reading {}", input.display()))?;
    eprintln!(
        "Loaded {} samples ({} bit) from {}",
        samples.len(),
        config.bit_depth.bits(),
        display_name(input)
    );

    let (chunks, diagnostics) = demodulate(&samples, &config)?;
    for span in &diagnostics.spans {
        println!(
            "&{:04x} {:>10} .. {:<10} ({} samples)",
            span.id,
            span.start,
            span.end,
            span.len()
        );
    }

    let file = File::create(output).with_context(|| format!("Creating {}", output.display()))?;
    write_uef(BufWriter::new(file), &chunks)?;
    eprintln!("Wrote {} chunks to {}", chunks.len(), output.display());

    Ok(())
}

fn pack(bin: &Path, uef: &Path, load_address: u32, exec_address: u32) -> Result<()> {
    let data = fs::read(bin).with_context(|| format!("Reading {}", bin.display()))?;
    let name = display_name(bin);

    let chunks = package_binary(&name, &data, load_address, exec_address);
    eprintln!(
        "Packaged {} bytes as {} chunks (load &{:04X}, exec &{:04X})",
        data.len(),
        chunks.len(),
        load_address,
        exec_address
    );

    let file = File::create(uef).with_context(|| format!("Creating {}", uef.display()))?;
    write_uef(BufWriter::new(file), &chunks)?;

    Ok(())
}
