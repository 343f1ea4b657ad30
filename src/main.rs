use clap::{error::ErrorKind, Parser, Subcommand};
use apkg::archive::{self, ArchiveListing, PackOptions};
use apkg::FormatVersion;
use apkg::ir;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "apkg", version, about = "Encrypted audio package tool")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug).  RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack audio files (.wav, .aif, .aiff, .irp) into an encrypted package
    Pack {
        output:   PathBuf,
        password: String,
        #[arg(required = true, num_args = 1..)]
        inputs:   Vec<PathBuf>,
        /// Write format v1 (shared nonce) for readers that predate v2
        #[arg(long)]
        legacy:   bool,
    },
    /// Unpack an encrypted package into a directory
    Unpack {
        input:      PathBuf,
        output_dir: PathBuf,
        password:   String,
    },
    /// Convert an audio file into a normalised impulse response (.irp)
    Convert {
        input:    PathBuf,
        output:   PathBuf,
        /// Accepted for command-line compatibility; the .irp file is not encrypted.
        password: String,
    },
    /// List package contents without decrypting
    List {
        input: PathBuf,
        /// Print the listing as JSON
        #[arg(long)]
        json:  bool,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, password, inputs, legacy } => {
            let opts = PackOptions {
                format: if legacy { FormatVersion::V1 } else { FormatVersion::CURRENT },
                ..PackOptions::default()
            };
            let report = archive::pack_with_options(&inputs, &output, &password, &opts)
                .map_err(|e| format!("failed to pack files: {e}"))?;
            for entry in &report.entries {
                println!("  packed  {}", entry.name);
            }
            for skip in &report.skipped {
                println!("  skipped {} ({:?})", skip.path.display(), skip.reason);
            }
            println!("Successfully packed files to: {}", output.display());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir, password } => {
            archive::unpack(&input, &output_dir, &password)
                .map_err(|e| format!("failed to unpack files: {e}"))?;
            println!("Successfully unpacked files to: {}", output_dir.display());
        }

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { input, output, password: _ } => {
            ir::convert(&input, &output)
                .map_err(|e| format!("failed to convert audio file: {e}"))?;
            println!("Successfully converted to IR: {}", output.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let listing = archive::list(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print_listing(&input, &listing);
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_listing(path: &Path, listing: &ArchiveListing) {
    println!("Package: {}  (format v{}, {} files)", path.display(), listing.version, listing.num_files);
    println!("Salt:    {}", listing.salt);
    println!("{:<32} {:>5} {:>12} {:>12}  {:>8}  Offset",
             "Name", "Type", "Size", "Sealed", "CRC32");
    for e in &listing.entries {
        println!("{:<32} {:>5} {:>12} {:>12}  {:08x}  {}",
            e.name, e.file_type.name(), e.original_size, e.compressed_size, e.crc32, e.offset);
    }
}
