mod cmd;
mod output;
mod prompts;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::print_error;

/// socgen - bootloader and FPGA configuration builder for SoC FPGA boot images
#[derive(Parser)]
#[command(name = "socgen")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Generator directory inside the Quartus project
  #[arg(short = 'C', long, global = true, default_value = ".")]
  dir: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

/// Answers for the bootloader decision points when nobody is at the terminal.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct DecisionArgs {
  /// Package a recent existing bootloader build instead of rebuilding
  #[arg(long, conflicts_with = "rebuild")]
  pub reuse: bool,

  /// Always rebuild the bootloader from source
  #[arg(long)]
  pub rebuild: bool,

  /// Open `make menuconfig` before compiling
  #[arg(long)]
  pub menuconfig: bool,

  /// Take the default answer at every prompt
  #[arg(short, long)]
  pub yes: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BitstreamArgs {
  /// Copy an existing configuration file instead of running quartus_cpf
  #[arg(long, value_name = "FILE")]
  pub copy: Option<PathBuf>,

  /// Compiled design to convert instead of the one in output_files/
  #[arg(long, value_name = "FILE", conflicts_with = "copy")]
  pub sof: Option<PathBuf>,

  /// Write the configuration for loading from the running Linux system
  #[arg(long)]
  pub host_write: bool,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the bootloader and the FPGA configuration, then stage both
  Build {
    #[command(flatten)]
    decisions: DecisionArgs,

    #[command(flatten)]
    bitstream: BitstreamArgs,
  },

  /// Build and stage the bootloader only
  Bootloader {
    #[command(flatten)]
    decisions: DecisionArgs,
  },

  /// Generate and stage the FPGA configuration only
  Bitstream {
    #[command(flatten)]
    args: BitstreamArgs,
  },

  /// Show which configuration file the staged boot script references
  Scan,

  /// List the supported device profiles
  Profiles {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Create the partition folders and assemble the disk image
  Assemble {
    /// Image file name (default: SocfpgaLinux<date>.img)
    #[arg(short, long)]
    output: Option<String>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {
    Commands::Build { decisions, bitstream } => cmd::cmd_build(&cli.dir, &decisions, &bitstream),
    Commands::Bootloader { decisions } => cmd::cmd_bootloader(&cli.dir, &decisions),
    Commands::Bitstream { args } => cmd::cmd_bitstream(&cli.dir, &args),
    Commands::Scan => cmd::cmd_scan(&cli.dir),
    Commands::Profiles { json } => cmd::cmd_profiles(json),
    Commands::Assemble { output } => cmd::cmd_assemble(&cli.dir, output.as_deref()),
  }
}
