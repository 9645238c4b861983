mod cmd;
mod output;

use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use gsnode_lib::consts::EXIT_BOOTSTRAP_FAILURE;
use tracing_subscriber::EnvFilter;

use crate::output::print_error;

/// gsnode - build variants and node bootstrap for distributed training images
#[derive(Parser)]
#[command(name = "gsnode")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Configuration file (default: $GSNODE_CONFIG, then /etc/gsnode/gsnode.toml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve a device selector and render its image build layer
  Resolve {
    /// Device selector, e.g. gpu or cpu (default: $GSNODE_DEVICE)
    selector: Option<String>,

    /// Directory to write the layer into
    #[arg(short, long, default_value = "gsnode-layer")]
    out: PathBuf,

    /// Replace an existing output directory
    #[arg(short, long)]
    force: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// List the known build variants
  Variants {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Correct the hostname mapping, then run the given command
  Boot {
    /// Detect and plan only; do not write the hosts table or run the command
    #[arg(long)]
    dry_run: bool,

    /// Command to hand off to (default: the configured shell)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
  },

  /// Detect this node's identity and report whether the hosts table needs a patch
  Check {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show the variant marker recorded in this image
  Info {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn main() {
  let args: Vec<OsString> = std::env::args_os().collect();
  let cli = match Cli::try_parse_from(&args) {
    Ok(cli) => cli,
    Err(e) if is_usage_error(e.kind()) && invoked_subcommand(&args) == Some("boot") => {
      // A mistyped entrypoint is still a bootstrap failure to the container.
      let _ = e.print();
      std::process::exit(EXIT_BOOTSTRAP_FAILURE);
    }
    Err(e) => e.exit(),
  };

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let config = cli.config.as_deref();
  let code = match cli.command {
    // Boot owns its exit code end to end: it is the container's exit code.
    Commands::Boot { dry_run, command } => cmd::cmd_boot(config, command, dry_run),
    Commands::Resolve {
      selector,
      out,
      force,
      json,
    } => report(cmd::cmd_resolve(config, selector, &out, force, json)),
    Commands::Variants { json } => report(cmd::cmd_variants(config, json)),
    Commands::Check { json } => report(cmd::cmd_check(config, json)),
    Commands::Info { json } => report(cmd::cmd_info(config, json)),
  };

  std::process::exit(code);
}

fn is_usage_error(kind: ErrorKind) -> bool {
  !matches!(kind, ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
}

/// First positional argument, skipping global flags and their values.
fn invoked_subcommand(args: &[OsString]) -> Option<&str> {
  let mut rest = args.iter().skip(1).map(|a| a.to_str());
  while let Some(arg) = rest.next() {
    match arg? {
      "--config" => {
        rest.next();
      }
      flag if flag.starts_with('-') => {}
      name => return Some(name),
    }
  }
  None
}

/// Print `result`'s error, if any, and map it to an exit code.
fn report(result: anyhow::Result<()>) -> i32 {
  match result {
    Ok(()) => 0,
    Err(e) => {
      print_error(&format!("{:#}", e));
      cmd::error_exit_code(&e)
    }
  }
}
