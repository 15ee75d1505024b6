mod cmd;
mod output;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lodge_lib::env::EnvKind;
use lodge_lib::project::ProjectError;

use cmd::{GlobalOpts, cmd_build, cmd_env, cmd_exec, cmd_gc, cmd_ls_builds};
use output::{OutputFormat, print_error};

const LOG_ENV: &str = "LODGE_LOG";

/// lodge - build packages and run commands in their environments
#[derive(Parser)]
#[command(name = "lodge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Project directory (default: nearest ancestor with a package.json)
  #[arg(short = 'C', long = "project", global = true, value_name = "DIR")]
  project: Option<PathBuf>,

  /// Maximum number of packages built in parallel
  #[arg(short, long, global = true, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
  jobs: Option<u32>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the project, or one package and its dependencies
  Build {
    /// Package to build
    package: Option<String>,
  },

  /// Build everything, then run a command in the project's command environment
  X {
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
  },

  /// Build the dependencies, then run a command in the project's build environment
  B {
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
  },

  /// Print an environment of the project
  Env {
    /// Which environment to print
    #[arg(long, default_value = "command", value_parser = parse_kind)]
    kind: EnvKind,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// List packages with their fingerprints and build status
  LsBuilds {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Remove store entries not used by the project
  Gc {
    /// Show what would be removed without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Build the dependencies, then run a command in the project's install environment
  #[command(external_subcommand)]
  External(Vec<String>),
}

fn parse_kind(s: &str) -> Result<EnvKind, String> {
  s.parse()
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_ansi(std::io::stderr().is_terminal())
    .without_time()
    .init();

  let code = match run(cli) {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{err:#}"));
      exit_code(&err)
    }
  };

  std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
  let opts = GlobalOpts {
    project: cli.project,
    jobs: cli.jobs.map(|j| j as usize),
  };

  match cli.command {
    None => cmd_build(&opts, None).map(|()| 0),
    Some(Commands::Build { package }) => cmd_build(&opts, package.as_deref()).map(|()| 0),
    Some(Commands::X { command }) => cmd_exec(&opts, EnvKind::Command, &command),
    Some(Commands::B { command }) => cmd_exec(&opts, EnvKind::Build, &command),
    Some(Commands::External(command)) => cmd_exec(&opts, EnvKind::Install, &command),
    Some(Commands::Env { kind, json }) => cmd_env(&opts, kind, OutputFormat::from_json_flag(json)).map(|()| 0),
    Some(Commands::LsBuilds { json }) => cmd_ls_builds(&opts, OutputFormat::from_json_flag(json)).map(|()| 0),
    Some(Commands::Gc { dry_run, json }) => cmd_gc(&opts, dry_run, OutputFormat::from_json_flag(json)).map(|()| 0),
  }
}

fn exit_code(err: &anyhow::Error) -> i32 {
  err
    .chain()
    .find_map(|e| e.downcast_ref::<ProjectError>())
    .map_or(1, ProjectError::exit_code)
}
