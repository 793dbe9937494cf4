use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use log::error;
use solar_system::AppConfig;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Real-time solar system with orbiting planets and body picking
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
  /// Window width in pixels
  #[arg(long, default_value_t = 1920)]
  width: u32,
  /// Window height in pixels
  #[arg(long, default_value_t = 1080)]
  height: u32,
  /// Simulated seconds per real second
  #[arg(short, long, default_value_t = 1.5)]
  time_scale: f32,
  /// Directory holding the textures/ and skybox/ folders
  #[arg(short, long, default_value = "assets")]
  assets: PathBuf,
  /// Run in headless mode (no window)
  #[arg(long, default_value_t = false)]
  headless: bool,
  /// Frames to simulate in headless mode
  #[arg(long, default_value_t = 600)]
  frames: u64,
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Generate shell completion scripts
  Completions {
    /// The shell to generate the script for
    #[arg(value_enum)]
    shell: Shell,
  },
}

fn main() -> ExitCode {
  let args = Args::parse();

  if let Some(Commands::Completions { shell }) = args.command {
    let mut cmd = Args::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    return ExitCode::SUCCESS;
  }

  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let config = AppConfig {
    width: args.width,
    height: args.height,
    time_scale: args.time_scale,
    asset_dir: args.assets,
    headless: args.headless,
    frames: args.frames,
    ..AppConfig::default()
  };

  match solar_system::state::run(config) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{e:#}");
      ExitCode::FAILURE
    }
  }
}
