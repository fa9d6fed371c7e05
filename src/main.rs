use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rustphorus_vm::{load_project, Runtime, RuntimeConfig, RuntimeEvent};

/// Runs a block project headlessly from its green flag.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
  /// Project graph JSON.
  project: PathBuf,
  /// Frames to run; runs until no thread is left when omitted.
  #[arg(long)]
  frames: Option<usize>,
  /// Keep stepping after redraw requests.
  #[arg(long)]
  turbo: bool,
  /// Run every script on the interpreter.
  #[arg(long)]
  no_compile: bool,
  /// Runtime configuration JSON.
  #[arg(long)]
  config: Option<PathBuf>,
  /// Do not sleep between frames.
  #[arg(long)]
  headless_fast: bool,
}

fn print_events(runtime: &mut Runtime) {
  for event in runtime.take_events() {
    match event {
      RuntimeEvent::VisualReport { block, value } => {
        println!("{block}: {value}")
      }
      RuntimeEvent::ThreadError { thread, error, .. } => {
        eprintln!("thread {thread}: {error}")
      }
      other => log::debug!("{other:?}"),
    }
  }
}

fn main() -> Result<(), Box<dyn Error>> {
  pretty_env_logger::init();
  let args = Args::parse();

  let mut config = match &args.config {
    Some(path) => RuntimeConfig::load(path)?,
    None => RuntimeConfig::default(),
  };
  config.turbo_mode |= args.turbo;
  config.compiler_enabled &= !args.no_compile;
  let frame_interval = Duration::from_secs_f64(config.frame_interval() / 1000.);

  let mut runtime = Runtime::new(config);
  let targets = load_project(&args.project)?.install(&mut runtime)?;
  log::info!("loaded {} targets", targets.len());

  runtime.green_flag();
  let mut frame = 0;
  loop {
    if args.frames.is_some_and(|frames| frame >= frames) {
      break;
    }
    runtime.step();
    print_events(&mut runtime);
    frame += 1;
    if args.frames.is_none() && runtime.threads().is_empty() {
      break;
    }
    if !args.headless_fast {
      std::thread::sleep(frame_interval);
    }
  }
  log::info!("ran {frame} frames");

  for id in targets {
    let Some(target) = runtime.target(id) else {
      continue;
    };
    for variable in target.variables.values() {
      if variable.is_list() {
        println!("{}.{} = {:?}", target.name, variable.name, variable.items());
      } else {
        println!("{}.{} = {}", target.name, variable.name, variable.get());
      }
    }
  }
  Ok(())
}
