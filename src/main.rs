use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hexarm_can_runtime::config::RigConfig;
use hexarm_can_runtime::gcode::{self, Converter};
use hexarm_can_runtime::motor::bus::{Bus, SimBus};
use hexarm_can_runtime::runtime::{self, ShellError};

#[derive(Parser)]
#[command(name = "hexarm-can-runtime")]
#[command(about = "Convert G-code style move files for a six-axis CAN rig and send them")]
struct Cli {
    /// JSON rig config overriding the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a move file into a hex frame file
    Convert {
        input: PathBuf,
        /// Output path, defaults to the input with a .txt extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Send a pre-encoded frame file over the bus
    Send {
        frames: PathBuf,
        /// Use the simulated bus instead of an attached transport
        #[arg(long)]
        sim: bool,
    },
    /// Convert and send in one pass, no intermediate file
    Run {
        input: PathBuf,
        #[arg(long)]
        sim: bool,
    },
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), ShellError> {
    let config = match &cli.config {
        Some(path) => RigConfig::load(path)?,
        None => RigConfig::default(),
    };

    match cli.command {
        Command::Convert { input, output } => {
            let text = std::fs::read_to_string(&input)?;
            let lines = runtime::convert_program(&config, &text);
            let output = output.unwrap_or_else(|| input.with_extension("txt"));
            write_lines(&output, &lines)?;
            info!("Wrote {} frames to {}", lines.len(), output.display());
        }
        Command::Send { frames, sim } => {
            let text = std::fs::read_to_string(&frames)?;
            let batches = gcode::read_frame_lines(text.lines(), &config.ack_axes);
            let bus = make_bus(sim, &config)?;
            runtime::run_send(config, batches, bus).await?;
        }
        Command::Run { input, sim } => {
            let text = std::fs::read_to_string(&input)?;
            let mut converter = Converter::new(&config);
            let batches = converter.convert_program(text.lines());
            info!(
                "Converted {} moves, {} lines skipped",
                converter.moves(),
                converter.skipped()
            );
            let bus = make_bus(sim, &config)?;
            runtime::run_send(config, batches, bus).await?;
        }
    }
    Ok(())
}

fn write_lines(path: &Path, lines: &[String]) -> std::io::Result<()> {
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    std::fs::write(path, body)
}

/// The bus handle is injected: transport bridging lives outside this crate.
/// The shell only knows the simulated rig.
fn make_bus(sim: bool, config: &RigConfig) -> Result<Box<dyn Bus + Send>, ShellError> {
    if sim {
        info!("Using simulated bus, acking axes {:?}", config.ack_axes);
        Ok(Box::new(SimBus::acking(&config.ack_axes)))
    } else {
        Err("no transport attached: pass --sim, or embed this crate and supply a Bus implementation".into())
    }
}
