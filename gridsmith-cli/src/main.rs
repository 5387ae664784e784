use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;
mod cmd;
mod commands;
mod exit_codes;
mod output;
mod utils;

pub use args::*;
use commands::Command;

#[derive(Debug, Parser)]
#[command(
    name = "gridsmith",
    version,
    about = "Validate, correct, rehearse and build generated spreadsheet scripts"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            std::process::exit(exit_codes::RUNTIME_ERROR);
        }
    };

    let exit_code = rt.block_on(run_command(cli.command));
    std::process::exit(exit_code);
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("GRIDSMITH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_command(command: Command) -> i32 {
    match command {
        Command::Validate { path, output } => cmd::validate::validate_cmd(&path, output),
        Command::Correct {
            path,
            write,
            output,
        } => cmd::correct::correct_cmd(&path, write, output),
        Command::Simulate {
            path,
            sheets,
            output,
        } => cmd::simulate::simulate_cmd(&path, &sheets, output),
        Command::Build {
            paths,
            intent,
            config,
            events,
            retry,
            output,
        } => cmd::build::build_cmd(&paths, &intent, config.as_deref(), events, retry, output).await,
    }
}
