//! `kubelite` command-line front end.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use kubelite::util;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Log to a daily file in `logs_dir`, or to stderr with `--verbose`.
///
/// The returned guard must stay alive for buffered lines to be flushed.
fn init_logging(logs_dir: &Path, verbose: bool) -> anyhow::Result<WorkerGuard> {
    let default_level = if verbose { "info" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))?;

    let (non_blocking, guard) = if verbose {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        std::fs::create_dir_all(logs_dir)?;
        let file_appender = tracing_appender::rolling::daily(logs_dir, "kubelite.log");
        tracing_appender::non_blocking(file_appender)
    };

    util::register_to_tracing(non_blocking, env_filter);
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli.global.options().layout().logs_dir(), cli.global.verbose)?;

    match cli.command {
        Commands::Start(args) => commands::start::execute(args, &cli.global).await,
        Commands::Stop => commands::stop::execute(&cli.global).await,
        Commands::Delete => commands::delete::execute(&cli.global).await,
        Commands::Status => commands::status::execute(&cli.global).await,
        Commands::Logs(args) => commands::logs::execute(args, &cli.global).await,
        Commands::Cache(args) => commands::cache::execute(args, &cli.global).await,
        Commands::Ssh(args) => commands::ssh::execute(args, &cli.global).await,
        Commands::DockerEnv => commands::docker_env::execute(&cli.global).await,
    }
}
