//! vnodectl — entrypoint.
//! - tracing initialization
//! - subcommand dispatch; exit code mirrors operation outcome

mod cli;
mod context;
mod envfile;
mod logging;
mod systemd;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    logging::init_logging();

    let code = cli::dispatch(args).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
