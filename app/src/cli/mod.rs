//! Command surface. Every handler prints human-readable output to stdout
//! and maps engine errors onto exit codes:
//!   0 success, 1 ordinary failure, 2 rolled back, 3 fatal (manual repair).

pub mod mode;
pub mod status;
pub mod sub;
pub mod switch;

use clap::{Parser, Subcommand};
use tracing::error;

use vn_core::service::ServiceControl;
use vn_core::types::{ActiveConfig, ProxyMode};

use crate::context::App;
use crate::envfile;

#[derive(Parser, Debug)]
#[command(name = "vnodectl", version, about = "Proxy node lifecycle and switching control")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Aggregated daemon / node / subscription status.
    Status(status::StatusArgs),
    /// Reachability check of the currently active node.
    Test,
    /// Start the proxy daemon.
    Start,
    /// Stop the proxy daemon.
    Stop,
    /// Restart the proxy daemon.
    Restart,
    /// Inspect or change the direct/chained proxy topology.
    Mode {
        #[command(subcommand)]
        action: mode::ModeAction,
    },
    /// Switch the active node, by id or automatically by latency.
    Switch(switch::SwitchArgs),
    /// Return to the most recent configuration snapshot.
    Restore,
    /// Subscription maintenance.
    Sub {
        #[command(subcommand)]
        action: sub::SubAction,
    },
    /// Print shell snippets for routing an environment through the inbounds.
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum EnvAction {
    /// Export proxy variables pointing at the local inbounds.
    On,
    /// Unset those variables.
    Off,
}

pub async fn dispatch(args: Args) -> anyhow::Result<i32> {
    let app = App::bootstrap()?;

    let code = match args.command {
        Commands::Status(a) => status::run(&app, a).await?,
        Commands::Test => status::run_test(&app).await?,
        Commands::Start => service_verb(&app, "start").await,
        Commands::Stop => service_verb(&app, "stop").await,
        Commands::Restart => service_verb(&app, "restart").await,
        Commands::Mode { action } => mode::run(&app, action).await?,
        Commands::Switch(a) => switch::run(&app, a).await?,
        Commands::Restore => report_switch(app.supervisor.restore_backup().await),
        Commands::Sub { action } => sub::run(&app, action).await?,
        Commands::Env { action } => {
            match action {
                EnvAction::On => print!("{}", envfile::render_proxy_on(app.settings.ports)),
                EnvAction::Off => print!("{}", envfile::render_proxy_off()),
            }
            0
        }
    };
    Ok(code)
}

async fn service_verb(app: &App, verb: &str) -> i32 {
    let service = app.supervisor.service();
    let result = match verb {
        "start" => service.start().await,
        "stop" => service.stop().await,
        _ => service.restart().await,
    };
    match result {
        Ok(()) => {
            let state = service
                .current_state()
                .await
                .map(|s| s.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            println!("{verb}: ok (daemon {state})");
            0
        }
        Err(e) => {
            error!(error = %e, verb, "service operation failed");
            eprintln!("{verb} failed: {e}");
            exit_code(&e)
        }
    }
}

pub(crate) fn exit_code(err: &vn_core::Error) -> i32 {
    match err {
        vn_core::Error::Fatal(_) => 3,
        vn_core::Error::RolledBack(_) => 2,
        _ => 1,
    }
}

pub(crate) fn mode_name(mode: ProxyMode) -> &'static str {
    match mode {
        ProxyMode::Direct => "direct",
        ProxyMode::Chained => "chained",
    }
}

/// Shared success/error reporting for operations that commit a new
/// active configuration.
pub(crate) fn report_switch(result: vn_core::Result<ActiveConfig>) -> i32 {
    match result {
        Ok(active) => {
            println!(
                "applied: node {} mode {} (version {})",
                active.current_node_id,
                mode_name(active.mode),
                active.version
            );
            0
        }
        Err(e) => {
            match &e {
                vn_core::Error::RolledBack(reason) => {
                    eprintln!("activation failed, previous configuration restored: {reason}");
                }
                vn_core::Error::Fatal(reason) => {
                    eprintln!("FATAL: {reason}");
                    eprintln!("the daemon may be down; inspect the state directory and restart manually");
                }
                other => eprintln!("error: {other}"),
            }
            exit_code(&e)
        }
    }
}
