use clap::Args;

use vn_core::status::{self, StatusOptions};
use vn_core::types::ProbeOutcome;

use crate::cli::mode_name;
use crate::context::App;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Skip the live reachability check of the current node.
    #[arg(long)]
    pub no_probe: bool,
}

pub async fn run(app: &App, args: StatusArgs) -> anyhow::Result<i32> {
    let opts = StatusOptions {
        check_current_node: !args.no_probe,
        ..Default::default()
    };
    let snap = status::snapshot(
        &app.supervisor,
        &app.registry,
        app.subscription.as_ref(),
        &opts,
    )
    .await;

    match snap.service_state {
        Some(state) => println!("daemon:       {state}"),
        None => println!("daemon:       unavailable"),
    }

    match (&snap.active, &snap.current_node) {
        (Some(active), Some(node)) => {
            println!(
                "node:         {} ({}, {}) via {}",
                node.name,
                node.region,
                node.protocol.tag(),
                node.server
            );
            println!(
                "mode:         {} (version {})",
                mode_name(active.mode),
                active.version
            );
        }
        (Some(active), None) => {
            println!("node:         {} (no longer in the node table)", active.current_node_id);
            println!("mode:         {}", mode_name(active.mode));
        }
        _ => println!("node:         none applied yet"),
    }

    match &snap.current_probe {
        Some(ProbeOutcome::Success { latency_ms }) => {
            println!("reachability: ok ({latency_ms} ms)")
        }
        Some(ProbeOutcome::Failure { reason }) => println!("reachability: failed ({reason})"),
        None => {}
    }

    println!("nodes known:  {}", snap.node_count);
    match snap.subscription_age_secs {
        Some(age) => println!("subscription: refreshed {age}s ago"),
        None => println!("subscription: never fetched"),
    }

    if !snap.last_batch.is_empty() {
        let ok = snap
            .last_batch
            .iter()
            .filter(|r| r.outcome.is_success())
            .count();
        println!(
            "last probe:   {ok}/{} reachable",
            snap.last_batch.len()
        );
    }
    Ok(0)
}

/// `vnodectl test`: one reachability check of the active node.
pub async fn run_test(app: &App) -> anyhow::Result<i32> {
    let Some(active) = app.supervisor.active() else {
        eprintln!("no active node to test; run `vnodectl switch` first");
        return Ok(1);
    };
    let node = match app.registry.get(&active.current_node_id) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(1);
        }
    };

    let timeout = app.supervisor.options().probe_timeout;
    let result = vn_core::probe::probe_one(&node, timeout).await;
    match result.outcome {
        ProbeOutcome::Success { latency_ms } => {
            println!("{}: reachable, {latency_ms} ms", node.name);
            Ok(0)
        }
        ProbeOutcome::Failure { reason } => {
            eprintln!("{}: unreachable ({reason})", node.name);
            Ok(1)
        }
    }
}
