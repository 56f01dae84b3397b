use clap::Args;

use vn_core::probe::{self, ProbeOptions};
use vn_core::select;
use vn_core::types::{ProbeOutcome, ProxyMode};

use crate::cli::report_switch;
use crate::context::App;

#[derive(Args, Debug)]
pub struct SwitchArgs {
    /// Node id to switch to.
    #[arg(long, required_unless_present = "auto", conflicts_with = "auto")]
    pub node: Option<String>,
    /// Probe every known node and pick the lowest latency.
    #[arg(long)]
    pub auto: bool,
}

pub async fn run(app: &App, args: SwitchArgs) -> anyhow::Result<i32> {
    let target = if args.auto {
        match pick_fastest(app).await {
            Ok(node) => node,
            Err(e) => {
                eprintln!("error: {e}");
                return Ok(crate::cli::exit_code(&e));
            }
        }
    } else {
        // required_unless_present guarantees Some here
        let id = args.node.unwrap_or_default();
        match app.registry.get(&id) {
            Ok(node) => node,
            Err(e) => {
                eprintln!("error: {e}");
                return Ok(1);
            }
        }
    };

    // Mode and second hop carry over from the current configuration.
    let (mode, static_proxy) = app
        .supervisor
        .active()
        .map(|a| (a.mode, a.static_proxy))
        .unwrap_or((ProxyMode::Direct, None));

    Ok(report_switch(
        app.supervisor.switch_to(&target, mode, static_proxy).await,
    ))
}

/// Full batch probe, printed as a ranking, feeding the freshness gate.
async fn pick_fastest(app: &App) -> vn_core::Result<vn_core::types::Node> {
    let nodes = app.registry.list();
    if nodes.is_empty() {
        return Err(vn_core::Error::NoReachableNode);
    }

    println!("probing {} nodes...", nodes.len());
    let batch = probe::probe(&nodes, &ProbeOptions::default()).await;

    for result in &batch {
        let name = nodes
            .iter()
            .find(|n| n.id == result.node_id)
            .map(|n| n.name.as_str())
            .unwrap_or(result.node_id.as_str());
        match &result.outcome {
            ProbeOutcome::Success { latency_ms } => {
                println!("  {:<40} {:>5} ms", name, latency_ms)
            }
            ProbeOutcome::Failure { reason } => println!("  {:<40} {}", name, reason),
        }
    }

    let best_id = select::select_best(&batch)?.node_id.clone();
    app.supervisor.record_batch(batch);
    app.registry.get(&best_id)
}
