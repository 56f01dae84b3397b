use std::time::Duration;

use clap::Subcommand;

use crate::cli::exit_code;
use crate::context::App;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Subcommand, Debug)]
pub enum SubAction {
    /// Fetch the feed and replace the subscription node set.
    Update {
        /// Feed URL; defaults to subscription_url from settings.json.
        #[arg(long)]
        url: Option<String>,
    },
    /// Show the cached subscription state.
    Show,
}

pub async fn run(app: &App, action: SubAction) -> anyhow::Result<i32> {
    let code = match action {
        SubAction::Update { url } => {
            let Some(url) = url.or_else(|| app.settings.subscription_url.clone()) else {
                eprintln!("no --url given and no subscription_url in settings.json");
                return Ok(1);
            };
            update(app, &url).await
        }
        SubAction::Show => {
            match &app.subscription {
                Some(rec) => {
                    println!("url:     {}", rec.url);
                    println!("fetched: {}", rec.fetched_at.to_rfc3339());
                    println!("nodes:   {}", rec.parsed_node_ids.len());
                    println!("dropped: {}", rec.dropped_entries);
                }
                None => println!("no subscription fetched yet"),
            }
            0
        }
    };
    Ok(code)
}

async fn update(app: &App, url: &str) -> i32 {
    // The writer guard also excludes a concurrent switch while the previous
    // subscription state is being snapshotted.
    let writer = match app.supervisor.try_writer() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e}");
            return exit_code(&e);
        }
    };

    match vn_subscribe::refresh(url, FETCH_TIMEOUT, &app.registry, &app.store, &writer).await {
        Ok(record) => {
            println!(
                "subscription updated: {} nodes ({} entries dropped)",
                record.parsed_node_ids.len(),
                record.dropped_entries
            );
            0
        }
        Err(e) => {
            eprintln!("subscription update failed: {e}");
            exit_code(&e)
        }
    }
}
