use clap::Subcommand;

use vn_core::mode::ModeMachine;

use crate::cli::{mode_name, report_switch};
use crate::context::App;

#[derive(Subcommand, Debug)]
pub enum ModeAction {
    /// Single hop through the active node.
    Direct,
    /// Route the active node through the configured static second hop.
    Chained,
    /// Flip between direct and chained.
    Toggle,
    /// Print the current mode.
    Status,
}

pub async fn run(app: &App, action: ModeAction) -> anyhow::Result<i32> {
    let machine = ModeMachine::new(&app.supervisor, &app.registry);

    let code = match action {
        ModeAction::Status => {
            println!("{}", mode_name(machine.current()));
            0
        }
        ModeAction::Direct => report_switch(machine.to_direct().await),
        ModeAction::Chained => match app.settings.static_proxy.clone() {
            Some(sp) => report_switch(machine.to_chained(sp).await),
            None => {
                eprintln!("chained mode needs a static_proxy entry in settings.json");
                1
            }
        },
        ModeAction::Toggle => report_switch(machine.toggle(app.settings.static_proxy.clone()).await),
    };
    Ok(code)
}
