mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command, PrefsSubcommand, StateSubcommand};
use tracing::Level;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config();

    match cli.command {
        Command::Prefs(prefs) => match prefs.command {
            PrefsSubcommand::List { query } => {
                let patterns: Vec<&str> = query.iter().map(String::as_str).collect();
                commands::list_prefs(&config, &patterns).await?
            }
            PrefsSubcommand::Get { key } => commands::get_pref(&config, &key).await?,
            PrefsSubcommand::Set { key, value } => {
                commands::set_pref(&config, &key, &value).await?
            }
            PrefsSubcommand::Watch { query } => {
                let patterns: Vec<&str> = query.iter().map(String::as_str).collect();
                commands::watch_prefs(&config, &patterns).await?
            }
        },
        Command::State(state) => match state.command {
            StateSubcommand::Show { page } => commands::show_state(&config, page)?,
            StateSubcommand::Reset { page } => commands::reset_state(&config, page)?,
        },
    }

    Ok(())
}
