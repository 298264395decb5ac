//! bd-api CLI
//!
//! Runs the ingestion service or manages BD lists in the configured store.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use bd_api::{
    App,
    error::Result,
    models::{BdList, Config},
    storage::Store,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

/// bd-api - player reputation aggregator
#[derive(Parser, Debug)]
#[command(name = "bd-api", version, about = "Player reputation aggregator")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "bd-api.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the job runner and periodic scheduler
    Run,

    /// Manage bot detector lists
    Bd {
        #[command(subcommand)]
        command: BdCommand,
    },
}

#[derive(Subcommand, Debug)]
enum BdCommand {
    /// Show every active list
    List,

    /// Register a new list
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "tf2")]
        game: String,
        /// Trust weight, 0..=10
        #[arg(long, default_value_t = 5)]
        weight: i32,
    },

    /// Soft delete a list
    Del {
        #[arg(long)]
        name: String,
    },
}

/// Copies log output to stderr and an append-only file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Initialize logging from the configured level, optionally teeing to a file.
fn init_logging(config: &Config) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str()));
    builder.format_timestamp_secs();

    if config.log_file_enabled {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file_path)?;
        builder.target(env_logger::Target::Pipe(Box::new(Tee { file })));
    }
    builder.init();
    Ok(())
}

fn print_lists(lists: &[BdList]) {
    if lists.is_empty() {
        println!("No lists registered");
        return;
    }
    println!("{:<5} {:<24} {:<6} {:<6} URL", "ID", "NAME", "GAME", "WEIGHT");
    for list in lists {
        println!(
            "{:<5} {:<24} {:<6} {:<6} {}",
            list.list_id, list.name, list.game, list.trust_weight, list.url
        );
    }
}

async fn run_bd(config: &Config, command: BdCommand) -> Result<()> {
    let store = Store::open(config).await?;
    let result = match command {
        BdCommand::List => store.bd_lists(false).await.map(|lists| print_lists(&lists)),
        BdCommand::Add {
            name,
            url,
            game,
            weight,
        } => store
            .bd_list_create(&name, &url, &game, weight)
            .await
            .map(|list| println!("Added list {} ({})", list.name, list.list_id)),
        BdCommand::Del { name } => store.bd_list_delete(&name).await.map(|deleted| {
            if deleted {
                println!("Deleted list {name}");
            } else {
                println!("No active list named {name}");
            }
        }),
    };
    store.close().await;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::load_or_default(&cli.config)
    };
    init_logging(&config)?;

    match cli.command {
        Command::Run => {
            log::info!("Loaded configuration from {}", cli.config.display());
            let cancel = CancellationToken::new();
            let app = App::new(config, &cancel).await?;
            app.run(cancel).await?;
        }
        Command::Bd { command } => run_bd(&config, command).await?,
    }

    Ok(())
}
