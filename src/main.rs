//! urbandb - schema setup and query access for the urban-scaling database.

mod cli;
mod output;

use cli::{Cli, Command};
use tracing::{error, info};
use urbandb::config::Config;
use urbandb::db::{Dispatcher, PostgresDispatcher};
use urbandb::error::{Result, UrbanDbError};
use urbandb::logging;
use urbandb::schema::{SchemaManager, TABLES};

#[tokio::main]
async fn main() {
    // .env is optional; PG* variables may come from the shell instead
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    logging::init_stderr_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        if let Some(hint) = hint(&e) {
            info!("{hint}");
        }
        std::process::exit(1);
    }
}

/// Suggests the CLI command that fixes a known failure.
fn hint(error: &UrbanDbError) -> Option<&'static str> {
    match error {
        UrbanDbError::Connection(message) if message.contains("does not exist") => {
            Some("Run `urbandb init` to create the database.")
        }
        _ => None,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;
    let connection = cli.resolve_connection(&config)?;
    info!("Connection: {}", connection.display_string());

    let dispatcher = PostgresDispatcher::new();

    match &cli.command {
        Command::Init { .. } => {
            SchemaManager::new(&dispatcher, &connection)
                .initialize_with(cli.command.init_options())
                .await?;
        }
        Command::Exec { atomic, statements } => {
            let statements: Vec<&str> = statements.iter().map(String::as_str).collect();
            if *atomic {
                dispatcher
                    .execute_mutation_atomic(&connection, &statements)
                    .await?;
            } else {
                dispatcher.execute_mutation(&connection, &statements).await?;
            }
            info!("Executed {} statement(s)", statements.len());
        }
        Command::Query { sql, format, .. } => {
            let result = dispatcher
                .execute_query(&connection, sql, cli.command.geometry_mode())
                .await?;
            println!("{}", output::render(&result, *format)?);
            info!("{} row(s)", result.row_count());
        }
        Command::Tables => {
            println!("{}", output::render_tables(&TABLES));
        }
    }

    Ok(())
}
