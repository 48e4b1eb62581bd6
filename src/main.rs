use anyhow::Result;
use clap::Parser;
use tracing::debug;

use snyfter::cli::{self, Cli, Command};
use snyfter::database::SnyfterDatabase;
use snyfter::logging::init_logging;
use snyfter::processing::DocumentProcessor;
use snyfter::service::ExtractionService;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    let _logging = init_logging(&config.logging)?;
    debug!("Configuration: {:?}", config);

    match cli.command {
        Command::InitConfig { path } => cli::init_config_command(&path),
        Command::Extract { file, store, json, format } => {
            let database = if store {
                Some(SnyfterDatabase::connect(&config.database).await?)
            } else {
                None
            };
            let mut service = ExtractionService::new(DocumentProcessor::new(config)?);
            if let Some(database) = database {
                service = service.with_database(database);
            }
            cli::extract_command(&service, file, json, format).await
        }
        Command::Search { query, limit } => {
            let database = SnyfterDatabase::connect(&config.database).await?;
            cli::search_command(&database, &query, limit).await
        }
        Command::List { limit, offset } => {
            let database = SnyfterDatabase::connect(&config.database).await?;
            cli::list_command(&database, limit, offset).await
        }
        Command::Show { id } => {
            let database = SnyfterDatabase::connect(&config.database).await?;
            cli::show_command(&database, id).await
        }
        Command::Tables { id, format } => {
            let database = SnyfterDatabase::connect(&config.database).await?;
            cli::tables_command(&database, id, format).await
        }
        Command::Status => {
            let database = SnyfterDatabase::connect(&config.database).await?;
            cli::status_command(&database).await
        }
    }
}
