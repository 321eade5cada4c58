use buildsite_api::migrator::Migrator;
use clap::{Parser, Subcommand};
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "migration", about = "Manage the BuildSite database schema", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Database URL; falls back to APP__DATABASE_URL, then DATABASE_URL"
    )]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every pending migration (default)
    Up,
    /// Roll back the most recent migration
    Down,
    /// Drop every table and re-apply all migrations
    Fresh,
    /// Print applied and pending migrations
    Status,
}

fn database_url(cli: &Cli) -> anyhow::Result<String> {
    cli.database_url
        .clone()
        .or_else(|| std::env::var("APP__DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("no database URL: pass --database-url or set APP__DATABASE_URL"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    let url = database_url(&cli)?;

    let mut options = ConnectOptions::new(url);
    options
        .max_connections(2)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    match cli.command.unwrap_or(Commands::Up) {
        Commands::Up => Migrator::up(&db, None).await?,
        Commands::Down => Migrator::down(&db, Some(1)).await?,
        Commands::Fresh => Migrator::fresh(&db).await?,
        Commands::Status => Migrator::status(&db).await?,
    }

    info!("migration command finished");
    Ok(())
}
