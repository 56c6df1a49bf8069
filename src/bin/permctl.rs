use std::collections::HashSet;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::{Row, SqlitePool};

use permission_service::authz::check_perm;
use permission_service::config::StorageConfig;
use permission_service::db::{self, MIGRATOR};
use permission_service::models::permission::Permission;
use permission_service::store::{PermissionStore, SqlitePermissionStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "permission-service operator tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Print a user's stored permission record
    Show { user_id: String },
    /// Evaluate a permission against a user's stored record
    Check {
        user_id: String,
        resource: String,
        action: String,
        #[arg(default_value = "")]
        filter: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();
    let pool = get_pool().await?;

    match cli.command {
        Commands::MigrateRun => {
            MIGRATOR.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            print_status(&pool).await?;
        }
        Commands::Show { user_id } => {
            let store = SqlitePermissionStore::new(pool);
            match store.get(&user_id).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => anyhow::bail!("no permission record for {user_id}"),
            }
        }
        Commands::Check {
            user_id,
            resource,
            action,
            filter,
        } => {
            let store = SqlitePermissionStore::new(pool);
            let stored = store
                .get(&user_id)
                .await?
                .map(|record| record.permissions)
                .unwrap_or_default();
            let requested = Permission::new(resource, action, filter);
            let verdict = if check_perm(&stored, &requested) { "allowed" } else { "denied" };
            println!("{verdict}");
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let mut storage = StorageConfig::new(database_url);
    storage.max_connections = 2;
    db::connect(&storage).await
}

async fn print_status(pool: &SqlitePool) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let has_table = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?
        .is_some();
    let applied_versions: HashSet<i64> = if has_table {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in MIGRATOR.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}
