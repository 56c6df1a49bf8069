#![allow(dead_code)]

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use permission_service::{create_app, AppConfig};

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    // keeps the database file alive for the test's duration
    _dir: TempDir,
}

/// Fresh SQLite file with migrations applied.
pub async fn setup_pool() -> Result<(SqlitePool, TempDir)> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("permissions.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    Ok((pool, dir))
}

pub async fn spawn_app(config: AppConfig) -> Result<TestApp> {
    let (pool, dir) = setup_pool().await?;
    let router = create_app(pool.clone(), &config).await?;
    Ok(TestApp { router, pool, _dir: dir })
}

pub async fn dev_app() -> Result<TestApp> {
    spawn_app(AppConfig::development("sqlite::memory:")).await
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, key: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.router.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    pub async fn record_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM permission_records")
            .fetch_one(&self.pool)
            .await?)
    }
}
