//! Ingestion against a real Postgres with pgvector.
//!
//! Needs Docker: `cargo test -- --ignored`

use anyhow::{Context, Result};
use plan_ingest::testing::MockEmbedder;
use plan_ingest::types::plan::{plan_id, Row, Table};
use plan_ingest::{
    Document, IngestionWriter, Metadata, PgVectorStore, Plan, PlanStore, PostgresPlanStore,
};
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

const MODEL: &str = "text-embedding-3-small";

struct TestDb {
    pool: PgPool,
    _postgres: ContainerAsync<Postgres>,
}

async fn start_db() -> Result<TestDb> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let postgres = Postgres::default()
        .with_name("pgvector/pgvector")
        .with_tag("pg16")
        .start()
        .await
        .context("Failed to start Postgres container")?;

    let host = postgres.get_host().await?;
    let port = postgres.get_host_port_ipv4(5432).await?;
    let db_url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    let pool = PgPool::connect(&db_url)
        .await
        .context("Failed to connect to Postgres")?;
    PostgresPlanStore::from_pool(pool.clone())
        .migrate()
        .await
        .context("Failed to run migrations")?;

    Ok(TestDb {
        pool,
        _postgres: postgres,
    })
}

fn writer(pool: &PgPool) -> IngestionWriter<PgVectorStore<MockEmbedder>, PostgresPlanStore> {
    IngestionWriter::new(
        PgVectorStore::new(pool.clone(), MockEmbedder::new()),
        PostgresPlanStore::from_pool(pool.clone()),
        MODEL,
    )
}

fn document(url: &str, rows: &[(i32, i32)]) -> Document {
    let mut table = Table::new();
    for (amount, distance) in rows {
        table.push(Row::new(*amount, *distance, "Kraul"));
    }
    table.add_sum();
    table.update_sum();
    Document::new(Plan::new(url, "Plan", "Beschreibung", table), Metadata::default())
}

async fn count(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await.unwrap()
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_ingesting_twice_is_idempotent() {
    let db = start_db().await.unwrap();
    let writer = writer(&db.pool);
    let docs = vec![
        document("https://swim.example/plan/1", &[(2, 100), (1, 50)]),
        document("https://swim.example/plan/2", &[(4, 50)]),
    ];

    writer.commit(&docs).await.unwrap();
    writer.commit(&docs).await.unwrap();

    assert_eq!(count(&db.pool, "SELECT COUNT(*) FROM url_registry").await, 2);
    assert_eq!(count(&db.pool, "SELECT COUNT(*) FROM plan").await, 2);
    assert_eq!(count(&db.pool, "SELECT COUNT(*) FROM embedding").await, 2);

    let table: sqlx::types::Json<Table> =
        sqlx::query_scalar("SELECT table_json FROM plan WHERE plan_id = $1")
            .bind(plan_id("https://swim.example/plan/1"))
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(table.0, docs[0].plan.table);
    assert_eq!(table.0.total_distance(), 250);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reingest_replaces_plan_content() {
    let db = start_db().await.unwrap();
    let writer = writer(&db.pool);

    writer
        .commit(&[document("https://swim.example/plan/1", &[(2, 100)])])
        .await
        .unwrap();
    writer
        .commit(&[document("https://swim.example/plan/1", &[(4, 100)])])
        .await
        .unwrap();

    let table: sqlx::types::Json<Table> =
        sqlx::query_scalar("SELECT table_json FROM plan WHERE plan_id = $1")
            .bind(plan_id("https://swim.example/plan/1"))
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(table.0.total_distance(), 400);
    assert_eq!(count(&db.pool, "SELECT COUNT(*) FROM plan").await, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_writers_leave_one_registry_row() {
    let db = start_db().await.unwrap();
    let writer = std::sync::Arc::new(writer(&db.pool));
    writer
        .commit(&[document("https://swim.example/plan/1", &[(1, 100)])])
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 1..=8 {
        let writer = writer.clone();
        handles.push(tokio::spawn(async move {
            writer
                .commit(&[document("https://swim.example/plan/1", &[(n, 100)])])
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(count(&db.pool, "SELECT COUNT(*) FROM url_registry").await, 1);
    assert_eq!(count(&db.pool, "SELECT COUNT(*) FROM plan").await, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_history_lists_registered_urls() {
    let db = start_db().await.unwrap();
    let writer = writer(&db.pool);
    writer
        .commit(&[document("https://swim.example/plan/1", &[(1, 100)])])
        .await
        .unwrap();

    let store = PostgresPlanStore::from_pool(db.pool.clone());
    let collection = store.collection_id(MODEL).await.unwrap().unwrap();
    let recent = store
        .visited_urls(collection, chrono::Utc::now() - chrono::Duration::days(1))
        .await
        .unwrap();
    let future = store
        .visited_urls(collection, chrono::Utc::now() + chrono::Duration::days(1))
        .await
        .unwrap();

    assert_eq!(recent, vec!["https://swim.example/plan/1".to_string()]);
    assert!(future.is_empty());
}
