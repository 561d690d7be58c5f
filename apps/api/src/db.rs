use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Idempotent schema bootstrap, run at startup.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entitlements (
            user_id         UUID PRIMARY KEY,
            tier            TEXT NOT NULL DEFAULT 'free',
            pro_expires_at  TIMESTAMPTZ,
            daily_used      INTEGER NOT NULL DEFAULT 0,
            daily_reset_at  TIMESTAMPTZ NOT NULL,
            lifetime_used   BIGINT NOT NULL DEFAULT 0,
            version         BIGINT NOT NULL DEFAULT 0,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            order_code          BIGINT PRIMARY KEY,
            user_id             UUID NOT NULL,
            amount              BIGINT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'pending',
            gateway_link_id     TEXT,
            plan_duration_days  INTEGER NOT NULL,
            paid_at             TIMESTAMPTZ,
            expires_at          TIMESTAMPTZ,
            raw_webhook         JSONB,
            created_at          TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id            UUID PRIMARY KEY,
            user_id       UUID NOT NULL,
            cv_filename   TEXT NOT NULL,
            cv_text       TEXT NOT NULL,
            jd_text       TEXT NOT NULL,
            job_title     TEXT NOT NULL,
            company_name  TEXT NOT NULL,
            overall_score INTEGER NOT NULL,
            verdict       TEXT NOT NULL,
            summary       TEXT NOT NULL,
            report        JSONB NOT NULL,
            created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS analyses_user_created_idx
         ON analyses (user_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    info!("Database schema verified");
    Ok(())
}
