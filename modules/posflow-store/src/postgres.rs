//! `PosStore` backed by Postgres.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::traits::PosStore;
use crate::types::{Recommendation, Write};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to database");
        Ok(Self { pool })
    }

    /// Apply the schema in `migrations/`.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn execute(tx: &mut Transaction<'_, Postgres>, write: &Write) -> Result<(), sqlx::Error> {
    match write {
        Write::EmployeeOnTerminal {
            employee_id,
            terminal_id,
            at,
        } => {
            sqlx::query(
                r#"
                INSERT INTO employees (employee_id, current_terminal_id, last_login)
                VALUES ($1, $2, $3)
                ON CONFLICT (employee_id)
                DO UPDATE SET current_terminal_id = $2, last_login = $3
                "#,
            )
            .bind(employee_id)
            .bind(terminal_id)
            .bind(at)
            .execute(&mut **tx)
            .await?;
        }
        Write::OpenSession {
            employee_id,
            terminal_id,
            at,
        } => {
            sqlx::query(
                r#"
                INSERT INTO employee_sessions (employee_id, terminal_id, login_time)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(employee_id)
            .bind(terminal_id)
            .bind(at)
            .execute(&mut **tx)
            .await?;
        }
        Write::EmployeeOffTerminal {
            employee_id,
            terminal_id,
            at,
        } => {
            sqlx::query(
                r#"
                UPDATE employees
                SET current_terminal_id = CASE
                        WHEN current_terminal_id = $3 THEN NULL
                        ELSE current_terminal_id
                    END,
                    last_logout = $2
                WHERE employee_id = $1
                "#,
            )
            .bind(employee_id)
            .bind(at)
            .bind(terminal_id)
            .execute(&mut **tx)
            .await?;
        }
        Write::CloseSession {
            employee_id,
            terminal_id,
            at,
        } => {
            sqlx::query(
                r#"
                UPDATE employee_sessions
                SET logout_time = $3,
                    duration_minutes = EXTRACT(EPOCH FROM ($3 - login_time)) / 60
                WHERE employee_id = $1
                  AND terminal_id = $2
                  AND logout_time IS NULL
                "#,
            )
            .bind(employee_id)
            .bind(terminal_id)
            .bind(at)
            .execute(&mut **tx)
            .await?;
        }
        Write::BasketItem {
            event_id,
            basket_id,
            item_id,
            price,
            quantity,
            at,
        } => {
            sqlx::query(
                r#"
                INSERT INTO basket_items (event_id, basket_id, item_id, price, quantity, added_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (event_id) DO NOTHING
                "#,
            )
            .bind(event_id)
            .bind(basket_id)
            .bind(item_id)
            .bind(price)
            .bind(quantity)
            .bind(at)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl PosStore for PgStore {
    async fn current_terminal(&self, employee_id: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT current_terminal_id
            FROM employees
            WHERE employee_id = $1 AND current_terminal_id IS NOT NULL
            "#,
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    async fn customer(&self, customer_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let row = sqlx::query_as::<_, (serde_json::Value,)>(
            "SELECT data FROM customers WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    async fn upsert_customer(
        &self,
        customer_id: &str,
        data: &serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO customers (customer_id, data, last_seen)
            VALUES ($1, $2, now())
            ON CONFLICT (customer_id)
            DO UPDATE SET data = $2, updated_at = now()
            "#,
        )
        .bind(customer_id)
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch_customer(&self, customer_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE customers SET last_seen = now() WHERE customer_id = $1")
            .bind(customer_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recommendations(
        &self,
        item_id: &str,
        limit: i64,
    ) -> Result<Vec<Recommendation>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, f64, f64)>(
            r#"
            SELECT i.item_id, i.name, i.price, r.confidence_score
            FROM item_recommendations r
            JOIN items i ON i.item_id = r.recommended_item_id
            WHERE r.source_item_id = $1
            ORDER BY r.confidence_score DESC
            LIMIT $2
            "#,
        )
        .bind(item_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(item_id, name, price, confidence_score)| Recommendation {
                item_id,
                name,
                price,
                confidence_score,
            })
            .collect())
    }

    async fn refresh_recommendations(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            WITH basket_pairs AS (
                SELECT
                    bi1.item_id AS item1,
                    bi2.item_id AS item2,
                    COUNT(*) AS pair_count,
                    COUNT(*) * 1.0 / (
                        SELECT COUNT(*) FROM basket_items WHERE item_id = bi1.item_id
                    ) AS confidence
                FROM basket_items bi1
                JOIN basket_items bi2 ON bi1.basket_id = bi2.basket_id
                WHERE bi1.item_id < bi2.item_id
                GROUP BY bi1.item_id, bi2.item_id
                HAVING COUNT(*) >= 2
            )
            INSERT INTO item_recommendations (source_item_id, recommended_item_id, confidence_score)
            SELECT item1, item2, confidence
            FROM basket_pairs
            WHERE confidence >= 0.1
            ON CONFLICT (source_item_id, recommended_item_id)
            DO UPDATE SET confidence_score = EXCLUDED.confidence_score, updated_at = now()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn apply(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        // Dropping `tx` on an early return rolls the batch back.
        let mut tx = self.pool.begin().await?;
        for write in &writes {
            execute(&mut tx, write).await?;
        }
        tx.commit().await?;

        debug!(statements = writes.len(), "PgStore: batch committed");
        Ok(())
    }
}
