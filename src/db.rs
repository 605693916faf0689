use std::collections::HashMap;

use anyhow::Context;
use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Action, ProjectDocument, NEW_PROJECT_COMMAND};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let now_ms = Utc::now().timestamp_millis();
    let days_ago = |days: i64| now_ms - Duration::days(days).num_milliseconds();

    let projects = vec![
        (
            Uuid::parse_str("8f4a2a5e-5b0c-4c37-9f2a-1f9d0a6c1e01")?,
            "a1b2c3-hash",
            "seed-project-001",
        ),
        (
            Uuid::parse_str("2c6d9b1f-7e43-4a8e-b1d0-4c0a7e5f2b02")?,
            "a1b2c3-hash",
            "seed-project-002",
        ),
        (
            Uuid::parse_str("6e1f8c3a-0d25-4b7c-8e9a-7b3c5d1a4f03")?,
            "d4e5f6-hash",
            "seed-project-003",
        ),
    ];

    for (id, user_hash, source_key) in &projects {
        sqlx::query(
            r#"
            INSERT INTO patent_metrics.projects (id, user_hash, source_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (source_key) DO UPDATE
            SET user_hash = EXCLUDED.user_hash
            "#,
        )
        .bind(id)
        .bind(user_hash)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let actions = vec![
        ("seed-project-001", "a01", NEW_PROJECT_COMMAND, days_ago(20)),
        ("seed-project-001", "a02", "search", days_ago(20)),
        ("seed-project-001", "a03", "savePatent", days_ago(3)),
        ("seed-project-002", "a01", NEW_PROJECT_COMMAND, days_ago(2)),
        ("seed-project-002", "a02", "bookmarkPatent", days_ago(0)),
        ("seed-project-003", "a01", NEW_PROJECT_COMMAND, days_ago(40)),
        ("seed-project-003", "a02", "search", days_ago(40)),
    ];

    for (project_key, action_key, command, occurred_at_ms) in actions {
        let project_id: Uuid = sqlx::query(
            "SELECT id FROM patent_metrics.projects WHERE source_key = $1",
        )
        .bind(project_key)
        .fetch_one(pool)
        .await?
        .get("id");

        sqlx::query(
            r#"
            INSERT INTO patent_metrics.actions
            (id, project_id, action_key, command, occurred_at_ms)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (project_id, action_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(action_key)
        .bind(command)
        .bind(occurred_at_ms)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// One bulk read of every project and its action history. If this query
/// fails the whole reporting run fails; no partial table is produced.
pub async fn fetch_projects(pool: &PgPool) -> anyhow::Result<Vec<ProjectDocument>> {
    let records = sqlx::query(
        "SELECT p.id, p.user_hash, a.action_key, a.command, a.occurred_at_ms \
         FROM patent_metrics.projects p \
         LEFT JOIN patent_metrics.actions a ON a.project_id = p.id \
         ORDER BY p.id",
    )
    .fetch_all(pool)
    .await
    .context("bulk project read failed")?;

    let mut documents: Vec<ProjectDocument> = Vec::new();
    let mut positions: HashMap<Uuid, usize> = HashMap::new();

    for row in records {
        let project_id: Uuid = row.get("id");
        let position = *positions.entry(project_id).or_insert_with(|| {
            documents.push(ProjectDocument {
                user_hash: row.get("user_hash"),
                history: HashMap::new(),
            });
            documents.len() - 1
        });

        // Projects without actions come back with NULL action columns.
        let action_key: Option<String> = row.get("action_key");
        if let Some(action_key) = action_key {
            documents[position].history.insert(
                action_key,
                Action {
                    command: row.get("command"),
                    occurred_at_ms: row.get("occurred_at_ms"),
                },
            );
        }
    }

    Ok(documents)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        user_hash: String,
        project_key: String,
        action_key: String,
        command: String,
        occurred_at_ms: i64,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let project_id: Uuid = sqlx::query(
            r#"
            INSERT INTO patent_metrics.projects (id, user_hash, source_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (source_key) DO UPDATE
            SET user_hash = EXCLUDED.user_hash
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.user_hash)
        .bind(&row.project_key)
        .fetch_one(pool)
        .await?
        .get("id");

        let result = sqlx::query(
            r#"
            INSERT INTO patent_metrics.actions
            (id, project_id, action_key, command, occurred_at_ms)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (project_id, action_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(&row.action_key)
        .bind(&row.command)
        .bind(row.occurred_at_ms)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
