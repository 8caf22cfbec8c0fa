//! SQLite store for facts, turns and summaries.
//!
//! Uses a single SQLite database file with three tables:
//! - `hard_facts`: append-only facts; only `active`/`superseded_at` ever change
//! - `conversation_turns`: keyed by `(project_id, turn_number)`
//! - `compacted_summaries`: one row per project, replaced by guarded upsert

use async_trait::async_trait;
use chiefops_core::conversation::{CompactedSummary, ConversationTurn, Role};
use chiefops_core::error::StoreError;
use chiefops_core::fact::{FactCategory, FactFilter, HardFact};
use chiefops_core::store::{PersistenceStore, SortOrder};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite-backed [`PersistenceStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a store from a connection string such as `sqlite://data.db`
    /// or `sqlite::memory:`.
    ///
    /// The database and all tables/indexes are created automatically.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?;
        Self::connect(options, url).await
    }

    /// Open (or create) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
                })?;
            }
        }
        let options = SqliteConnectOptions::new().filename(path);
        Self::connect(options, &path.display().to_string()).await
    }

    async fn connect(options: SqliteConnectOptions, label: &str) -> Result<Self, StoreError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {label}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        // Integer rowid gives a stable tie-breaker for equal created_at values
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hard_facts (
                iid           INTEGER PRIMARY KEY AUTOINCREMENT,
                fact_id       TEXT UNIQUE NOT NULL,
                project_id    TEXT,
                category      TEXT NOT NULL,
                content       TEXT NOT NULL,
                source        TEXT NOT NULL,
                confidence    REAL NOT NULL,
                entity_type   TEXT,
                entity_id     TEXT,
                active        INTEGER NOT NULL DEFAULT 1,
                supersedes    TEXT,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL,
                superseded_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("hard_facts table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_hard_facts_scope ON hard_facts(active, project_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("hard_facts index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_turns (
                project_id  TEXT NOT NULL,
                turn_number INTEGER NOT NULL,
                role        TEXT NOT NULL,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (project_id, turn_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversation_turns table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS compacted_summaries (
                project_id          TEXT PRIMARY KEY,
                summary             TEXT NOT NULL,
                turns_compacted     INTEGER NOT NULL,
                last_compacted_turn INTEGER NOT NULL,
                created_at          TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("compacted_summaries table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Fixed-width RFC 3339 so that text ordering equals time ordering.
    fn timestamp(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_timestamp(collection: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Corrupt {
                collection: collection.into(),
                reason: format!("bad timestamp '{raw}': {e}"),
            })
    }

    fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
    where
        T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
    {
        row.try_get(name)
            .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
    }

    fn row_to_fact(row: &SqliteRow) -> Result<HardFact, StoreError> {
        let category: String = Self::column(row, "category")?;
        let confidence: f64 = Self::column(row, "confidence")?;
        let active: i64 = Self::column(row, "active")?;
        let created_at: String = Self::column(row, "created_at")?;
        let updated_at: String = Self::column(row, "updated_at")?;
        let superseded_at: Option<String> = Self::column(row, "superseded_at")?;

        Ok(HardFact {
            fact_id: Self::column(row, "fact_id")?,
            project_id: Self::column(row, "project_id")?,
            category: FactCategory::parse_lossy(&category),
            content: Self::column(row, "content")?,
            source: Self::column(row, "source")?,
            confidence: confidence as f32,
            entity_type: Self::column(row, "entity_type")?,
            entity_id: Self::column(row, "entity_id")?,
            active: active != 0,
            supersedes: Self::column(row, "supersedes")?,
            created_at: Self::parse_timestamp("hard_facts", &created_at)?,
            updated_at: Self::parse_timestamp("hard_facts", &updated_at)?,
            superseded_at: superseded_at
                .as_deref()
                .map(|raw| Self::parse_timestamp("hard_facts", raw))
                .transpose()?,
        })
    }

    fn row_to_turn(row: &SqliteRow) -> Result<ConversationTurn, StoreError> {
        let role: String = Self::column(row, "role")?;
        let turn_number: i64 = Self::column(row, "turn_number")?;
        let created_at: String = Self::column(row, "created_at")?;

        Ok(ConversationTurn {
            project_id: Self::column(row, "project_id")?,
            turn_number: turn_number as u64,
            role: role.parse::<Role>().map_err(|reason| StoreError::Corrupt {
                collection: "conversation_turns".into(),
                reason,
            })?,
            content: Self::column(row, "content")?,
            created_at: Self::parse_timestamp("conversation_turns", &created_at)?,
        })
    }

    fn row_to_summary(row: &SqliteRow) -> Result<CompactedSummary, StoreError> {
        let turns_compacted: i64 = Self::column(row, "turns_compacted")?;
        let last_compacted_turn: i64 = Self::column(row, "last_compacted_turn")?;
        let created_at: String = Self::column(row, "created_at")?;

        Ok(CompactedSummary {
            project_id: Self::column(row, "project_id")?,
            summary: Self::column(row, "summary")?,
            turns_compacted: turns_compacted as u64,
            last_compacted_turn: last_compacted_turn as u64,
            created_at: Self::parse_timestamp("compacted_summaries", &created_at)?,
        })
    }
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_fact(&self, fact: &HardFact) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO hard_facts (
                fact_id, project_id, category, content, source, confidence,
                entity_type, entity_id, active, supersedes,
                created_at, updated_at, superseded_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&fact.fact_id)
        .bind(&fact.project_id)
        .bind(fact.category.as_str())
        .bind(&fact.content)
        .bind(&fact.source)
        .bind(fact.confidence as f64)
        .bind(&fact.entity_type)
        .bind(&fact.entity_id)
        .bind(fact.active as i64)
        .bind(&fact.supersedes)
        .bind(Self::timestamp(&fact.created_at))
        .bind(Self::timestamp(&fact.updated_at))
        .bind(fact.superseded_at.as_ref().map(Self::timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT fact failed: {e}")))?;

        debug!("Stored fact {}", fact.fact_id);
        Ok(())
    }

    async fn get_fact(&self, fact_id: &str) -> Result<Option<HardFact>, StoreError> {
        let row = sqlx::query("SELECT * FROM hard_facts WHERE fact_id = ?1")
            .bind(fact_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET fact: {e}")))?;

        row.as_ref().map(Self::row_to_fact).transpose()
    }

    async fn find_facts(&self, filter: &FactFilter) -> Result<Vec<HardFact>, StoreError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM hard_facts WHERE 1 = 1");

        if filter.active_only {
            query.push(" AND active = 1");
        }

        if !filter.all_scopes {
            match &filter.project_id {
                Some(project_id) => {
                    query
                        .push(" AND (project_id IS NULL OR project_id = ")
                        .push_bind(project_id.clone())
                        .push(")");
                }
                None => {
                    query.push(" AND project_id IS NULL");
                }
            }
        }

        if let Some(category) = filter.category {
            query.push(" AND category = ").push_bind(category.as_str());
        }

        if let Some((entity_type, entity_id)) = &filter.entity {
            query
                .push(" AND entity_type = ")
                .push_bind(entity_type.clone())
                .push(" AND entity_id = ")
                .push_bind(entity_id.clone());
        }

        query.push(" ORDER BY created_at ASC, iid ASC");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("FIND facts: {e}")))?;

        rows.iter().map(Self::row_to_fact).collect()
    }

    async fn deactivate_fact(&self, fact_id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let stamp = Self::timestamp(&at);
        let result = sqlx::query(
            "UPDATE hard_facts SET active = 0, superseded_at = ?1, updated_at = ?1 WHERE fact_id = ?2 AND active = 1",
        )
        .bind(&stamp)
        .bind(fact_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("DEACTIVATE fact failed: {e}")))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Either missing or already inactive
        let exists = sqlx::query("SELECT 1 FROM hard_facts WHERE fact_id = ?1")
            .bind(fact_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("EXISTS fact: {e}")))?;
        Ok(exists.is_some())
    }

    async fn append_turn(
        &self,
        project_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ConversationTurn, StoreError> {
        let created_at = Utc::now();

        // Single statement, so numbering stays gapless under concurrent writers
        let row = sqlx::query(
            r#"
            INSERT INTO conversation_turns (project_id, turn_number, role, content, created_at)
            SELECT ?1, COALESCE(MAX(turn_number), 0) + 1, ?2, ?3, ?4
            FROM conversation_turns
            WHERE project_id = ?1
            RETURNING turn_number
            "#,
        )
        .bind(project_id)
        .bind(role.as_str())
        .bind(content)
        .bind(Self::timestamp(&created_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("APPEND turn failed: {e}")))?;

        let turn_number: i64 = Self::column(&row, "turn_number")?;

        Ok(ConversationTurn {
            project_id: project_id.to_string(),
            turn_number: turn_number as u64,
            role,
            content: content.to_string(),
            created_at,
        })
    }

    async fn count_turns(&self, project_id: &str, after_turn: u64) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM conversation_turns WHERE project_id = ?1 AND turn_number > ?2",
        )
        .bind(project_id)
        .bind(after_turn as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("COUNT turns: {e}")))?;

        let cnt: i64 = Self::column(&row, "cnt")?;
        Ok(cnt as u64)
    }

    async fn list_turns(
        &self,
        project_id: &str,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let sql = match order {
            SortOrder::Ascending => {
                "SELECT * FROM conversation_turns WHERE project_id = ?1 ORDER BY turn_number ASC LIMIT ?2"
            }
            SortOrder::Descending => {
                "SELECT * FROM conversation_turns WHERE project_id = ?1 ORDER BY turn_number DESC LIMIT ?2"
            }
        };
        // SQLite treats a negative LIMIT as unlimited
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let rows = sqlx::query(sql)
            .bind(project_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("LIST turns: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn get_summary(&self, project_id: &str) -> Result<Option<CompactedSummary>, StoreError> {
        let row = sqlx::query("SELECT * FROM compacted_summaries WHERE project_id = ?1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET summary: {e}")))?;

        row.as_ref().map(Self::row_to_summary).transpose()
    }

    async fn upsert_summary(&self, summary: &CompactedSummary) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO compacted_summaries (project_id, summary, turns_compacted, last_compacted_turn, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(project_id) DO UPDATE SET
                summary = excluded.summary,
                turns_compacted = excluded.turns_compacted,
                last_compacted_turn = excluded.last_compacted_turn,
                created_at = excluded.created_at
            WHERE excluded.last_compacted_turn >= compacted_summaries.last_compacted_turn
            "#,
        )
        .bind(&summary.project_id)
        .bind(&summary.summary)
        .bind(summary.turns_compacted as i64)
        .bind(summary.last_compacted_turn as i64)
        .bind(Self::timestamp(&summary.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPSERT summary failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}
