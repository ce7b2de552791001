//! Search index rows and search analytics
//!
//! Each searchable entity (project, task, file, user) has exactly one row in
//! `search_index`, upserted whenever the entity changes. Matching, scoring
//! and paging all happen here in SQL, using the expression from
//! [`crate::search::scoring::score_sql`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::search::scoring::score_sql;

const COLUMNS: &str = "id, organization_id, entity_type, entity_id, title, content, tags, \
                       metadata, created_at, updated_at";

/// Binds: $1 organization, $2 phrase, $3 terms, $4 entity types or NULL,
/// $5 project or NULL
const MATCH_CLAUSE: &str = r#"
    organization_id = $1
    AND (
        strpos(lower(title), $2) > 0
        OR EXISTS (SELECT 1 FROM unnest($3::text[]) AS term
                   WHERE strpos(lower(title), term) > 0
                      OR strpos(lower(content), term) > 0)
        OR EXISTS (SELECT 1 FROM unnest(tags) AS tag WHERE lower(tag) = ANY($3::text[]))
    )
    AND ($4::text[] IS NULL OR entity_type = ANY($4))
    AND ($5::uuid IS NULL
         OR entity_id = $5
         OR metadata->>'project_id' = $5::text)
"#;

/// Kind of entity an index row points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Project,
    Task,
    File,
    User,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Project,
        EntityType::Task,
        EntityType::File,
        EntityType::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Project => "project",
            EntityType::Task => "task",
            EntityType::File => "file",
            EntityType::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "project" | "projects" => Some(EntityType::Project),
            "task" | "tasks" => Some(EntityType::Task),
            "file" | "files" => Some(EntityType::File),
            "user" | "users" => Some(EntityType::User),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SearchDocument {
    pub id: Uuid,
    pub organization_id: Uuid,

    /// One of [`EntityType::as_str`]
    pub entity_type: String,

    pub entity_id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,

    /// Extra fields for result rendering (`project_id`, `status`, `mime_type`, ...)
    pub metadata: JsonValue,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SearchDocument {
    pub fn kind(&self) -> Option<EntityType> {
        EntityType::parse(&self.entity_type)
    }
}

/// Content to index for one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub organization_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub metadata: JsonValue,
}

/// Index row with its relevance score
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoredDocument {
    #[sqlx(flatten)]
    pub document: SearchDocument,
    pub score: f64,
}

/// Which rows a query matches
///
/// A row matches when its title contains the phrase, its title or content
/// contains any term, or one of its tags equals a term.
#[derive(Debug, Clone, Default)]
pub struct MatchFilter {
    /// Lowercase, whitespace-collapsed query
    pub phrase: String,

    /// Lowercase distinct terms
    pub terms: Vec<String>,

    /// Empty means all types
    pub types: Vec<EntityType>,

    /// Matches the project itself and rows whose metadata references it
    pub project_id: Option<Uuid>,
}

impl MatchFilter {
    fn type_names(&self) -> Option<Vec<&'static str>> {
        if self.types.is_empty() {
            None
        } else {
            Some(self.types.iter().map(EntityType::as_str).collect())
        }
    }
}

impl SearchDocument {
    /// Inserts or refreshes the row of one entity
    pub async fn upsert(pool: &PgPool, entry: IndexEntry) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, SearchDocument>(&format!(
            r#"
            INSERT INTO search_index
                (organization_id, entity_type, entity_id, title, content, tags, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (entity_type, entity_id) DO UPDATE SET
                title = EXCLUDED.title,
                content = EXCLUDED.content,
                tags = EXCLUDED.tags,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            RETURNING {COLUMNS}
            "#
        ))
        .bind(entry.organization_id)
        .bind(entry.entity_type.as_str())
        .bind(entry.entity_id)
        .bind(entry.title)
        .bind(entry.content)
        .bind(entry.tags)
        .bind(entry.metadata)
        .fetch_one(pool)
        .await
    }

    pub async fn remove(
        pool: &PgPool,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM search_index WHERE entity_type = $1 AND entity_id = $2")
                .bind(entity_type.as_str())
                .bind(entity_id)
                .execute(pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes index rows of tasks that no longer exist in a project
    pub async fn remove_orphaned_tasks(pool: &PgPool, project_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM search_index
            WHERE entity_type = 'task'
              AND metadata->>'project_id' = $1::text
              AND NOT EXISTS (SELECT 1 FROM tasks WHERE tasks.id = search_index.entity_id)
            "#,
        )
        .bind(project_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// One page of matching rows, best score first, newer first on ties
    pub async fn ranked(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &MatchFilter,
        now: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ScoredDocument>, sqlx::Error> {
        sqlx::query_as::<_, ScoredDocument>(&format!(
            r#"
            SELECT {COLUMNS}, {score} AS score
            FROM search_index
            WHERE {MATCH_CLAUSE}
            ORDER BY score DESC, updated_at DESC, id
            LIMIT $7 OFFSET $8
            "#,
            score = score_sql("$2", "$3", "$6"),
        ))
        .bind(organization_id)
        .bind(&filter.phrase)
        .bind(&filter.terms)
        .bind(filter.type_names())
        .bind(filter.project_id)
        .bind(now)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Number of rows [`SearchDocument::ranked`] pages over
    pub async fn count_matches(
        pool: &PgPool,
        organization_id: Uuid,
        filter: &MatchFilter,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM search_index WHERE {MATCH_CLAUSE}"
        ))
        .bind(organization_id)
        .bind(&filter.phrase)
        .bind(&filter.terms)
        .bind(filter.type_names())
        .bind(filter.project_id)
        .fetch_one(pool)
        .await
    }

    /// Distinct titles starting with `prefix` (case-insensitive)
    pub async fn suggest_titles(
        pool: &PgPool,
        organization_id: Uuid,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT title FROM (
                SELECT DISTINCT ON (lower(title)) title, updated_at
                FROM search_index
                WHERE organization_id = $1 AND lower(title) LIKE $2
                ORDER BY lower(title), updated_at DESC
            ) AS matches
            ORDER BY length(title), title
            LIMIT $3
            "#,
        )
        .bind(organization_id)
        .bind(format!(
            "{}%",
            super::user::escape_like(&prefix.to_lowercase())
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

/// One executed search
#[derive(Debug, Clone)]
pub struct SearchEvent {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub query: String,
    pub results_count: i32,
    pub took_ms: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueryCount {
    pub query: String,
    pub count: i64,
}

/// Aggregated search usage of an organization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchAnalytics {
    pub days: i32,
    pub total_searches: i64,
    pub average_took_ms: f64,
    pub top_queries: Vec<QueryCount>,
    pub zero_result_queries: Vec<QueryCount>,
}

impl SearchAnalytics {
    pub async fn record(pool: &PgPool, event: SearchEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO search_analytics (organization_id, user_id, query, results_count, took_ms)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.organization_id)
        .bind(event.user_id)
        .bind(event.query.chars().take(255).collect::<String>())
        .bind(event.results_count)
        .bind(event.took_ms)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Usage over the last `days` days
    pub async fn summarize(
        pool: &PgPool,
        organization_id: Uuid,
        days: i32,
        limit: i64,
    ) -> Result<Self, sqlx::Error> {
        let (total_searches, average_took_ms): (i64, f64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(AVG(took_ms), 0)::float8
            FROM search_analytics
            WHERE organization_id = $1 AND created_at > NOW() - make_interval(days => $2)
            "#,
        )
        .bind(organization_id)
        .bind(days)
        .fetch_one(pool)
        .await?;

        let top_queries = sqlx::query_as::<_, QueryCount>(
            r#"
            SELECT lower(query) AS query, COUNT(*) AS count
            FROM search_analytics
            WHERE organization_id = $1 AND created_at > NOW() - make_interval(days => $2)
            GROUP BY lower(query)
            ORDER BY count DESC, query
            LIMIT $3
            "#,
        )
        .bind(organization_id)
        .bind(days)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        let zero_result_queries = sqlx::query_as::<_, QueryCount>(
            r#"
            SELECT lower(query) AS query, COUNT(*) AS count
            FROM search_analytics
            WHERE organization_id = $1 AND results_count = 0
              AND created_at > NOW() - make_interval(days => $2)
            GROUP BY lower(query)
            ORDER BY count DESC, query
            LIMIT $3
            "#,
        )
        .bind(organization_id)
        .bind(days)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(SearchAnalytics {
            days,
            total_searches,
            average_took_ms,
            top_queries,
            zero_result_queries,
        })
    }
}
