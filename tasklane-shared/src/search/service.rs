use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use super::cache::{result_key, SearchCache};
use super::query::ParsedQuery;
use super::SearchError;
use crate::models::file::FileRecord;
use crate::models::project::Project;
use crate::models::search_index::{
    EntityType, IndexEntry, MatchFilter, ScoredDocument, SearchAnalytics, SearchDocument,
    SearchEvent,
};
use crate::models::task::Task;
use crate::models::user::User;

/// Characters of content returned with each hit
const SNIPPET_LENGTH: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub types: Vec<EntityType>,
    pub project_id: Option<Uuid>,
    pub limit: usize,
    pub offset: usize,
}

impl SearchRequest {
    /// Stable digest of everything that shapes a result page
    fn fingerprint(&self, query: &ParsedQuery) -> String {
        let mut types: Vec<&str> = self.types.iter().map(EntityType::as_str).collect();
        types.sort_unstable();
        types.dedup();

        let raw = format!(
            "{}|{}|{}|{}|{}",
            query.phrase,
            types.join(","),
            self.project_id.map(|p| p.to_string()).unwrap_or_default(),
            self.limit,
            self.offset
        );
        hex::encode(Sha256::digest(raw.as_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub title: String,
    pub snippet: String,
    pub tags: Vec<String>,
    pub metadata: JsonValue,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub items: Vec<SearchHit>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub took_ms: u64,
    pub cached: bool,
}

fn snippet(content: &str) -> String {
    let mut out: String = content.chars().take(SNIPPET_LENGTH).collect();
    if content.chars().nth(SNIPPET_LENGTH).is_some() {
        out.push('…');
    }
    out
}

/// Turns a scored row into a hit; rows with an unknown entity type are dropped
fn into_hit(scored: ScoredDocument) -> Option<SearchHit> {
    let doc = scored.document;
    let entity_type = doc.kind()?;
    Some(SearchHit {
        entity_type,
        entity_id: doc.entity_id,
        title: doc.title,
        snippet: snippet(&doc.content),
        tags: doc.tags,
        metadata: doc.metadata,
        score: (scored.score * 1000.0).round() / 1000.0,
        updated_at: doc.updated_at,
    })
}

pub fn project_entry(project: &Project) -> IndexEntry {
    IndexEntry {
        organization_id: project.organization_id,
        entity_type: EntityType::Project,
        entity_id: project.id,
        title: project.name.clone(),
        content: project.description.clone().unwrap_or_default(),
        tags: Vec::new(),
        metadata: json!({
            "status": project.status.as_str(),
            "color": project.color,
        }),
    }
}

pub fn task_entry(task: &Task) -> IndexEntry {
    IndexEntry {
        organization_id: task.organization_id,
        entity_type: EntityType::Task,
        entity_id: task.id,
        title: task.title.clone(),
        content: task.description.clone().unwrap_or_default(),
        tags: task.tags.clone(),
        metadata: json!({
            "project_id": task.project_id,
            "status": task.status.as_str(),
            "priority": task.priority.as_str(),
            "assignee_id": task.assignee_id,
        }),
    }
}

pub fn file_entry(file: &FileRecord) -> IndexEntry {
    IndexEntry {
        organization_id: file.organization_id,
        entity_type: EntityType::File,
        entity_id: file.id,
        title: file.original_name.clone(),
        content: file.mime_type.clone(),
        tags: Vec::new(),
        metadata: json!({
            "project_id": file.project_id,
            "task_id": file.task_id,
            "mime_type": file.mime_type,
            "size_bytes": file.size_bytes,
        }),
    }
}

pub fn user_entry(user: &User) -> IndexEntry {
    IndexEntry {
        organization_id: user.organization_id,
        entity_type: EntityType::User,
        entity_id: user.id,
        title: user.name.clone(),
        content: user.email.clone(),
        tags: Vec::new(),
        metadata: json!({
            "role": user.role.as_str(),
            "avatar_url": user.avatar_url,
        }),
    }
}

#[derive(Clone)]
pub struct SearchService {
    pool: PgPool,
    cache: SearchCache,
}

impl SearchService {
    pub fn new(pool: PgPool, cache: SearchCache) -> Self {
        Self { pool, cache }
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    async fn invalidate(&self, organization_id: Uuid) {
        if let Err(e) = self.cache.invalidate(organization_id).await {
            tracing::warn!(error = %e, org_id = %organization_id, "failed to invalidate search cache");
        }
    }

    async fn upsert(&self, entry: IndexEntry) -> Result<(), SearchError> {
        let organization_id = entry.organization_id;
        SearchDocument::upsert(&self.pool, entry).await?;
        self.invalidate(organization_id).await;
        Ok(())
    }

    pub async fn index_project(&self, project: &Project) -> Result<(), SearchError> {
        self.upsert(project_entry(project)).await
    }

    pub async fn index_task(&self, task: &Task) -> Result<(), SearchError> {
        self.upsert(task_entry(task)).await
    }

    pub async fn index_file(&self, file: &FileRecord) -> Result<(), SearchError> {
        self.upsert(file_entry(file)).await
    }

    pub async fn index_user(&self, user: &User) -> Result<(), SearchError> {
        self.upsert(user_entry(user)).await
    }

    pub async fn remove(
        &self,
        organization_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<(), SearchError> {
        SearchDocument::remove(&self.pool, entity_type, entity_id).await?;
        self.invalidate(organization_id).await;
        Ok(())
    }

    /// Removes a deleted project and the rows of its cascaded tasks
    pub async fn remove_project(
        &self,
        organization_id: Uuid,
        project_id: Uuid,
    ) -> Result<(), SearchError> {
        SearchDocument::remove(&self.pool, EntityType::Project, project_id).await?;
        let tasks = SearchDocument::remove_orphaned_tasks(&self.pool, project_id).await?;
        tracing::debug!(project_id = %project_id, tasks, "removed project from search index");
        self.invalidate(organization_id).await;
        Ok(())
    }

    #[tracing::instrument(skip(self, req), fields(q = %req.query))]
    pub async fn search(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        req: &SearchRequest,
    ) -> Result<SearchResults, SearchError> {
        let started = Instant::now();
        let query = ParsedQuery::parse(&req.query)?;

        let key = match self.cache.generation(organization_id).await {
            Ok(generation) => Some(result_key(
                organization_id,
                generation,
                &req.fingerprint(&query),
            )),
            Err(e) => {
                tracing::warn!(error = %e, "search cache unavailable");
                None
            }
        };

        let cached = match &key {
            Some(key) => match self.cache.get(key).await {
                Ok(Some(raw)) => serde_json::from_str::<SearchResults>(&raw).ok(),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "search cache read failed");
                    None
                }
            },
            None => None,
        };

        let mut results = match cached {
            Some(mut results) => {
                results.cached = true;
                results
            }
            None => {
                let filter = MatchFilter {
                    phrase: query.phrase.clone(),
                    terms: query.terms.clone(),
                    types: req.types.clone(),
                    project_id: req.project_id,
                };
                let total = SearchDocument::count_matches(&self.pool, organization_id, &filter)
                    .await?;
                let items: Vec<SearchHit> = if total > 0 {
                    SearchDocument::ranked(
                        &self.pool,
                        organization_id,
                        &filter,
                        Utc::now(),
                        i64::try_from(req.limit).unwrap_or(i64::MAX),
                        i64::try_from(req.offset).unwrap_or(i64::MAX),
                    )
                    .await?
                    .into_iter()
                    .filter_map(into_hit)
                    .collect()
                } else {
                    Vec::new()
                };
                let total = usize::try_from(total).unwrap_or(0);

                let results = SearchResults {
                    query: query.phrase.clone(),
                    items,
                    total,
                    limit: req.limit,
                    offset: req.offset,
                    took_ms: 0,
                    cached: false,
                };

                if let Some(key) = &key {
                    match serde_json::to_string(&results) {
                        Ok(raw) => {
                            if let Err(e) = self.cache.set(key, raw).await {
                                tracing::warn!(error = %e, "search cache write failed");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to encode search results"),
                    }
                }
                results
            }
        };

        results.took_ms = started.elapsed().as_millis() as u64;

        let event = SearchEvent {
            organization_id,
            user_id,
            query: query.phrase,
            results_count: i32::try_from(results.total).unwrap_or(i32::MAX),
            took_ms: i32::try_from(results.took_ms).unwrap_or(i32::MAX),
        };
        if let Err(e) = SearchAnalytics::record(&self.pool, event).await {
            tracing::warn!(error = %e, "failed to record search analytics");
        }

        Ok(results)
    }

    pub async fn suggestions(
        &self,
        organization_id: Uuid,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<String>, SearchError> {
        let query = ParsedQuery::parse(prefix)?;
        Ok(SearchDocument::suggest_titles(&self.pool, organization_id, &query.phrase, limit).await?)
    }

    pub async fn analytics(
        &self,
        organization_id: Uuid,
        days: i32,
        limit: i64,
    ) -> Result<SearchAnalytics, SearchError> {
        Ok(SearchAnalytics::summarize(&self.pool, organization_id, days, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(entity_type: &str, title: &str, score: f64) -> ScoredDocument {
        let now = Utc::now();
        ScoredDocument {
            document: SearchDocument {
                id: Uuid::new_v4(),
                organization_id: Uuid::new_v4(),
                entity_type: entity_type.to_string(),
                entity_id: Uuid::new_v4(),
                title: title.to_string(),
                content: "x".repeat(SNIPPET_LENGTH * 2),
                tags: vec!["ops".into()],
                metadata: json!({}),
                created_at: now,
                updated_at: now,
            },
            score,
        }
    }

    #[test]
    fn test_into_hit() {
        let hit = into_hit(scored("project", "Billing", 13.49987)).unwrap();
        assert_eq!(hit.entity_type, EntityType::Project);
        assert_eq!(hit.title, "Billing");
        assert_eq!(hit.score, 13.5);
        assert_eq!(hit.tags, vec!["ops"]);
        assert_eq!(hit.snippet.chars().count(), SNIPPET_LENGTH + 1);
    }

    #[test]
    fn test_into_hit_drops_unknown_types() {
        assert!(into_hit(scored("widget", "Alpha", 5.0)).is_none());
    }

    #[test]
    fn test_snippet_truncates() {
        assert_eq!(snippet("short"), "short");
        let long = "a".repeat(SNIPPET_LENGTH + 10);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), SNIPPET_LENGTH + 1);
        assert!(s.ends_with('…'));
    }

    #[test]
    fn test_fingerprint_ignores_type_order() {
        let query = ParsedQuery::parse("roadmap").unwrap();
        let a = SearchRequest {
            query: "roadmap".into(),
            types: vec![EntityType::Task, EntityType::Project],
            limit: 20,
            ..Default::default()
        };
        let b = SearchRequest {
            types: vec![EntityType::Project, EntityType::Task],
            ..a.clone()
        };
        let c = SearchRequest {
            offset: 20,
            ..a.clone()
        };

        assert_eq!(a.fingerprint(&query), b.fingerprint(&query));
        assert_ne!(a.fingerprint(&query), c.fingerprint(&query));
    }

    #[test]
    fn test_task_entry_metadata() {
        let task = Task {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            assignee_id: None,
            reporter_id: None,
            title: "Write docs".into(),
            description: Some("API reference".into()),
            status: Default::default(),
            priority: Default::default(),
            due_date: None,
            position: 0,
            tags: vec!["docs".into()],
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let entry = task_entry(&task);
        assert_eq!(entry.entity_type, EntityType::Task);
        assert_eq!(entry.content, "API reference");
        assert_eq!(entry.metadata["project_id"], json!(task.project_id));
        assert_eq!(entry.metadata["status"], "todo");
    }
}
