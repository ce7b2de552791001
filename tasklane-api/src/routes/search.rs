/// Search endpoints
///
/// - `GET /v1/search?q=&types=task,project&project_id=&limit=&offset=`
/// - `GET /v1/search/suggestions?q=&limit=` - Title completions
/// - `GET /v1/search/analytics?days=&limit=` - Usage summary (admin+)
///
/// `page` may be given instead of `offset`; it is converted using `limit`.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tasklane_shared::{
    auth::{authorization::require_role, middleware::AuthContext},
    models::{
        search_index::{EntityType, SearchAnalytics},
        user::UserRole,
    },
    search::{SearchError, SearchRequest, SearchResults},
};
use uuid::Uuid;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;
const DEFAULT_SUGGESTIONS: i64 = 10;
const MAX_SUGGESTIONS: i64 = 50;
const DEFAULT_ANALYTICS_DAYS: i32 = 30;
const MAX_ANALYTICS_DAYS: i32 = 365;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,

    /// Comma-separated entity types
    pub types: Option<String>,

    pub project_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub page: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestionsQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub days: Option<i32>,
    pub limit: Option<i64>,
}

fn parse_types(raw: Option<&str>) -> Result<Vec<EntityType>, SearchError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    let mut types = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let kind = EntityType::parse(part).ok_or_else(|| SearchError::UnknownType(part.to_string()))?;
        if !types.contains(&kind) {
            types.push(kind);
        }
    }
    Ok(types)
}

impl SearchQuery {
    fn into_request(self) -> Result<SearchRequest, SearchError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = match (self.offset, self.page) {
            (Some(offset), _) => offset,
            (None, Some(page)) => page.max(1).saturating_sub(1).saturating_mul(limit),
            (None, None) => 0,
        };

        Ok(SearchRequest {
            types: parse_types(self.types.as_deref())?,
            query: self.q,
            project_id: self.project_id,
            limit,
            offset,
        })
    }
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResults>> {
    let request = query.into_request()?;

    let results = state
        .search
        .search(auth.organization_id, auth.user_id, &request)
        .await?;

    tracing::debug!(
        total = results.total,
        cached = results.cached,
        took_ms = results.took_ms,
        "Search served"
    );

    Ok(Json(results))
}

pub async fn suggestions(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<SuggestionsQuery>,
) -> ApiResult<Json<SuggestionsResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SUGGESTIONS)
        .clamp(1, MAX_SUGGESTIONS);

    let suggestions = state
        .search
        .suggestions(auth.organization_id, &query.q, limit)
        .await?;

    Ok(Json(SuggestionsResponse { suggestions }))
}

pub async fn analytics(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<SearchAnalytics>> {
    require_role(&auth, UserRole::Admin)?;

    let days = query
        .days
        .unwrap_or(DEFAULT_ANALYTICS_DAYS)
        .clamp(1, MAX_ANALYTICS_DAYS);
    let limit = query.limit.unwrap_or(DEFAULT_SUGGESTIONS).clamp(1, MAX_SUGGESTIONS);

    let summary = state
        .search
        .analytics(auth.organization_id, days, limit)
        .await?;

    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_types() {
        assert!(parse_types(None).unwrap().is_empty());
        assert_eq!(
            parse_types(Some("task, projects,task")).unwrap(),
            vec![EntityType::Task, EntityType::Project]
        );
        assert!(matches!(
            parse_types(Some("task,widget")),
            Err(SearchError::UnknownType(t)) if t == "widget"
        ));
    }

    #[test]
    fn test_page_converts_to_offset() {
        let req = SearchQuery {
            q: "roadmap".into(),
            limit: Some(10),
            page: Some(3),
            ..Default::default()
        }
        .into_request()
        .unwrap();
        assert_eq!((req.limit, req.offset), (10, 20));

        let req = SearchQuery {
            q: "roadmap".into(),
            limit: Some(500),
            offset: Some(7),
            page: Some(3),
            ..Default::default()
        }
        .into_request()
        .unwrap();
        assert_eq!((req.limit, req.offset), (100, 7));
    }
}
