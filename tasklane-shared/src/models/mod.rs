/// Database models for Tasklane
///
/// Each model owns its SQL. Queries for tenant-owned rows always take the
/// caller's `organization_id` so rows of other organizations behave as if
/// they did not exist.
///
/// # Models
///
/// - `organization`: Tenants and dashboard statistics
/// - `user`: User accounts and the role hierarchy
/// - `project`: Projects and their task statistics
/// - `task`: Kanban tasks with dense per-column positions
/// - `file`: Uploaded file metadata
/// - `notification`: In-app notifications
/// - `settings`: Per-user preferences
/// - `search_index`: Search index rows and search analytics
///
/// # Example
///
/// ```no_run
/// use tasklane_shared::models::project::{Project, ProjectFilter};
/// use tasklane_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example(organization_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let projects = Project::list(&pool, organization_id, &ProjectFilter::default(), 20, 0).await?;
/// # Ok(())
/// # }
/// ```
use serde::{Deserialize, Deserializer};

pub mod file;
pub mod notification;
pub mod organization;
pub mod project;
pub mod search_index;
pub mod settings;
pub mod task;
pub mod user;

/// Deserializes a present field (including an explicit `null`) as `Some`.
///
/// Combined with `#[serde(default)]` this separates "key absent" (`None`)
/// from "key set to null" (`Some(None)`) for nullable columns.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        value: Option<Option<i32>>,
    }

    #[test]
    fn test_double_option() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.value, None);

        let null: Patch = serde_json::from_str(r#"{"value": null}"#).unwrap();
        assert_eq!(null.value, Some(None));

        let set: Patch = serde_json::from_str(r#"{"value": 3}"#).unwrap();
        assert_eq!(set.value, Some(Some(3)));
    }
}
