//! Relevance scoring
//!
//! The score of an index row is a sum of independent signals. The phrase
//! signals are tiered: a row earns only the best of exact title, title
//! prefix or title substring.
//!
//! Scores are computed by PostgreSQL so every matching row is ranked
//! before a page is cut. [`score_sql`] renders the expression from the
//! weights below.

use crate::models::search_index::EntityType;

pub const EXACT_TITLE: f64 = 10.0;
pub const TITLE_PREFIX: f64 = 5.0;
pub const TITLE_CONTAINS: f64 = 3.0;
pub const TERM_IN_TITLE: f64 = 2.0;
pub const TERM_IN_CONTENT: f64 = 1.0;
pub const TAG_MATCH: f64 = 2.0;

/// Days over which the recency bonus decays to zero
pub const RECENCY_WINDOW_DAYS: f64 = 30.0;

pub fn type_weight(entity_type: EntityType) -> f64 {
    match entity_type {
        EntityType::Project => 1.5,
        EntityType::Task => 1.0,
        EntityType::File | EntityType::User => 0.5,
    }
}

fn literal(value: f64) -> String {
    format!("{:?}::float8", value)
}

/// SQL expression scoring one `search_index` row.
///
/// `phrase` is the placeholder of the lowercase phrase (`text`), `terms`
/// of the lowercase terms (`text[]`) and `now` of the reference time
/// (`timestamptz`). The recency bonus is `1.0` for a row updated at `now`
/// and falls linearly to `0.0` at [`RECENCY_WINDOW_DAYS`].
pub fn score_sql(phrase: &str, terms: &str, now: &str) -> String {
    let type_weights: String = EntityType::ALL
        .iter()
        .map(|t| format!(" WHEN '{}' THEN {}", t.as_str(), literal(type_weight(*t))))
        .collect();

    format!(
        r#"(
            CASE
                WHEN lower(title) = {phrase} THEN {exact}
                WHEN strpos(lower(title), {phrase}) = 1 THEN {prefix}
                WHEN strpos(lower(title), {phrase}) > 0 THEN {contains}
                ELSE 0::float8
            END
            + {term_title} * (SELECT count(*) FROM unnest({terms}::text[]) AS term
                              WHERE strpos(lower(title), term) > 0)
            + {term_content} * (SELECT count(*) FROM unnest({terms}::text[]) AS term
                                WHERE strpos(lower(content), term) > 0)
            + {tag} * (SELECT count(*) FROM unnest(tags) AS tag
                       WHERE lower(tag) = ANY({terms}::text[]))
            + CASE entity_type{type_weights} ELSE 0::float8 END
            + GREATEST(0::float8, 1::float8
                - GREATEST(0::float8, EXTRACT(EPOCH FROM ({now} - updated_at))::float8)
                  / 86400::float8 / {window})
        )::float8"#,
        exact = literal(EXACT_TITLE),
        prefix = literal(TITLE_PREFIX),
        contains = literal(TITLE_CONTAINS),
        term_title = literal(TERM_IN_TITLE),
        term_content = literal(TERM_IN_CONTENT),
        tag = literal(TAG_MATCH),
        window = literal(RECENCY_WINDOW_DAYS),
    )
}
