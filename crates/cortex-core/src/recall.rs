//! Recent Work Recall
//!
//! "What did I work on this week?" without a search query: a day-grouped
//! timeline of recent notes and session summaries (optionally code) with
//! initiative context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::documents::MetadataExt;
use crate::services::Services;
use crate::store::{Filter, StoreError};

/// Default look-back window (days)
pub const DEFAULT_DAYS: i64 = 7;

/// Default item cap
pub const DEFAULT_LIMIT: usize = 20;

// ============================================================================
// RESPONSE SHAPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RecallItem {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub created_at: String,
    pub date: String,
    pub time: String,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub initiative_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub initiative_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct RecallDay {
    pub date: String,
    pub day_name: String,
    pub display_date: String,
    pub items: Vec<RecallItem>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct InitiativeActivity {
    pub name: String,
    pub activity_count: usize,
}

#[derive(Debug, Serialize)]
pub struct RecallResponse {
    pub repository: String,
    pub period: String,
    pub total_items: usize,
    pub timeline: Vec<RecallDay>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub initiatives_active: Vec<InitiativeActivity>,
}

// ============================================================================
// RECALL
// ============================================================================

/// Build the recent-work timeline for a repository.
pub fn recall_recent_work(
    services: &Services,
    repository: &str,
    days: i64,
    limit: usize,
    include_code: bool,
) -> Result<RecallResponse, StoreError> {
    tracing::info!("Recalling recent work for {}, last {} days", repository, days);

    let mut types = vec!["session_summary", "note"];
    if include_code {
        types.push("code");
    }

    let filter = Filter::and(vec![
        Filter::eq("repository", repository),
        Filter::is_in("type", types),
    ]);
    let results = services.store.get_where(Some(&filter), None)?;

    let cutoff = Utc::now() - chrono::Duration::days(days);
    let mut items: Vec<RecallItem> = vec![];

    for ((id, text), meta) in results
        .ids
        .into_iter()
        .zip(results.texts)
        .zip(results.metadatas)
    {
        let Some(created_at) = meta.str_of("created_at").map(str::to_string) else {
            continue;
        };
        let Ok(created) = DateTime::parse_from_rfc3339(&created_at) else {
            continue;
        };
        let created = created.with_timezone(&Utc);
        if created < cutoff {
            continue;
        }

        let content = if text.chars().count() > 500 {
            let truncated: String = text.chars().take(500).collect();
            format!("{truncated}...")
        } else {
            text
        };

        items.push(RecallItem {
            id,
            doc_type: meta.str_of("type").unwrap_or("").to_string(),
            date: created.format("%Y-%m-%d").to_string(),
            time: created.format("%H:%M").to_string(),
            created_at,
            title: meta.str_of("title").unwrap_or("").to_string(),
            initiative_id: meta.str_of("initiative_id").unwrap_or("").to_string(),
            initiative_name: meta.str_of("initiative_name").unwrap_or("").to_string(),
            files: meta.json_list_of("files"),
            content,
        });
    }

    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items.truncate(limit);

    // Group by day, newest day first
    let mut by_day: BTreeMap<String, Vec<RecallItem>> = BTreeMap::new();
    for item in &items {
        by_day.entry(item.date.clone()).or_default().push(item.clone());
    }

    let timeline: Vec<RecallDay> = by_day
        .into_iter()
        .rev()
        .map(|(date, day_items)| {
            let (day_name, display_date) =
                match chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
                    Ok(parsed) => (
                        parsed.format("%A").to_string(),
                        parsed.format("%b %d").to_string(),
                    ),
                    Err(_) => (String::new(), date.clone()),
                };
            RecallDay {
                date,
                day_name,
                display_date,
                count: day_items.len(),
                items: day_items,
            }
        })
        .collect();

    // Initiative activity counts, busiest first
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for item in &items {
        if !item.initiative_name.is_empty() {
            *counts.entry(item.initiative_name.clone()).or_default() += 1;
        }
    }
    let mut initiatives_active: Vec<InitiativeActivity> = counts
        .into_iter()
        .map(|(name, activity_count)| InitiativeActivity { name, activity_count })
        .collect();
    initiatives_active.sort_by(|a, b| b.activity_count.cmp(&a.activity_count));

    tracing::info!("Recalled {} items across {} days", items.len(), timeline.len());

    Ok(RecallResponse {
        repository: repository.to_string(),
        period: format!("Last {days} days"),
        total_items: items.len(),
        timeline,
        initiatives_active,
    })
}
