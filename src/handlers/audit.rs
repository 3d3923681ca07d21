use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::Collection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{AppError, Result};
use crate::models::audit::{AuditLogEntry, AuditRecord};
use crate::models::events::{event_type, DomainEvent, TOPIC_AUDIT_LOGS};
use crate::models::user::Claims;
use crate::state::AppState;

/// Window within which a missed fraud broadcast is still surfaced by the
/// polling fallback.
const RECENT_FRAUD_WINDOW_SECONDS: i64 = 30;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub event_type: Option<String>,
    pub details: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    pub data: Vec<AuditLogEntry>,
    pub total_count: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAuditRequest {
    pub action: String,
    pub reference: Option<String>,
}

fn audit_collection(state: &AppState) -> Collection<AuditRecord> {
    state.db.collection("audit_history")
}

// GET /api/audit
pub async fn get_audit_logs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditPage>> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(10).clamp(1, 100);

    let mut filter = doc! { "userId": &claims.sub };

    if let Some(event_type) = query
        .event_type
        .as_deref()
        .filter(|t| !t.is_empty() && *t != "ALL")
    {
        filter.insert("action", event_type);
    }

    if let Some(details) = query.details.as_deref().filter(|d| !d.trim().is_empty()) {
        filter.insert("details", doc! { "$regex": details, "$options": "i" });
    }

    let mut range = Document::new();
    if let Some(start) = query.start_date.as_deref().filter(|s| !s.is_empty()) {
        let day = parse_day(start)?;
        range.insert(
            "$gte",
            mongodb::bson::DateTime::from_chrono(start_of_day(day)),
        );
    }
    if let Some(end) = query.end_date.as_deref().filter(|s| !s.is_empty()) {
        let day = parse_day(end)?;
        range.insert("$lte", mongodb::bson::DateTime::from_chrono(end_of_day(day)));
    }
    if !range.is_empty() {
        filter.insert("timestamp", range);
    }

    let collection = audit_collection(&state);
    let total_count = collection.count_documents(filter.clone()).await?;

    let records: Vec<AuditRecord> = collection
        .find(filter)
        .sort(doc! { "timestamp": -1 })
        .skip((page - 1) * page_size)
        .limit(page_size as i64)
        .await?
        .try_collect()
        .await?;

    Ok(Json(AuditPage {
        data: records.into_iter().map(Into::into).collect(),
        total_count,
        page,
        page_size,
        total_pages: total_pages(total_count, page_size),
    }))
}

// POST /api/audit/log
pub async fn log_client_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ClientAuditRequest>,
) -> Result<Json<Value>> {
    let action = req.action.trim();
    if action.is_empty() {
        return Err(AppError::invalid_data("Action is required."));
    }

    let event = DomainEvent::client_event(&claims.sub, action, req.reference.as_deref());
    if let Err(e) = state.events.publish(TOPIC_AUDIT_LOGS, &event).await {
        tracing::warn!("failed to publish client event {}: {}", action, e);
    }

    Ok(Json(json!({ "success": true })))
}

// GET /api/audit/recent-fraud
pub async fn recent_fraud(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>> {
    let cutoff = Utc::now() - Duration::seconds(RECENT_FRAUD_WINDOW_SECONDS);

    let filter = doc! {
        "userId": &claims.sub,
        "action": event_type::FRAUD_DETECTED,
        "timestamp": { "$gte": mongodb::bson::DateTime::from_chrono(cutoff) },
    };

    let alert = audit_collection(&state)
        .find_one(filter)
        .sort(doc! { "timestamp": -1 })
        .await?
        .map(AuditLogEntry::from);

    Ok(Json(json!({
        "hasRecentFraud": alert.is_some(),
        "alert": alert,
    })))
}

fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::invalid_data(format!("Invalid date: {}", value)))
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0).expect("valid midnight").and_utc()
}

/// End of the named day, so the range stays inclusive of it.
fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_milli_opt(23, 59, 59, 999)
        .expect("valid end of day")
        .and_utc()
}

fn total_pages(total_count: u64, page_size: u64) -> u64 {
    total_count.div_ceil(page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_bounds_cover_the_whole_day() {
        let day = parse_day("2024-07-15").unwrap();
        let start = start_of_day(day);
        let end = end_of_day(day);

        assert_eq!(start.to_rfc3339(), "2024-07-15T00:00:00+00:00");
        assert!(end > start);
        // A record at 23:59:59 on the end date is still inside the range.
        let late = day.and_hms_opt(23, 59, 59).unwrap().and_utc();
        assert!(late <= end);
        // Midnight of the following day is not.
        let next = parse_day("2024-07-16").unwrap();
        assert!(start_of_day(next) > end);
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse_day("15/07/2024").is_err());
        assert!(parse_day("not-a-date").is_err());
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(95, 10), 10);
    }
}
