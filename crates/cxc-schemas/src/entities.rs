//! Shared entity/DTO shapes, exchanged between engine crates and the HTTP
//! layer. These are plain data — no validation or persistence logic lives
//! here; each engine crate owns its own `sqlx::FromRow` row type and
//! `TryFrom`/`From` conversion into the relevant entity below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::{OddsCenti, Points};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileVisibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub description: Option<String>,
    pub alias: Option<String>,
    pub quote: Option<String>,
    pub visibility: ProfileVisibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub points: Points,
    pub banned: bool,
    pub banned_at: Option<DateTime<Utc>>,
    pub profile: UserProfile,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    Boolean,
    Number,
    Multiple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Open,
    Closed,
    Resolving,
    Resolved,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    pub creator_user_id: Uuid,
    pub group_id: Option<Uuid>,
    pub title: String,
    pub bet_type: BetType,
    pub closes_at: DateTime<Utc>,
    pub status: BetStatus,
    pub result_option_id: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetOption {
    pub id: Uuid,
    pub bet_id: Uuid,
    pub label: String,
    pub numeric_value: Option<f64>,
    pub current_odds: OddsCenti,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Sold,
    Settled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetPosition {
    pub id: Uuid,
    pub bet_id: Uuid,
    pub bet_option_id: Uuid,
    pub user_id: Uuid,
    pub stake_points: Points,
    pub odds_at_purchase: OddsCenti,
    pub status: PositionStatus,
    pub payout_points: Option<Points>,
    pub sold_points: Option<Points>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutJobStatus {
    Queued,
    Processing,
    RetryWait,
    Completed,
    Failed,
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutJob {
    pub id: Uuid,
    pub bet_id: Uuid,
    pub result_option_id: Uuid,
    pub resolved_by: Uuid,
    pub status: PayoutJobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub creator_user_id: Uuid,
    pub group_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub points_cost: Points,
    pub max_acceptances: Option<i32>,
    pub accepted_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferAcceptance {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub buyer_user_id: Uuid,
    pub fee_points: Points,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferReview {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub reviewer_user_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub action: String,
    pub reason: Option<String>,
    pub points_delta: Option<Points>,
    pub before_points: Option<Points>,
    pub after_points: Option<Points>,
    pub related_entity: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
}
