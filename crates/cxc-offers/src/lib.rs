//! Offer engine: fixed-price sellable services.
//!
//! `accept_offer` is the one operation with real transactional weight —
//! everything else is plain CRUD over the `offers`/`offer_reviews` tables.
//! Grounded on the gateway idiom of evaluating every guard up front and
//! refusing with a typed reason before touching the ledger.

use sqlx::PgPool;
use uuid::Uuid;

use cxc_ledger::SuperAdminCache;
use cxc_schemas::{fee_on, Points};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferError {
    NotFound { offer_id: Uuid },
    NotActive { offer_id: Uuid },
    GroupAccessDenied { offer_id: Uuid },
    CapReached { offer_id: Uuid },
    CreatorCannotAcceptOwnOffer { offer_id: Uuid },
    InsufficientPoints { user_id: Uuid },
    DuplicateReview { offer_id: Uuid, reviewer_id: Uuid },
}

impl std::fmt::Display for OfferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { offer_id } => write!(f, "offer {offer_id} not found"),
            Self::NotActive { offer_id } => write!(f, "offer {offer_id} is not active"),
            Self::GroupAccessDenied { offer_id } => {
                write!(f, "offer {offer_id} is not visible to this user's groups")
            }
            Self::CapReached { offer_id } => write!(f, "offer {offer_id} has reached its cap"),
            Self::CreatorCannotAcceptOwnOffer { offer_id } => {
                write!(f, "offer {offer_id} cannot be accepted by its own creator")
            }
            Self::InsufficientPoints { user_id } => {
                write!(f, "user {user_id} has insufficient points")
            }
            Self::DuplicateReview { offer_id, reviewer_id } => {
                write!(f, "user {reviewer_id} already reviewed offer {offer_id}")
            }
        }
    }
}

impl std::error::Error for OfferError {}

#[derive(sqlx::FromRow)]
struct OfferRow {
    creator_user_id: Uuid,
    group_id: Option<Uuid>,
    points_cost: i64,
    max_acceptances: Option<i32>,
    accepted_count: i32,
    is_active: bool,
}

pub struct AcceptOutcome {
    pub acceptance_id: Uuid,
    pub fee: Points,
    pub total_charged: Points,
}

/// Accept `offer_id` on behalf of `buyer_user_id`. Runs entirely inside one
/// transaction: row-locks the offer, validates every guard, then moves
/// points buyer → creator and buyer → super-admin (fee).
pub async fn accept_offer(
    pool: &PgPool,
    super_admin: &SuperAdminCache,
    offer_id: Uuid,
    buyer_user_id: Uuid,
) -> anyhow::Result<Result<AcceptOutcome, OfferError>> {
    let mut tx = pool.begin().await?;

    let offer: Option<OfferRow> = sqlx::query_as(
        r#"
        select creator_user_id, group_id, points_cost, max_acceptances,
               accepted_count, is_active
        from offers where id = $1
        for update
        "#,
    )
    .bind(offer_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(offer) = offer else {
        return Ok(Err(OfferError::NotFound { offer_id }));
    };

    if !offer.is_active {
        return Ok(Err(OfferError::NotActive { offer_id }));
    }
    if offer.creator_user_id == buyer_user_id {
        return Ok(Err(OfferError::CreatorCannotAcceptOwnOffer { offer_id }));
    }
    if let Some(max) = offer.max_acceptances {
        if offer.accepted_count >= max {
            return Ok(Err(OfferError::CapReached { offer_id }));
        }
    }
    if !cxc_access::group_visible(pool, buyer_user_id, offer.group_id).await? {
        return Ok(Err(OfferError::GroupAccessDenied { offer_id }));
    }

    let points_cost = Points::new(offer.points_cost);
    let fee = fee_on(points_cost);
    let total = points_cost.saturating_add(fee);

    let super_admin_id = super_admin.get(pool).await?;

    let debit = cxc_ledger::apply_delta(
        &mut tx,
        buyer_user_id,
        Points::new(-total.raw()),
        "offer_accept_debit",
        Some(buyer_user_id),
        None,
        Some(offer_id.to_string()),
        serde_json::json!({ "offer_id": offer_id }),
    )
    .await;
    if debit.is_err() {
        return Ok(Err(OfferError::InsufficientPoints { user_id: buyer_user_id }));
    }

    cxc_ledger::apply_delta(
        &mut tx,
        offer.creator_user_id,
        points_cost,
        "offer_accept_credit",
        Some(buyer_user_id),
        None,
        Some(offer_id.to_string()),
        serde_json::json!({ "offer_id": offer_id }),
    )
    .await?;

    if fee.is_positive() {
        cxc_ledger::apply_delta(
            &mut tx,
            super_admin_id,
            fee,
            "offer_accept_fee",
            Some(buyer_user_id),
            None,
            Some(offer_id.to_string()),
            serde_json::json!({ "offer_id": offer_id }),
        )
        .await?;
    }

    let new_accepted_count = offer.accepted_count + 1;
    let still_active =
        offer.max_acceptances.is_none() || new_accepted_count < offer.max_acceptances.unwrap();

    sqlx::query("update offers set accepted_count = $1, is_active = $2 where id = $3")
        .bind(new_accepted_count)
        .bind(still_active)
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;

    let (acceptance_id,): (Uuid,) = sqlx::query_as(
        r#"
        insert into offer_acceptances (offer_id, buyer_user_id, fee_points)
        values ($1, $2, $3)
        returning id
        "#,
    )
    .bind(offer_id)
    .bind(buyer_user_id)
    .bind(fee.raw())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Ok(AcceptOutcome {
        acceptance_id,
        fee,
        total_charged: total,
    }))
}

/// Submit a 1-5 rating for an offer. One review per (offer, reviewer).
pub async fn submit_review(
    pool: &PgPool,
    offer_id: Uuid,
    reviewer_user_id: Uuid,
    rating: i16,
    comment: Option<String>,
) -> anyhow::Result<Result<Uuid, OfferError>> {
    let inserted: Option<(Uuid,)> = sqlx::query_as(
        r#"
        insert into offer_reviews (offer_id, reviewer_user_id, rating, comment)
        values ($1, $2, $3, $4)
        on conflict (offer_id, reviewer_user_id) do nothing
        returning id
        "#,
    )
    .bind(offer_id)
    .bind(reviewer_user_id)
    .bind(rating)
    .bind(comment)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some((id,)) => Ok(Ok(id)),
        None => Ok(Err(OfferError::DuplicateReview {
            offer_id,
            reviewer_id: reviewer_user_id,
        })),
    }
}

pub struct NewOffer {
    pub creator_user_id: Uuid,
    pub group_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub points_cost: Points,
    pub max_acceptances: Option<i32>,
}

pub async fn create_offer(pool: &PgPool, offer: NewOffer) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        insert into offers (creator_user_id, group_id, title, description, points_cost, max_acceptances)
        values ($1, $2, $3, $4, $5, $6)
        returning id
        "#,
    )
    .bind(offer.creator_user_id)
    .bind(offer.group_id)
    .bind(offer.title)
    .bind(offer.description)
    .bind(offer.points_cost.raw())
    .bind(offer.max_acceptances)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// List active offers visible to `user_id`: ungrouped offers plus offers
/// scoped to any group the user belongs to.
pub async fn list_visible_offers(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
    let group_ids = cxc_access::visible_group_ids(pool, user_id).await?;
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        select id from offers
        where is_active = true and (group_id is null or group_id = any($1))
        order by created_at desc
        "#,
    )
    .bind(&group_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
