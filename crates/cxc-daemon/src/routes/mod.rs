pub mod admin;
pub mod bets;
pub mod health;
pub mod me;
pub mod offers;
pub mod users;

use axum::routing::{get, patch, post};
use axum::Router;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let offers = Router::new()
        .route("/", post(offers::create_offer).get(offers::list_offers))
        .route("/:id", get(offers::get_offer))
        .route("/:id/accept", post(offers::accept_offer))
        .route(
            "/:id/reviews",
            get(offers::list_reviews).post(offers::submit_review),
        )
        .route("/:id/acceptances", get(offers::list_acceptances));

    let bets = Router::new()
        .route("/", post(bets::create_bet).get(bets::list_bets))
        .route("/:id", get(bets::get_bet))
        .route("/:id/buy", post(bets::buy))
        .route("/:id/sell", post(bets::sell))
        .route("/:id/positions", get(bets::list_positions));

    let me = Router::new()
        .route("/", get(me::get_me))
        .route("/stats", get(me::stats))
        .route("/bets", get(me::my_bets))
        .route("/groups", get(me::my_groups))
        .route("/profile", patch(me::update_profile));

    let users = Router::new()
        .route("/:id", get(users::get_user));

    let profiles = Router::new().route("/:id", get(users::get_profile));

    let admin = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/:id/credit", post(admin::credit))
        .route("/users/:id/debit", post(admin::debit))
        .route("/users/:id/ban", post(admin::ban))
        .route("/users/:id/unban", post(admin::unban))
        .route("/users/:id/promote", post(admin::promote))
        .route("/users/:id/demote", post(admin::demote))
        .route("/users/:id/reset-password", post(admin::reset_password))
        .route("/users/:id/logs", get(admin::user_logs))
        .route("/users/:id/devices", get(admin::user_devices))
        .route("/users/:id/sessions", get(admin::user_sessions))
        .route("/devices/:id", axum::routing::delete(admin::revoke_device))
        .route("/sessions/:id", axum::routing::delete(admin::revoke_session))
        .route("/groups", post(admin::create_group).get(admin::list_groups))
        .route(
            "/groups/:id",
            get(admin::get_group)
                .patch(admin::rename_group)
                .delete(admin::delete_group),
        )
        .route("/groups/:id/members", post(admin::update_group_members))
        .route(
            "/offers/:id",
            patch(admin::update_offer).delete(admin::delete_offer),
        )
        .route("/bets/pending-resolution", get(admin::pending_resolution))
        .route("/bets/:id/resolve", post(admin::resolve_bet))
        .route("/bets/:id", axum::routing::delete(admin::cancel_bet))
        .route("/logs", get(admin::logs))
        .route("/fees/summary", get(admin::fees_summary));

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/odds", get(health::odds_snapshot))
        .route("/ws/odds", get(health::odds_ws))
        .nest("/offers", offers)
        .nest("/bets", bets)
        .nest("/me", me)
        .nest("/users", users)
        .nest("/profiles", profiles)
        .nest("/admin", admin)
        .with_state(state)
}
