use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use ewallet_core::{AccountId, Amount};
use ewallet_infra::LedgerStore;
use ewallet_ledger::{EntryKind, NewAccount};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router<S>() -> Router
where
    S: LedgerStore + 'static,
{
    Router::new()
        .route("/", post(create_account::<S>))
        .route("/:id", get(get_account::<S>))
        .route("/:id/transactions", get(list_transactions::<S>))
        .route("/:id/credit", post(credit::<S>))
        .route("/:id/debit", post(debit::<S>))
}

pub async fn create_account<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    body: Result<Json<dto::CreateAccountRequest>, JsonRejection>,
) -> axum::response::Response
where
    S: LedgerStore + 'static,
{
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };

    let account = match NewAccount::new(body.username, body.password_hash) {
        Ok(account) => account,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let deadline = services.call_context().deadline();
    match services.repository().create_account(&account, deadline).await {
        Ok(created) => (StatusCode::CREATED, Json(dto::AccountResponse::from(created))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_account<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: LedgerStore + 'static,
{
    let account_id = match id.parse::<AccountId>() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let deadline = services.call_context().deadline();
    match services.repository().get_account(account_id, deadline).await {
        Ok(Some(account)) => (StatusCode::OK, Json(dto::AccountResponse::from(account))).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_transactions<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: LedgerStore + 'static,
{
    let account_id = match id.parse::<AccountId>() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let deadline = services.call_context().deadline();
    match services.repository().statement(account_id, deadline).await {
        Ok(Some(statement)) => (
            StatusCode::OK,
            Json(dto::TransactionListResponse {
                items: statement.entries,
            }),
        )
            .into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn credit<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
    body: Result<Json<dto::PostingRequest>, JsonRejection>,
) -> axum::response::Response
where
    S: LedgerStore + 'static,
{
    post_entry(&services, &id, body, EntryKind::Credit).await
}

pub async fn debit<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
    body: Result<Json<dto::PostingRequest>, JsonRejection>,
) -> axum::response::Response
where
    S: LedgerStore + 'static,
{
    post_entry(&services, &id, body, EntryKind::Debit).await
}

/// Validate the request, then hand it to the coordinator under the request
/// deadline.
async fn post_entry<S>(
    services: &AppServices<S>,
    id: &str,
    body: Result<Json<dto::PostingRequest>, JsonRejection>,
    kind: EntryKind,
) -> axum::response::Response
where
    S: LedgerStore + 'static,
{
    let account_id = match id.parse::<AccountId>() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    let amount = match Amount::new(body.amount) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let ctx = services.call_context();
    let result = match kind {
        EntryKind::Credit => services.coordinator.create_credit(&ctx, account_id, amount).await,
        EntryKind::Debit => services.coordinator.create_debit(&ctx, account_id, amount).await,
    };

    match result {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => errors::coordinator_error_to_response(e),
    }
}

fn bad_body(rejection: JsonRejection) -> axum::response::Response {
    errors::json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}
