//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the inventory REST endpoints and the
//! master definition for the OpenAPI specification.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use crate::web::state::AppState;
use inventory_core::domain::{Item, ItemFilter, ItemStatus, SortKey};
use inventory_core::ports::PortError;
use inventory_core::views::{filter_items, sort_items};
use inventory_core::ImportReport;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        list_items_handler,
        add_item_handler,
        remove_item_handler,
        import_items_handler,
    ),
    components(
        schemas(
            crate::web::auth::SignupRequest,
            crate::web::auth::LoginRequest,
            crate::web::auth::AuthResponse,
            AddItemRequest,
            ItemResponse,
            ImportResponse,
            SkippedResponse,
        )
    ),
    tags(
        (name = "Inventory API", description = "API endpoints for the small-business inventory tracker.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct AddItemRequest {
    pub name: String,
    pub quantity: u32,
}

/// One inventory item as presented to the client.
#[derive(Serialize, ToSchema)]
pub struct ItemResponse {
    pub name: String,
    pub quantity: u32,
    pub status: String,
    pub date_added: Option<DateTime<Utc>>,
    pub total_received: u64,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        Self {
            name: item.name,
            quantity: item.quantity,
            status: match item.status {
                ItemStatus::Active => "active".to_string(),
                ItemStatus::Inactive => "inactive".to_string(),
            },
            date_added: item.date_added,
            total_received: item.total_received,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SkippedResponse {
    pub row: usize,
    pub name: String,
    pub reason: String,
}

/// The aggregate outcome of a bulk import.
#[derive(Serialize, ToSchema)]
pub struct ImportResponse {
    pub created: usize,
    pub updated: usize,
    pub skipped: Vec<SkippedResponse>,
    pub chunks_committed: usize,
    pub cancelled: bool,
}

impl From<ImportReport> for ImportResponse {
    fn from(report: ImportReport) -> Self {
        Self {
            created: report.created,
            updated: report.updated,
            skipped: report
                .skipped
                .into_iter()
                .map(|s| SkippedResponse {
                    row: s.row,
                    name: s.name,
                    reason: s.reason,
                })
                .collect(),
            chunks_committed: report.chunks_committed,
            cancelled: report.cancelled,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub filter: ItemFilter,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoveQuery {
    pub quantity: Option<u32>,
}

/// Maps a port error onto the HTTP status the caller should see. Errors are
/// surfaced, never swallowed: the message travels in the response body.
pub(crate) fn port_error_response(context: &str, err: PortError) -> (StatusCode, String) {
    error!("{}: {}", context, err);
    let status = match &err {
        PortError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::InsufficientStock { .. } => StatusCode::CONFLICT,
        PortError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        PortError::InvalidRecord(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PortError::StoreWrite(_) | PortError::StoreRead(_) => StatusCode::BAD_GATEWAY,
    };
    (status, err.to_string())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the inventory, with optional search/filter/sort.
///
/// Search is a lowercase prefix match on the item name; filtering and
/// sorting happen after the fetch, as presentation concerns.
#[utoipa::path(
    get,
    path = "/items",
    params(
        ("sort" = Option<String>, Query, description = "name | quantity | date_added"),
        ("filter" = Option<String>, Query, description = "all | low_stock | recently_added | active | inactive"),
        ("search" = Option<String>, Query, description = "Case-insensitive name prefix")
    ),
    responses(
        (status = 200, description = "The user's inventory", body = [ItemResponse]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_items_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<inventory_core::domain::User>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let repo = state.repository_for(user);
    let mut items = repo
        .fetch_all()
        .await
        .map_err(|e| port_error_response("list items", e))?;

    if let Some(term) = &query.search {
        let term = term.trim().to_lowercase();
        items.retain(|item| item.name.starts_with(&term));
    }
    let now = Utc::now();
    let items = sort_items(filter_items(items, query.filter, now), query.sort, now);

    Ok(Json(
        items.into_iter().map(ItemResponse::from).collect::<Vec<_>>(),
    ))
}

/// Add stock for an item, creating it on first sight.
#[utoipa::path(
    post,
    path = "/items",
    request_body = AddItemRequest,
    responses(
        (status = 201, description = "Stock recorded"),
        (status = 401, description = "Not logged in"),
        (status = 422, description = "Empty name or non-positive quantity")
    )
)]
pub async fn add_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<inventory_core::domain::User>,
    Json(req): Json<AddItemRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let repo = state.repository_for(user);
    repo.add_item(&req.name, req.quantity)
        .await
        .map_err(|e| port_error_response("add item", e))?;
    Ok(StatusCode::CREATED)
}

/// Remove stock for an item; removing the last unit soft-deletes it.
#[utoipa::path(
    delete,
    path = "/items/{name}",
    params(
        ("name" = String, Path, description = "Item name, matched case-insensitively"),
        ("quantity" = Option<u32>, Query, description = "Units to remove; defaults to 1")
    ),
    responses(
        (status = 200, description = "Stock removed"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such item"),
        (status = 409, description = "More units requested than held")
    )
)]
pub async fn remove_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<inventory_core::domain::User>,
    Path(name): Path<String>,
    Query(query): Query<RemoveQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let repo = state.repository_for(user);
    repo.remove_item(&name, query.quantity.unwrap_or(1))
        .await
        .map_err(|e| port_error_response("remove item", e))?;
    Ok(StatusCode::OK)
}

/// Bulk-import items from an uploaded CSV or Excel file.
///
/// Invalid rows are skipped and reported; a mid-run store failure keeps the
/// chunks that already committed and reports how far the run got.
#[utoipa::path(
    post,
    path = "/items/import",
    request_body(content_type = "multipart/form-data", description = "The .csv/.xlsx/.xls file to import."),
    responses(
        (status = 200, description = "Import finished", body = ImportResponse),
        (status = 401, description = "Not logged in"),
        (status = 415, description = "Unsupported file format"),
        (status = 502, description = "Import aborted partway; body reports committed counts")
    )
)]
pub async fn import_items_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<inventory_core::domain::User>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {}", e),
            )
        })?
        .ok_or((
            StatusCode::BAD_REQUEST,
            "Multipart form must include a file".to_string(),
        ))?;

    let file_name = field.file_name().unwrap_or("upload").to_string();
    let bytes = field.bytes().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read file bytes: {}", e),
        )
    })?;

    let records = state
        .sheets
        .parse(&file_name, &bytes)
        .map_err(|e| port_error_response("parse upload", e))?;
    info!(file = %file_name, records = records.len(), "starting bulk import");

    let importer = state.importer_for(user);
    match importer.import(records).await {
        Ok(report) => {
            info!(
                created = report.created,
                updated = report.updated,
                skipped = report.skipped.len(),
                "bulk import finished"
            );
            Ok((StatusCode::OK, Json(ImportResponse::from(report))))
        }
        Err(err) => {
            let (status, _) = port_error_response("bulk import", err.source);
            Err((
                status,
                format!(
                    "import aborted after {} committed chunk(s); {} created, {} updated so far",
                    err.report.chunks_committed, err.report.created, err.report.updated
                ),
            ))
        }
    }
}
