//! Request handlers.
//!
//! Engine-facing handlers run through
//! [`ConfigCurrency::with_current_configuration`](crate::currency::ConfigCurrency::with_current_configuration),
//! so a request naming a data source another instance just added succeeds
//! after one refresh.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{self, DataSourceAdded};
use crate::currency::{AttributeType, CurrencyStatus, DataSource};
use crate::engine::{EngineError, EngineOperation, EngineOutcome};
use crate::http::request::RequestIdExt;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::store::ConfigId;

#[derive(Debug, Serialize)]
pub struct Heartbeat {
    pub status: &'static str,
}

pub async fn heartbeat() -> Json<Heartbeat> {
    Json(Heartbeat { status: "ok" })
}

pub async fn current_config(State(state): State<AppState>) -> Json<CurrencyStatus> {
    Json(state.currency.status())
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub fresh: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceList {
    pub config_id: ConfigId,
    pub data_sources: Vec<DataSource>,
}

pub async fn list_data_sources(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DataSourceList>, ApiError> {
    let (config_id, data_sources) = catalog::list_data_sources(&state.currency, query.fresh).await?;
    Ok(Json(DataSourceList { config_id, data_sources }))
}

/// One data source. An unknown code goes through the stale check before 404.
pub async fn get_data_source(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<DataSource>, ApiError> {
    let code = code.to_ascii_uppercase();
    let found = state
        .currency
        .with_current_configuration(|handle| {
            handle
                .data_sources()
                .get(&code)
                .cloned()
                .ok_or_else(|| EngineError::unknown_data_source(&code))
        })
        .await;

    match found {
        Ok(ds) => Ok(Json(ds)),
        Err(e) if e.refresh_cause().is_none() => {
            Err(ApiError::not_found(format!("data source [{code}] not found")))
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDataSourceRequest {
    pub data_source_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDataSourceResponse {
    pub config_id: ConfigId,
    #[serde(flatten)]
    pub data_source: DataSource,
}

pub async fn add_data_source(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AddDataSourceRequest>,
) -> Result<(StatusCode, Json<AddDataSourceResponse>), ApiError> {
    state.ensure_writable()?;
    tracing::info!(request_id = %headers.request_id(), code = %body.data_source_code, "Adding data source");

    let DataSourceAdded { data_source, config_id } = catalog::add_data_source(&state.currency, &body.data_source_code).await?;
    Ok((StatusCode::CREATED, Json(AddDataSourceResponse { config_id, data_source })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeList {
    pub config_id: ConfigId,
    pub entity_types: Vec<String>,
}

pub async fn list_entity_types(State(state): State<AppState>) -> Json<EntityTypeList> {
    let handle = state.currency.current();
    Json(EntityTypeList {
        config_id: handle.id(),
        entity_types: handle.entity_types().iter().cloned().collect(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeTypeList {
    pub config_id: ConfigId,
    pub attribute_types: Vec<AttributeType>,
}

pub async fn list_attribute_types(State(state): State<AppState>) -> Json<AttributeTypeList> {
    let handle = state.currency.current();
    Json(AttributeTypeList {
        config_id: handle.id(),
        attribute_types: handle.attributes().iter().cloned().collect(),
    })
}

pub async fn put_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((code, record_id)): Path<(String, String)>,
    Json(record): Json<Value>,
) -> Result<Json<EngineOutcome>, ApiError> {
    state.ensure_writable()?;
    let operation = EngineOperation::AddRecord {
        data_source: code.to_ascii_uppercase(),
        record_id,
        record,
    };
    run(&state, &headers, operation).await
}

pub async fn get_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((code, record_id)): Path<(String, String)>,
) -> Result<Json<EngineOutcome>, ApiError> {
    let operation = EngineOperation::GetRecord {
        data_source: code.to_ascii_uppercase(),
        record_id,
    };
    run(&state, &headers, operation).await
}

pub async fn delete_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((code, record_id)): Path<(String, String)>,
) -> Result<Json<EngineOutcome>, ApiError> {
    state.ensure_writable()?;
    let operation = EngineOperation::DeleteRecord {
        data_source: code.to_ascii_uppercase(),
        record_id,
    };
    run(&state, &headers, operation).await
}

async fn run(state: &AppState, headers: &HeaderMap, operation: EngineOperation) -> Result<Json<EngineOutcome>, ApiError> {
    let result = state
        .currency
        .with_current_configuration(|handle| handle.execute(&operation))
        .await;

    match result {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            tracing::debug!(
                request_id = %headers.request_id(),
                operation = operation.name(),
                data_source = %operation.data_source(),
                error = %e,
                "Engine operation failed"
            );
            Err(e.into())
        }
    }
}
