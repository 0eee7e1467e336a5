//! HTTP routes
//!
//! Callers are authenticated upstream; the gateway forwards the tenant and
//! user in [`WORKSPACE_HEADER`] and [`USER_HEADER`]. Requests without them
//! get 401. Malformed ids in the path do not match any route (404).

use crate::api_error::{into_response, ApiError};
use chrono::{DateTime, Utc};
use flex_core::model::{RecordId, RequestContext, TableId};
use flex_core::query::Query;
use flex_core::record::RecordPayload;
use flex_core::schema::{NewTable, SchemaOp};
use flex_core::view::{ViewCommand, ViewState};
use flex_core::FlexTables;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

pub const WORKSPACE_HEADER: &str = "x-workspace-id";
pub const USER_HEADER: &str = "x-user-id";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSchemaBody {
    expected_version: u64,
    ops: Vec<SchemaOp>,
}

#[derive(Debug, Deserialize)]
struct CreateRecordBody {
    data: RecordPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRecordBody {
    data: RecordPayload,
    expected_updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTablesParams {
    #[serde(default)]
    include_archived: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetRecordParams {
    #[serde(default)]
    include_deleted: bool,
}

type ApiResult = Result<Response, ApiError>;

fn ok_json<T: serde::Serialize>(value: &T) -> ApiResult {
    Ok(warp::reply::json(value).into_response())
}

fn created_json<T: serde::Serialize>(value: &T) -> ApiResult {
    Ok(warp::reply::with_status(warp::reply::json(value), StatusCode::CREATED).into_response())
}

/// Caller scope from the gateway headers
fn identity() -> impl Filter<Extract = (Result<RequestContext, ApiError>,), Error = Rejection> + Clone {
    warp::header::optional::<String>(WORKSPACE_HEADER)
        .and(warp::header::optional::<String>(USER_HEADER))
        .map(|workspace: Option<String>, user: Option<String>| -> Result<RequestContext, ApiError> {
            let workspace = workspace
                .filter(|s| !s.trim().is_empty())
                .ok_or(ApiError::MissingIdentity("X-Workspace-Id"))?;
            let user = user
                .filter(|s| !s.trim().is_empty())
                .ok_or(ApiError::MissingIdentity("X-User-Id"))?;
            Ok(RequestContext::new(workspace, user))
        })
}

fn with_engine(engine: FlexTables) -> impl Filter<Extract = (FlexTables,), Error = Infallible> + Clone {
    warp::any().map(move || engine.clone())
}

// ============================================================================
// Tables
// ============================================================================

// POST /tables
fn create_table(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("tables")
        .and(warp::post())
        .and(identity())
        .and(warp::body::json())
        .and(with_engine(engine))
        .then(|ctx: Result<RequestContext, ApiError>, body: NewTable, engine: FlexTables| async move {
            let table = engine.create_table(&ctx?, body).await?;
            created_json(&*table)
        })
        .map(into_response)
}

// GET /tables?includeArchived=
fn list_tables(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("tables")
        .and(warp::get())
        .and(identity())
        .and(warp::query::<ListTablesParams>())
        .and(with_engine(engine))
        .then(
            |ctx: Result<RequestContext, ApiError>, params: ListTablesParams, engine: FlexTables| async move {
                let tables = engine.list_tables(&ctx?, params.include_archived).await?;
                let tables: Vec<_> = tables.iter().map(|t| &**t).collect();
                ok_json(&tables)
            },
        )
        .map(into_response)
}

// GET /tables/{id}
fn get_table(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("tables" / TableId)
        .and(warp::get())
        .and(identity())
        .and(with_engine(engine))
        .then(
            |table_id: TableId, ctx: Result<RequestContext, ApiError>, engine: FlexTables| async move {
                let table = engine.get_table(&ctx?, table_id).await?;
                ok_json(&*table)
            },
        )
        .map(into_response)
}

// PATCH /tables/{id}/schema
fn update_schema(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("tables" / TableId / "schema")
        .and(warp::patch())
        .and(identity())
        .and(warp::body::json())
        .and(with_engine(engine))
        .then(
            |table_id: TableId, ctx: Result<RequestContext, ApiError>, body: UpdateSchemaBody, engine: FlexTables| async move {
                let table = engine
                    .update_schema(&ctx?, table_id, body.expected_version, &body.ops)
                    .await?;
                ok_json(&*table)
            },
        )
        .map(into_response)
}

// POST /tables/{id}/archive
fn archive_table(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("tables" / TableId / "archive")
        .and(warp::post())
        .and(identity())
        .and(with_engine(engine))
        .then(
            |table_id: TableId, ctx: Result<RequestContext, ApiError>, engine: FlexTables| async move {
                let table = engine.archive_table(&ctx?, table_id).await?;
                ok_json(&*table)
            },
        )
        .map(into_response)
}

// ============================================================================
// Records
// ============================================================================

// POST /tables/{id}/records
fn create_record(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("tables" / TableId / "records")
        .and(warp::post())
        .and(identity())
        .and(warp::body::json())
        .and(with_engine(engine))
        .then(
            |table_id: TableId, ctx: Result<RequestContext, ApiError>, body: CreateRecordBody, engine: FlexTables| async move {
                let record = engine.create_record(&ctx?, table_id, body.data).await?;
                created_json(&record)
            },
        )
        .map(into_response)
}

// GET /records/{id}?includeDeleted=
fn get_record(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("records" / RecordId)
        .and(warp::get())
        .and(identity())
        .and(warp::query::<GetRecordParams>())
        .and(with_engine(engine))
        .then(
            |record_id: RecordId, ctx: Result<RequestContext, ApiError>, params: GetRecordParams, engine: FlexTables| async move {
                let record = engine.get_record(&ctx?, record_id, params.include_deleted).await?;
                ok_json(&record)
            },
        )
        .map(into_response)
}

// PATCH /records/{id}
fn update_record(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("records" / RecordId)
        .and(warp::patch())
        .and(identity())
        .and(warp::body::json())
        .and(with_engine(engine))
        .then(
            |record_id: RecordId, ctx: Result<RequestContext, ApiError>, body: UpdateRecordBody, engine: FlexTables| async move {
                let record = engine
                    .update_record(&ctx?, record_id, body.data, body.expected_updated_at)
                    .await?;
                ok_json(&record)
            },
        )
        .map(into_response)
}

// DELETE /records/{id}
fn delete_record(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("records" / RecordId)
        .and(warp::delete())
        .and(identity())
        .and(with_engine(engine))
        .then(
            |record_id: RecordId, ctx: Result<RequestContext, ApiError>, engine: FlexTables| async move {
                let record = engine.delete_record(&ctx?, record_id).await?;
                ok_json(&record)
            },
        )
        .map(into_response)
}

// POST /records/{id}/restore
fn restore_record(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("records" / RecordId / "restore")
        .and(warp::post())
        .and(identity())
        .and(with_engine(engine))
        .then(
            |record_id: RecordId, ctx: Result<RequestContext, ApiError>, engine: FlexTables| async move {
                let record = engine.restore_record(&ctx?, record_id).await?;
                ok_json(&record)
            },
        )
        .map(into_response)
}

// POST /tables/{id}/records:query
fn query_records(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("tables" / TableId / "records:query")
        .and(warp::post())
        .and(identity())
        .and(warp::body::json())
        .and(with_engine(engine))
        .then(
            |table_id: TableId, ctx: Result<RequestContext, ApiError>, query: Query, engine: FlexTables| async move {
                let page = engine.query(&ctx?, table_id, query).await?;
                ok_json(&page)
            },
        )
        .map(into_response)
}

// ============================================================================
// View state
// ============================================================================

// GET /tables/{id}/view-state
fn get_view_state(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("tables" / TableId / "view-state")
        .and(warp::get())
        .and(identity())
        .and(with_engine(engine))
        .then(
            |table_id: TableId, ctx: Result<RequestContext, ApiError>, engine: FlexTables| async move {
                let state = engine.view_state(&ctx?, table_id).await?;
                ok_json(&state)
            },
        )
        .map(into_response)
}

// PUT /tables/{id}/view-state
fn put_view_state(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("tables" / TableId / "view-state")
        .and(warp::put())
        .and(identity())
        .and(warp::body::json())
        .and(with_engine(engine))
        .then(
            |table_id: TableId, ctx: Result<RequestContext, ApiError>, state: ViewState, engine: FlexTables| async move {
                let state = engine.put_view_state(&ctx?, table_id, state).await?;
                ok_json(&state)
            },
        )
        .map(into_response)
}

// POST /tables/{id}/view-state/commands
fn view_command(engine: FlexTables) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("tables" / TableId / "view-state" / "commands")
        .and(warp::post())
        .and(identity())
        .and(warp::body::json())
        .and(with_engine(engine))
        .then(
            |table_id: TableId, ctx: Result<RequestContext, ApiError>, command: ViewCommand, engine: FlexTables| async move {
                let state = engine.apply_view_command(&ctx?, table_id, command).await?;
                ok_json(&state)
            },
        )
        .map(into_response)
}

// GET /health
fn health() -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("health")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({"status": "ok", "version": flex_core::VERSION})).into_response())
}

/// Turn unmatched requests and unreadable bodies into JSON errors
async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, error, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "no such route".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "bad_request", e.to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, "bad_request", e.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "method not allowed".to_string(),
        )
    } else {
        tracing::debug!("Unhandled rejection: {:?}", rejection);
        (StatusCode::BAD_REQUEST, "bad_request", format!("{rejection:?}"))
    };

    let body = warp::reply::json(&json!({"error": error, "message": message}));
    Ok(warp::reply::with_status(body, status).into_response())
}

pub fn filters(engine: FlexTables) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let tables = create_table(engine.clone())
        .or(list_tables(engine.clone()))
        .unify()
        .or(get_table(engine.clone()))
        .unify()
        .or(update_schema(engine.clone()))
        .unify()
        .or(archive_table(engine.clone()))
        .unify();

    let records = create_record(engine.clone())
        .or(query_records(engine.clone()))
        .unify()
        .or(get_record(engine.clone()))
        .unify()
        .or(update_record(engine.clone()))
        .unify()
        .or(delete_record(engine.clone()))
        .unify()
        .or(restore_record(engine.clone()))
        .unify();

    let views = get_view_state(engine.clone())
        .or(put_view_state(engine.clone()))
        .unify()
        .or(view_command(engine))
        .unify();

    health()
        .or(tables)
        .unify()
        .or(records)
        .unify()
        .or(views)
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::trace::request())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flex_test_utils::{expenses_table, TestEngine};
    use serde_json::Value as Json;
    use warp::test::request;

    fn body(resp: &warp::http::Response<warp::hyper::body::Bytes>) -> Json {
        serde_json::from_slice(resp.body()).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_identity() {
        let handler = filters(TestEngine::new().engine);
        let resp = request().method("GET").path("/health").reply(&handler).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body(&resp)["status"], "ok");
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let handler = filters(TestEngine::new().engine);
        let resp = request()
            .method("GET")
            .path("/tables")
            .header(WORKSPACE_HEADER, "ws-1")
            .reply(&handler)
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(&resp)["error"], "unauthorized");
    }

    #[tokio::test]
    async fn create_and_read_table() {
        let handler = filters(TestEngine::new().engine);
        let resp = request()
            .method("POST")
            .path("/tables")
            .header(WORKSPACE_HEADER, "ws-1")
            .header(USER_HEADER, "alice")
            .json(&expenses_table())
            .reply(&handler)
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let table = body(&resp);
        assert_eq!(table["schemaVersion"], 1);

        let id = table["id"].as_str().unwrap();
        let resp = request()
            .method("GET")
            .path(&format!("/tables/{id}"))
            .header(WORKSPACE_HEADER, "ws-2")
            .header(USER_HEADER, "mallory")
            .reply(&handler)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_ids_and_bodies() {
        let handler = filters(TestEngine::new().engine);
        let resp = request()
            .method("GET")
            .path("/records/not-a-ulid")
            .header(WORKSPACE_HEADER, "ws-1")
            .header(USER_HEADER, "alice")
            .reply(&handler)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = request()
            .method("POST")
            .path("/tables")
            .header(WORKSPACE_HEADER, "ws-1")
            .header(USER_HEADER, "alice")
            .body("{not json")
            .reply(&handler)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
