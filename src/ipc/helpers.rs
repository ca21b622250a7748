use rusqlite::Connection;
use serde_json::json;

use crate::calc::CalcError;
use crate::db::SqliteRepo;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::repo::RepoError;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Absent and null both read as `None`.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a string", key), None)),
    }
}

/// Absent reads as `None`, explicit null as `Some(None)`.
pub fn nullable_str(req: &Request, key: &str) -> Result<Option<Option<String>>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(Some(None)),
        Some(v) => v.as_str().map(|s| Some(Some(s.to_string()))).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a string or null", key),
                None,
            )
        }),
    }
}

pub fn required_f64(req: &Request, key: &str) -> Result<f64, serde_json::Value> {
    match optional_f64(req, key)? {
        Some(v) => Ok(v),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

pub fn optional_f64(req: &Request, key: &str) -> Result<Option<f64>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a number", key), None)),
    }
}

pub fn optional_bool(req: &Request, key: &str) -> Result<Option<bool>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a boolean", key), None)),
    }
}

pub fn db_conn<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn open_repo<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<SqliteRepo<'a>, serde_json::Value> {
    let conn = db_conn(state, req)?;
    Ok(SqliteRepo::new(conn, &state.subscribers))
}

pub fn repo_err(req: &Request, e: RepoError) -> serde_json::Value {
    let details = match &e {
        RepoError::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
        _ => None,
    };
    if let RepoError::Db(inner) = &e {
        tracing::warn!(method = %req.method, error = %inner, "database error");
    }
    err(&req.id, e.code(), e.to_string(), details)
}

pub fn calc_err(req: &Request, e: CalcError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}
