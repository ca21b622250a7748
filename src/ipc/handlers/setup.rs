use rusqlite::Connection;
use serde_json::json;

use crate::calc::{self, LetterScale};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{calc_err, db_conn};
use crate::ipc::types::{AppState, Request};

pub const LETTER_SCALE_KEY: &str = "calc.letterScale";

/// Saved scale if there is a valid one, otherwise the default table.
pub fn load_letter_scale(conn: &Connection) -> LetterScale {
    match db::settings_get_json(conn, LETTER_SCALE_KEY) {
        Ok(Some(raw)) => match calc::parse_letter_scale(Some(&raw)) {
            Ok(scale) => scale,
            Err(e) => {
                tracing::warn!(error = %e.message, "stored letter scale is invalid; using default");
                LetterScale::default()
            }
        },
        Ok(None) => LetterScale::default(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read letter scale; using default");
            LetterScale::default()
        }
    }
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let is_custom = matches!(db::settings_get_json(conn, LETTER_SCALE_KEY), Ok(Some(_)));
    ok(
        &req.id,
        json!({
            "scale": load_letter_scale(conn),
            "isCustom": is_custom
        }),
    )
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scale = match calc::parse_letter_scale(req.params.get("scale")) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    let value = json!(scale);
    if let Err(e) = db::settings_set_json(conn, LETTER_SCALE_KEY, &value) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(steps = scale.steps.len(), gpa_cap = scale.gpa_cap, "letter scale updated");
    ok(&req.id, json!({ "scale": value }))
}

fn handle_config_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::settings_delete(conn, LETTER_SCALE_KEY) {
        Ok(removed) => ok(
            &req.id,
            json!({ "scale": LetterScale::default(), "removed": removed }),
        ),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.config.get" => Some(handle_config_get(state, req)),
        "calc.config.update" => Some(handle_config_update(state, req)),
        "calc.config.reset" => Some(handle_config_reset(state, req)),
        _ => None,
    }
}
