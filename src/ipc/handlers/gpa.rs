use serde_json::json;

use crate::gpa::{self, GradingOptions, SemesterScope};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, open_repo, optional_str, repo_err, required_str};
use crate::ipc::types::{AppState, Request};
use crate::whatif::{self, GradeChange};

use super::setup::load_letter_scale;

/// `term` picks an explicit term for the semester figures; without it the
/// semester is every class not yet completed.
fn grading_options(state: &AppState, req: &Request) -> Result<GradingOptions, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let semester = match optional_str(req, "term")? {
        Some(t) if !t.trim().is_empty() => SemesterScope::Term(t.trim().to_string()),
        _ => SemesterScope::InProgress,
    };
    Ok(GradingOptions {
        scale: load_letter_scale(conn),
        semester,
    })
}

/// Entries are decoded one by one. One that does not decode becomes a NaN
/// change, which the scenario reports as skipped in its original position.
fn parse_changes(req: &Request) -> Result<Vec<GradeChange>, serde_json::Value> {
    let Some(raw) = req.params.get("changes") else {
        return Err(err(&req.id, "bad_params", "missing changes", None));
    };
    let Some(entries) = raw.as_array() else {
        return Err(err(
            &req.id,
            "bad_params",
            "changes must be an array of { assignmentId, newGrade }",
            None,
        ));
    };
    Ok(entries
        .iter()
        .map(|entry| {
            serde_json::from_value::<GradeChange>(entry.clone()).unwrap_or_else(|e| {
                let label = match entry.get("assignmentId") {
                    Some(serde_json::Value::String(id)) => id.clone(),
                    Some(other) => other.to_string(),
                    None => entry.to_string(),
                };
                tracing::debug!(change = %label, error = %e, "undecodable what-if change");
                GradeChange {
                    assignment_id: label,
                    new_grade: f64::NAN,
                }
            })
        })
        .collect())
}

fn handle_gpa_full(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let options = match grading_options(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match gpa::calculate_full_gpa(&repo, &student_id, &options) {
        Ok(calc) => ok(&req.id, json!(calc)),
        Err(e) => repo_err(req, e),
    }
}

fn handle_gpa_what_if(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let changes = match parse_changes(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let options = match grading_options(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match whatif::calculate_what_if_scenario(&repo, &student_id, &changes, &options) {
        Ok(scenario) => ok(&req.id, json!(scenario)),
        Err(e) => repo_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gpa.full" => Some(handle_gpa_full(state, req)),
        "gpa.whatIf" => Some(handle_gpa_what_if(state, req)),
        _ => None,
    }
}
