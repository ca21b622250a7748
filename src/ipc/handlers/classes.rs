use serde_json::json;

use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, nullable_str, optional_bool, optional_f64, optional_str, open_repo, repo_err,
    required_f64, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::repo::{ClassPatch, ClassTreeSource, GradeStore, NewClass};

use super::setup::load_letter_scale;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if state.db.is_none() {
        return ok(&req.id, json!({ "classes": [] }));
    }
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    // Counts let the host show a useful overview without a second round trip.
    let trees = match repo.fetch_class_grade_tree(&student_id) {
        Ok(v) => v,
        Err(e) => return repo_err(req, e),
    };
    let classes: Vec<serde_json::Value> = trees
        .iter()
        .map(|t| {
            json!({
                "id": t.class.id,
                "name": t.class.name,
                "creditHours": t.class.credit_hours,
                "isCompleted": t.class.is_completed,
                "term": t.class.term,
                "categoryCount": t.categories.len(),
                "assignmentCount": t.assignments.len(),
                "gradedCount": t.assignments.iter().filter(|a| a.grade.is_some()).count()
            })
        })
        .collect();
    ok(&req.id, json!({ "classes": classes }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let credit_hours = match required_f64(req, "creditHours") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let is_completed = match optional_bool(req, "isCompleted") {
        Ok(v) => v.unwrap_or(false),
        Err(e) => return e,
    };
    let term = match optional_str(req, "term") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match repo.create_class(
        &student_id,
        NewClass {
            name,
            credit_hours,
            is_completed,
            term,
        },
    ) {
        Ok(class) => ok(&req.id, json!({ "classId": class.id, "class": class })),
        Err(e) => repo_err(req, e),
    }
}

fn parse_class_patch(req: &Request) -> Result<ClassPatch, serde_json::Value> {
    Ok(ClassPatch {
        name: optional_str(req, "name")?,
        credit_hours: optional_f64(req, "creditHours")?,
        is_completed: optional_bool(req, "isCompleted")?,
        term: nullable_str(req, "term")?,
    })
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match parse_class_patch(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match repo.update_class(&class_id, patch) {
        Ok(class) => ok(&req.id, json!({ "class": class })),
        Err(e) => repo_err(req, e),
    }
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo.delete_class(&class_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => repo_err(req, e),
    }
}

fn handle_classes_detail(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student_id = match repo.class_owner(&class_id) {
        Ok(v) => v,
        Err(e) => return repo_err(req, e),
    };
    let trees = match repo.fetch_class_grade_tree(&student_id) {
        Ok(v) => v,
        Err(e) => return repo_err(req, e),
    };
    let Some(tree) = trees.iter().find(|t| t.class.id == class_id) else {
        return err(&req.id, "not_found", "class not found", None);
    };

    let scale = load_letter_scale(conn);
    ok(&req.id, json!(calc::class_breakdown(tree, &scale)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.update" => Some(handle_classes_update(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        "classes.detail" => Some(handle_classes_detail(state, req)),
        _ => None,
    }
}
