use serde_json::json;

use crate::ipc::error::ok;
use crate::ipc::helpers::{
    nullable_str, open_repo, optional_f64, optional_str, repo_err, required_f64, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::repo::{CategoryPatch, GradeStore, NewAssignment, NewCategory};

fn handle_categories_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let weight = match required_f64(req, "weight") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let color = match optional_str(req, "color") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match repo.create_category(&class_id, NewCategory { name, weight, color }) {
        Ok(category) => ok(
            &req.id,
            json!({ "categoryId": category.id, "category": category }),
        ),
        Err(e) => repo_err(req, e),
    }
}

fn parse_category_patch(req: &Request) -> Result<CategoryPatch, serde_json::Value> {
    Ok(CategoryPatch {
        name: optional_str(req, "name")?,
        weight: optional_f64(req, "weight")?,
        color: nullable_str(req, "color")?,
    })
}

fn handle_categories_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let category_id = match required_str(req, "categoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match parse_category_patch(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo.update_category(&category_id, patch) {
        Ok(category) => ok(&req.id, json!({ "category": category })),
        Err(e) => repo_err(req, e),
    }
}

fn handle_categories_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let category_id = match required_str(req, "categoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo.delete_category(&category_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => repo_err(req, e),
    }
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let category_id = match required_str(req, "categoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let points_possible = match required_f64(req, "pointsPossible") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let due_date = match optional_str(req, "dueDate") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match repo.create_assignment(
        &class_id,
        NewAssignment {
            category_id,
            name,
            points_possible,
            due_date,
        },
    ) {
        Ok(assignment) => ok(
            &req.id,
            json!({ "assignmentId": assignment.id, "assignment": assignment }),
        ),
        Err(e) => repo_err(req, e),
    }
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo.delete_assignment(&assignment_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => repo_err(req, e),
    }
}

fn handle_grades_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let points_earned = match required_f64(req, "pointsEarned") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo.set_grade(&assignment_id, points_earned) {
        Ok(grade) => ok(&req.id, json!({ "assignmentId": assignment_id, "grade": grade })),
        Err(e) => repo_err(req, e),
    }
}

fn handle_grades_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let repo = match open_repo(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match repo.clear_grade(&assignment_id) {
        Ok(removed) => ok(&req.id, json!({ "removed": removed })),
        Err(e) => repo_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "categories.create" => Some(handle_categories_create(state, req)),
        "categories.update" => Some(handle_categories_update(state, req)),
        "categories.delete" => Some(handle_categories_delete(state, req)),
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.delete" => Some(handle_assignments_delete(state, req)),
        "grades.set" => Some(handle_grades_set(state, req)),
        "grades.clear" => Some(handle_grades_clear(state, req)),
        _ => None,
    }
}
