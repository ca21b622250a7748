use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;

use crate::model::{Assignment, Category, Class, ClassTree, Grade};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Wire error code for the IPC envelope.
    pub fn code(&self) -> &'static str {
        match self {
            RepoError::NotFound { .. } => "not_found",
            RepoError::InvalidInput(_) => "bad_params",
            RepoError::Db(_) => "db_query_failed",
        }
    }
}

/// Read side of the data-access layer. Implementations must hand back a
/// consistent snapshot: every class together with its own categories and
/// assignments as they stood at one point in time.
pub trait ClassTreeSource {
    fn fetch_class_grade_tree(&self, student_id: &str) -> Result<Vec<ClassTree>, RepoError>;
}

#[derive(Debug, Clone, Default)]
pub struct NewClass {
    pub name: String,
    pub credit_hours: f64,
    pub is_completed: bool,
    pub term: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassPatch {
    pub name: Option<String>,
    pub credit_hours: Option<f64>,
    pub is_completed: Option<bool>,
    /// `Some(None)` clears the term.
    pub term: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCategory {
    pub name: String,
    pub weight: f64,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub weight: Option<f64>,
    pub color: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAssignment {
    pub category_id: String,
    pub name: String,
    pub points_possible: f64,
    pub due_date: Option<String>,
}

/// Write side of the data-access layer. Grade calculations never take one
/// of these; only data-entry paths do.
pub trait GradeStore {
    fn create_class(&self, student_id: &str, new: NewClass) -> Result<Class, RepoError>;
    fn update_class(&self, class_id: &str, patch: ClassPatch) -> Result<Class, RepoError>;
    fn delete_class(&self, class_id: &str) -> Result<(), RepoError>;

    fn create_category(&self, class_id: &str, new: NewCategory) -> Result<Category, RepoError>;
    fn update_category(&self, category_id: &str, patch: CategoryPatch)
        -> Result<Category, RepoError>;
    fn delete_category(&self, category_id: &str) -> Result<(), RepoError>;

    fn create_assignment(&self, class_id: &str, new: NewAssignment)
        -> Result<Assignment, RepoError>;
    fn delete_assignment(&self, assignment_id: &str) -> Result<(), RepoError>;

    fn set_grade(&self, assignment_id: &str, points_earned: f64) -> Result<Grade, RepoError>;
    /// Returns whether a grade existed.
    fn clear_grade(&self, assignment_id: &str) -> Result<bool, RepoError>;
}

pub fn validate_name(field: &str, raw: &str) -> Result<String, RepoError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(RepoError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(name.to_string())
}

pub fn validate_positive(field: &str, v: f64) -> Result<f64, RepoError> {
    if !v.is_finite() || v <= 0.0 {
        return Err(RepoError::InvalidInput(format!(
            "{field} must be a finite number > 0"
        )));
    }
    Ok(v)
}

pub fn validate_weight(v: f64) -> Result<f64, RepoError> {
    if !v.is_finite() || !(0.0..=100.0).contains(&v) {
        return Err(RepoError::InvalidInput(
            "weight must be within 0..=100".to_string(),
        ));
    }
    Ok(v)
}

pub fn validate_points_earned(v: f64) -> Result<f64, RepoError> {
    if !v.is_finite() || v < 0.0 {
        return Err(RepoError::InvalidInput(
            "pointsEarned must be a finite number >= 0".to_string(),
        ));
    }
    Ok(v)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Class,
    Category,
    Assignment,
    Grade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub student_id: String,
    pub class_id: String,
    pub kind: ChangeKind,
}

type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

fn lock_table(table: &Mutex<ListenerTable>) -> MutexGuard<'_, ListenerTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Change-notification registry shared by a store and whoever caches its data.
#[derive(Clone, Default)]
pub struct Subscribers {
    table: Arc<Mutex<ListenerTable>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let mut table = lock_table(&self.table);
        let id = table.next_id;
        table.next_id += 1;
        table.listeners.push((id, Arc::new(listener)));
        Subscription {
            table: Arc::downgrade(&self.table),
            id,
        }
    }

    /// Listeners run outside the lock, so they may subscribe or unsubscribe.
    pub fn notify(&self, event: &ChangeEvent) {
        let listeners: Vec<Listener> = lock_table(&self.table)
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        lock_table(&self.table).listeners.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by `Subscribers::subscribe`. Dropping it detaches the listener.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    table: Weak<Mutex<ListenerTable>>,
    id: u64,
}

impl Subscription {
    #[allow(dead_code)]
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            lock_table(&table).listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
