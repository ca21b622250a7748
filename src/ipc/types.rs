use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rusqlite::Connection;
use serde::Deserialize;

use crate::repo::{Subscribers, Subscription};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub subscribers: Subscribers,
    /// Bumped on every committed gradebook write; lets the host notice stale views.
    pub revision: Arc<AtomicU64>,
    _revision_watch: Subscription,
}

impl AppState {
    pub fn new() -> Self {
        let subscribers = Subscribers::new();
        let revision = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&revision);
        let watch = subscribers.subscribe(move |event| {
            let rev = counter.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!(
                student_id = %event.student_id,
                class_id = %event.class_id,
                kind = ?event.kind,
                revision = rev,
                "gradebook revision"
            );
        });
        Self {
            workspace: None,
            db: None,
            subscribers,
            revision,
            _revision_watch: watch,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
