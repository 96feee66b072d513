//! Shared process state handed to every connection task: one Coordinator
//! behind one mutex, plus the paths persistence reads/writes on request.

use crate::coordinator::Coordinator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Mutex<Coordinator>>,
    pub snapshot_path: PathBuf,
    pub trade_store_path: PathBuf,
}

impl AppState {
    pub fn new(coordinator: Coordinator, snapshot_path: PathBuf, trade_store_path: PathBuf) -> Self {
        Self {
            coordinator: Arc::new(Mutex::new(coordinator)),
            snapshot_path,
            trade_store_path,
        }
    }
}
