use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::records::{Dataset, DatasetKind};
use crate::search::SearchBox;
use crate::sequence::Latest;
use crate::session::Session;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<Session>,
    pub datasets: HashMap<DatasetKind, Latest<Dataset>>,
    pub search: SearchBox,
}

impl AppState {
    pub fn dataset(&self, kind: DatasetKind) -> Option<&Dataset> {
        self.datasets.get(&kind).and_then(|slot| slot.get())
    }
}
