//! Per-visitor session state.
//!
//! The web layer loads a [`Session`] by key, hands `&mut Session` to whatever
//! needs it and writes it back only when [`Session::is_modified`] is set.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    key: String,
    data: Map<String, Value>,
    modified: bool,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into(), data: Map::new(), modified: false }
    }

    pub fn from_parts(key: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { key: key.into(), data, modified: false }
    }

    pub fn key(&self) -> &str { &self.key }
    pub fn data(&self) -> &Map<String, Value> { &self.data }
    pub fn is_modified(&self) -> bool { self.modified }
    pub fn mark_modified(&mut self) { self.modified = true; }
    pub fn mark_saved(&mut self) { self.modified = false; }

    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, serde_json::Error> {
        self.data.get(name).cloned().map(serde_json::from_value).transpose()
    }

    pub fn insert<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), serde_json::Error> {
        self.data.insert(name.to_string(), serde_json::to_value(value)?);
        self.modified = true;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let old = self.data.remove(name);
        if old.is_some() { self.modified = true; }
        old
    }
}
