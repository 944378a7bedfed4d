//! A generic JSON-document record.
//!
//! [`Record`] lets tools and tests store arbitrary JSON documents without
//! defining a dedicated object type. Its payload carries the record name so
//! that instances rebuilt from a listing know their own key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;
use crate::object::{KvConstructor, KvObject};
use crate::scope::DataScope;

#[derive(Serialize, Deserialize)]
struct RecordBody {
    name: String,
    data: Value,
}

/// JSON document stored under `<prefix...>/<name>`.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    prefix: Vec<String>,
    name: String,
    data: Value,
    index: u64,
    scope: DataScope,
    skip: bool,
}

impl Record {
    /// Create a record in the given collection.
    pub fn new<S: Into<String>>(
        scope: DataScope,
        prefix: impl IntoIterator<Item = S>,
        name: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            prefix: prefix.into_iter().map(Into::into).collect(),
            name: name.into(),
            data,
            index: 0,
            scope,
            skip: false,
        }
    }

    /// An empty template for a collection, suitable for listing or watching.
    pub fn template<S: Into<String>>(scope: DataScope, prefix: impl IntoIterator<Item = S>) -> Self {
        Self::new(scope, prefix, "", Value::Null)
    }

    /// Build a record from full key segments: the last segment is the name.
    pub fn from_segments(scope: DataScope, segments: &[String]) -> Option<Self> {
        let (name, prefix) = segments.split_last()?;
        Some(Self::new(scope, prefix.iter().cloned(), name.clone(), Value::Null))
    }

    /// Mark the record as cache-only.
    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn set_data(&mut self, data: Value) {
        self.data = data;
    }
}

impl KvObject for Record {
    fn key(&self) -> Vec<String> {
        let mut key = self.prefix.clone();
        key.push(self.name.clone());
        key
    }

    fn key_prefix(&self) -> Vec<String> {
        self.prefix.clone()
    }

    fn value(&self) -> Option<Vec<u8>> {
        let body = RecordBody {
            name: self.name.clone(),
            data: self.data.clone(),
        };
        serde_json::to_vec(&body).ok()
    }

    fn set_value(&mut self, value: &[u8]) -> Result<(), TypeError> {
        let body: RecordBody =
            serde_json::from_slice(value).map_err(|e| TypeError::Decode(e.to_string()))?;
        self.name = body.name;
        self.data = body.data;
        Ok(())
    }

    fn index(&self) -> u64 {
        self.index
    }

    fn set_index(&mut self, index: u64) {
        self.index = index;
    }

    fn data_scope(&self) -> DataScope {
        self.scope
    }

    fn skip(&self) -> bool {
        self.skip
    }

    fn as_constructor(&self) -> Option<&dyn KvConstructor> {
        Some(self)
    }
}

impl KvConstructor for Record {
    fn new_object(&self) -> Box<dyn KvObject> {
        Box::new(Self::template(self.scope, self.prefix.clone()).with_skip(self.skip))
    }

    fn copy_to(&self, dst: &mut dyn KvObject) -> Result<(), TypeError> {
        match dst.as_any_mut().downcast_mut::<Record>() {
            Some(record) => {
                *record = self.clone();
                Ok(())
            }
            None => Err(TypeError::Decode(format!(
                "cannot copy record {} into a foreign type",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_prefix_plus_name() {
        let r = Record::new(DataScope::Global, ["network"], "n1", json!({"mtu": 1500}));
        assert_eq!(r.key(), vec!["network", "n1"]);
        assert_eq!(r.key_prefix(), vec!["network"]);
    }

    #[test]
    fn value_round_trips_through_new_object() {
        let r = Record::new(DataScope::Local, ["endpoint", "n1"], "ep", json!({"ip": "10.0.0.2"}));
        let mut fresh = r.new_object();
        fresh.set_value(&r.value().unwrap()).unwrap();

        let fresh = fresh.downcast::<Record>().unwrap();
        assert_eq!(fresh.key(), r.key());
        assert_eq!(fresh.data(), r.data());
    }

    #[test]
    fn set_value_rejects_garbage() {
        let mut r = Record::template(DataScope::Local, ["network"]);
        assert!(matches!(r.set_value(b"{nope"), Err(TypeError::Decode(_))));
    }

    #[test]
    fn from_segments_splits_name() {
        let segments = vec!["network".to_string(), "n1".to_string()];
        let r = Record::from_segments(DataScope::Global, &segments).unwrap();
        assert_eq!(r.name(), "n1");
        assert_eq!(r.key_prefix(), vec!["network"]);
        assert!(Record::from_segments(DataScope::Global, &[]).is_none());
    }

    #[test]
    fn copy_to_clones_everything() {
        let mut src = Record::new(DataScope::Local, ["network"], "n1", json!(1)).with_skip(true);
        src.set_index(9);
        let mut dst = Record::template(DataScope::Local, ["network"]);
        src.copy_to(&mut dst).unwrap();
        assert_eq!(dst, src);
        assert!(dst.skip());
    }
}
