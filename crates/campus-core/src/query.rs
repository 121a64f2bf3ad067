//! # Query Layer
//!
//! Typed access to the Collection Store. A `Record` type names its
//! collection; `Collection<T>` converts between `T` and stored documents and
//! exposes point lookups, index scans and counts.
//!
//! Generated-key records carry `id: u64` with `#[serde(default)]`; saving a
//! record whose id is `0` allocates the next key.

use crate::storage::{Document, Filter, IndexValue, Key, Query, Store, WriteMode};
use crate::types::serialization_error;
use crate::{CampusError, CampusResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// A type stored in one named collection.
pub trait Record: Serialize + DeserializeOwned {
    /// Collection name in the store.
    const COLLECTION: &'static str;
    /// Human name used in `NotFound` errors.
    const ENTITY: &'static str;
}

/// Serialize a value into a document.
pub(crate) fn to_document<T: Serialize>(value: &T) -> CampusResult<Document> {
    match serde_json::to_value(value).map_err(serialization_error)? {
        Value::Object(map) => Ok(map),
        other => Err(CampusError::Serialization(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Deserialize a document into a value.
pub(crate) fn from_document<T: DeserializeOwned>(doc: Document) -> CampusResult<T> {
    serde_json::from_value(Value::Object(doc)).map_err(serialization_error)
}

/// Typed handle on one collection.
pub struct Collection<'s, T> {
    store: &'s Store,
    _record: PhantomData<fn() -> T>,
}

impl Store {
    /// Typed handle for `T`'s collection.
    pub fn collection<T: Record>(&self) -> Collection<'_, T> {
        Collection {
            store: self,
            _record: PhantomData,
        }
    }
}

impl<T: Record> Collection<'_, T> {
    fn decode_all(docs: Vec<Document>) -> CampusResult<Vec<T>> {
        docs.into_iter().map(from_document).collect()
    }

    /// Point lookup.
    pub fn get(&self, key: impl Into<Key>) -> CampusResult<Option<T>> {
        self.store
            .get(T::COLLECTION, &key.into())?
            .map(from_document)
            .transpose()
    }

    /// Point lookup that fails with `NotFound` when absent.
    pub fn require(&self, key: impl Into<Key>) -> CampusResult<T> {
        let key = key.into();
        self.get(key.clone())?
            .ok_or_else(|| CampusError::not_found(T::ENTITY, key))
    }

    /// Every record, in key order.
    pub fn all(&self) -> CampusResult<Vec<T>> {
        Self::decode_all(self.store.get_all(T::COLLECTION, &Filter::All)?)
    }

    /// Records matching `filter`, in key order.
    pub fn find(&self, filter: Filter) -> CampusResult<Vec<T>> {
        Self::decode_all(self.store.get_all(T::COLLECTION, &filter)?)
    }

    /// First record matching `filter`.
    pub fn find_one(&self, filter: Filter) -> CampusResult<Option<T>> {
        let mut hits = self
            .store
            .query(T::COLLECTION, &Query::new(filter).limit(1))?;
        hits.pop().map(from_document).transpose()
    }

    /// Records with `index` between `from` and `to` inclusive, in index order.
    pub fn scan_range(
        &self,
        index: &'static str,
        from: impl Into<IndexValue>,
        to: impl Into<IndexValue>,
    ) -> CampusResult<Vec<T>> {
        let query = Query::new(Filter::range(index, Some(from.into()), Some(to.into())))
            .order(crate::storage::Order::Index);
        self.query(&query)
    }

    /// Run a full query.
    pub fn query(&self, query: &Query) -> CampusResult<Vec<T>> {
        Self::decode_all(self.store.query(T::COLLECTION, query)?)
    }

    /// Insert or replace; returns the key.
    pub fn put(&self, record: &T) -> CampusResult<Key> {
        self.store.put(T::COLLECTION, to_document(record)?)
    }

    /// Insert a new record; fails when its key is already taken.
    pub fn insert(&self, record: &T) -> CampusResult<Key> {
        self.store.insert(T::COLLECTION, to_document(record)?)
    }

    /// Insert a new record; returns it as stored (generated id filled).
    pub fn save(&self, record: &T) -> CampusResult<T> {
        let written = self
            .store
            .write(T::COLLECTION, to_document(record)?, WriteMode::Insert)?;
        from_document(written.doc)
    }

    /// Delete by key; returns whether the record existed.
    pub fn delete(&self, key: impl Into<Key>) -> CampusResult<bool> {
        self.store.delete(T::COLLECTION, &key.into())
    }

    /// Number of records.
    pub fn count(&self) -> CampusResult<usize> {
        self.store.count(T::COLLECTION, &Filter::All)
    }

    /// Number of records matching `filter`.
    pub fn count_where(&self, filter: Filter) -> CampusResult<usize> {
        self.store.count(T::COLLECTION, &filter)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::Order;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Mark {
        #[serde(default)]
        id: u64,
        student_id: String,
        date: String,
        subject: String,
    }

    impl Record for Mark {
        const COLLECTION: &'static str = "attendance";
        const ENTITY: &'static str = "Mark";
    }

    fn mark(student: &str, date: &str) -> Mark {
        Mark {
            id: 0,
            student_id: student.to_string(),
            date: date.to_string(),
            subject: "math".to_string(),
        }
    }

    #[test]
    fn save_fills_generated_id() {
        let store = Store::in_memory().unwrap();
        let marks = store.collection::<Mark>();
        let saved = marks.save(&mark("s1", "2024-03-01")).unwrap();
        assert_eq!(saved.id, 1);
        assert_eq!(marks.get(1_u64).unwrap(), Some(saved));
    }

    #[test]
    fn insert_refuses_taken_key() {
        let store = Store::in_memory().unwrap();
        let marks = store.collection::<Mark>();
        let saved = marks.save(&mark("s1", "2024-03-01")).unwrap();

        let again = Mark {
            subject: "physics".to_string(),
            ..saved.clone()
        };
        let err = marks.insert(&again).unwrap_err();
        assert!(err.is_unique_violation_on("id"));
        assert!(marks.save(&again).is_err());
        assert_eq!(marks.get(saved.id).unwrap().unwrap().subject, "math");
    }

    #[test]
    fn require_reports_entity() {
        let store = Store::in_memory().unwrap();
        let err = store.collection::<Mark>().require(99_u64).unwrap_err();
        assert!(matches!(err, CampusError::NotFound { entity: "Mark", .. }));
    }

    #[test]
    fn find_and_count_by_index() {
        let store = Store::in_memory().unwrap();
        let marks = store.collection::<Mark>();
        for (s, d) in [("s1", "2024-03-01"), ("s2", "2024-03-01"), ("s1", "2024-03-02")] {
            marks.put(&mark(s, d)).unwrap();
        }
        assert_eq!(marks.find(Filter::eq("student_id", "s1")).unwrap().len(), 2);
        assert_eq!(marks.count_where(Filter::eq("date", "2024-03-01")).unwrap(), 2);
        assert_eq!(marks.count().unwrap(), 3);
        assert!(marks.find_one(Filter::eq("student_id", "s9")).unwrap().is_none());
    }

    #[test]
    fn scan_range_in_index_order() {
        let store = Store::in_memory().unwrap();
        let marks = store.collection::<Mark>();
        for d in ["2024-03-09", "2024-03-01", "2024-03-05"] {
            marks.put(&mark("s1", d)).unwrap();
        }
        let dates: Vec<_> = marks
            .scan_range("date", "2024-03-01", "2024-03-05")
            .unwrap()
            .into_iter()
            .map(|m| m.date)
            .collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-03-05"]);

        let newest = marks
            .query(&Query::all().order(Order::KeyDesc).limit(1))
            .unwrap();
        assert_eq!(newest[0].date, "2024-03-05");
    }
}
