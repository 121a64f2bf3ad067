//! # Keys and Index Values
//!
//! Order-preserving string encodings for primary keys and secondary index
//! values. Both end up as `&str` components of redb keys, so byte order of
//! the encoding must match the logical order of the value.
//!
//! - Generated keys: zero-padded to 20 digits (`u64::MAX` has 20)
//! - Integers: offset by 2^63 and zero-padded, so negatives sort first
//! - Booleans: `0` / `1`
//! - Composite values: parts joined by `COMPOSITE_SEPARATOR`

use super::schema::{CollectionSchema, IndexDef};
use crate::primitives::{COMPOSITE_SEPARATOR, KEY_FIELD};
use crate::{CampusError, CampusResult};
use serde_json::{Map, Value};
use std::fmt;

/// A stored record: a JSON object.
pub type Document = Map<String, Value>;

// =============================================================================
// PRIMARY KEYS
// =============================================================================

/// Primary key of a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Store-generated sequence number.
    Int(u64),
    /// Caller-supplied identifier.
    Str(String),
}

impl Key {
    /// Encoded form used as the redb table key.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Int(n) => format!("{:020}", n),
            Self::Str(s) => s.clone(),
        }
    }

    /// Read the key out of a document's `id` field.
    #[must_use]
    pub fn from_document(doc: &Document) -> Option<Self> {
        match doc.get(KEY_FIELD)? {
            Value::Number(n) => n.as_u64().filter(|n| *n > 0).map(Self::Int),
            Value::String(s) if !s.is_empty() => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    /// JSON form written back into the `id` field.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<u64> for Key {
    fn from(n: u64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

// =============================================================================
// INDEX VALUES
// =============================================================================

/// A value looked up in (or stored into) a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// Exact tuple for a composite index.
    Tuple(Vec<IndexValue>),
}

impl IndexValue {
    /// Build a composite value from its parts.
    pub fn tuple<I, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<IndexValue>,
    {
        Self::Tuple(parts.into_iter().map(Into::into).collect())
    }

    /// Order-preserving string encoding.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(n) => format!("{:020}", (i128::from(*n) + (1_i128 << 63)) as u64),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Tuple(parts) => parts
                .iter()
                .map(IndexValue::encode)
                .collect::<Vec<_>>()
                .join(&COMPOSITE_SEPARATOR.to_string()),
        }
    }

    /// Index value of a single JSON field, if the field is indexable.
    ///
    /// Null, floats, arrays and objects are not indexed.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
                .map(Self::Int),
            _ => None,
        }
    }
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<&String> for IndexValue {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<String> for IndexValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for IndexValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u32> for IndexValue {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u64> for IndexValue {
    fn from(n: u64) -> Self {
        Self::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<bool> for IndexValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Encoded value of `def` for `doc`, or `None` when the record is not in
/// the index (any field missing or unindexable).
pub(crate) fn extract(def: &IndexDef, doc: &Document) -> Option<String> {
    let mut parts = Vec::with_capacity(def.fields.len());
    for field in def.fields {
        parts.push(IndexValue::from_json(doc.get(*field)?)?);
    }
    if parts.len() == 1 {
        parts.pop().map(|v| v.encode())
    } else {
        Some(IndexValue::Tuple(parts).encode())
    }
}

/// Reject string parts of composite index fields that contain the
/// separator; such a value would sort inside another tuple's range.
pub(crate) fn check_composite_parts(schema: &CollectionSchema, doc: &Document) -> CampusResult<()> {
    for def in schema.indexes.iter().filter(|def| def.fields.len() > 1) {
        for field in def.fields {
            if let Some(Value::String(s)) = doc.get(*field)
                && s.contains(COMPOSITE_SEPARATOR)
            {
                return Err(CampusError::Validation(format!(
                    "{}.{} contains a control character",
                    schema.name, field
                )));
            }
        }
    }
    Ok(())
}

/// All index entries a document contributes to.
pub(crate) fn entries(
    schema: &CollectionSchema,
    doc: &Document,
) -> Vec<(&'static IndexDef, String)> {
    schema
        .indexes
        .iter()
        .filter_map(|def| extract(def, doc).map(|value| (def, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{self, MESS_BOOKINGS, USERS};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => Document::new(),
        }
    }

    #[test]
    fn int_keys_sort_numerically() {
        assert!(Key::Int(9).encode() < Key::Int(10).encode());
        assert!(Key::Int(10).encode() < Key::Int(u64::MAX).encode());
    }

    #[test]
    fn int_values_sort_across_sign() {
        let values = [i64::MIN, -5, -1, 0, 1, 42, i64::MAX];
        let encoded: Vec<_> = values.iter().map(|v| IndexValue::Int(*v).encode()).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn key_from_document() {
        assert_eq!(Key::from_document(&doc(json!({"id": 7}))), Some(Key::Int(7)));
        assert_eq!(
            Key::from_document(&doc(json!({"id": "u1"}))),
            Some(Key::Str("u1".to_string()))
        );
        assert_eq!(Key::from_document(&doc(json!({"id": 0}))), None);
        assert_eq!(Key::from_document(&doc(json!({"id": null}))), None);
        assert_eq!(Key::from_document(&doc(json!({}))), None);
    }

    #[test]
    fn composite_requires_every_field() {
        let bookings = schema::schema(MESS_BOOKINGS).expect("schema");
        let def = bookings.index("menu_student").expect("index");

        let full = doc(json!({"menu_id": "2024-03-01_lunch", "student_id": "s1"}));
        let partial = doc(json!({"menu_id": "2024-03-01_lunch"}));

        assert_eq!(
            extract(def, &full),
            Some(format!("2024-03-01_lunch{}s1", COMPOSITE_SEPARATOR))
        );
        assert_eq!(extract(def, &partial), None);
    }

    #[test]
    fn separator_in_composite_part_rejected() {
        let bookings = schema::schema(MESS_BOOKINGS).expect("schema");
        let forged = doc(json!({"menu_id": "m1", "student_id": "s1\u{1f}zz"}));
        assert!(check_composite_parts(bookings, &forged).is_err());

        let fine = doc(json!({"menu_id": "m1", "student_id": "s1"}));
        assert!(check_composite_parts(bookings, &fine).is_ok());
    }

    #[test]
    fn sparse_fields_skip_index() {
        let users = schema::schema(USERS).expect("schema");
        let record = doc(json!({"id": "u1", "username": "ana", "email": null}));
        let names: Vec<_> = entries(users, &record).iter().map(|(d, _)| d.name).collect();
        assert_eq!(names, vec!["username"]);
    }

    #[test]
    fn floats_are_not_indexed() {
        assert_eq!(IndexValue::from_json(&json!(2.5)), None);
        assert_eq!(IndexValue::from_json(&json!(3)), Some(IndexValue::Int(3)));
        assert_eq!(IndexValue::from_json(&json!(true)), Some(IndexValue::Bool(true)));
    }
}
