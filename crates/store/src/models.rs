//! Data model shared between the scan core and the store backends.
//!
//! Records and cursors are opaque to the scan core: the only signal it
//! inspects is whether a page carries a continuation cursor. The attribute
//! model mirrors the document shape of DynamoDB-class stores so backends
//! can convert losslessly, and derives `serde` so records can be dumped or
//! embedded in checkpoint rows without a backend-specific marshaller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One scan call against a single segment. Immutable per call.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanRequest {
    /// Name of the table being scanned.
    pub table: String,
    /// Segment index in `0..total_segments`.
    pub segment: usize,
    /// Fixed segment count for the lifetime of the run. Must match the
    /// count used when any checkpoints for the run's namespace were
    /// written; the key ranges a segment covers depend on it.
    pub total_segments: usize,
    /// Resume position within the segment. `None` scans from the start.
    pub start_cursor: Option<Cursor>,
    /// Request strongly-consistent reads from the store.
    pub consistent: bool,
}

/// One page of scan results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanPage {
    /// Ordered batch of records. May be empty, even mid-segment.
    pub records: Vec<Record>,
    /// Position to resume from. `None` is the authoritative signal that
    /// the segment is exhausted.
    pub next_cursor: Option<Cursor>,
}

impl ScanPage {
    pub fn new(records: Vec<Record>, next_cursor: Option<Cursor>) -> Self {
        Self { records, next_cursor }
    }
}

/// Opaque continuation token marking the last-visited position within one
/// segment's scan order.
///
/// The store defines its contents (for DynamoDB-class stores, the primary
/// key attributes of the last evaluated item). It must be passed back
/// unmodified on the next request for the same segment, and has no meaning
/// across segments or across different total-segment counts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cursor(HashMap<String, AttributeValue>);

impl Cursor {
    pub fn new(attributes: HashMap<String, AttributeValue>) -> Self {
        Self(attributes)
    }

    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.0
    }

    pub fn into_attributes(self) -> HashMap<String, AttributeValue> {
        self.0
    }
}

impl From<HashMap<String, AttributeValue>> for Cursor {
    fn from(attributes: HashMap<String, AttributeValue>) -> Self {
        Self(attributes)
    }
}

impl FromIterator<(String, AttributeValue)> for Cursor {
    fn from_iter<I: IntoIterator<Item = (String, AttributeValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One opaque document pulled from (or written to) a table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record(HashMap<String, AttributeValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute insertion.
    ///
    /// # Examples
    ///
    /// ```
    /// use trawl_store::{AttributeValue, Record};
    ///
    /// let record = Record::new()
    ///     .with("namespace", AttributeValue::S("nightly".to_string()))
    ///     .with("segment", AttributeValue::N("3".to_string()));
    /// assert_eq!(record.len(), 2);
    /// ```
    pub fn with(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.0
    }

    pub fn into_attributes(self) -> HashMap<String, AttributeValue> {
        self.0
    }
}

impl From<HashMap<String, AttributeValue>> for Record {
    fn from(attributes: HashMap<String, AttributeValue>) -> Self {
        Self(attributes)
    }
}

/// Native attribute value model for DynamoDB-class document stores.
///
/// The serde representation matches the store's JSON wire shape
/// (`{"S": "..."}`, `{"N": "42"}`, ...), which keeps dumped records
/// recognizable to anyone who has read a raw scan response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String.
    S(String),
    /// Number, transported as a string to avoid precision loss.
    N(String),
    /// Binary.
    B(Vec<u8>),
    /// Boolean.
    Bool(bool),
    /// Null marker.
    Null,
    /// List of attribute values.
    L(Vec<AttributeValue>),
    /// Map of attribute values.
    M(HashMap<String, AttributeValue>),
    /// String set.
    SS(Vec<String>),
    /// Number set.
    NS(Vec<String>),
    /// Binary set.
    BS(Vec<Vec<u8>>),
}

impl AttributeValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_m(&self) -> Option<&HashMap<String, AttributeValue>> {
        match self {
            Self::M(m) => Some(m),
            _ => None,
        }
    }
}
