//! In-memory scripted store backend for testing.

use crate::ScanStore;
use crate::error::{ErrorKind, Result};
use crate::models::{AttributeValue, Cursor, Record, ScanPage, ScanRequest};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

type ScriptedResponse = std::result::Result<ScanPage, ErrorKind>;

/// In-memory store backend for testing.
///
/// Scan responses are scripted per segment and popped in order, so a test
/// controls exactly which pages (and which errors) each segment worker
/// observes. Record storage for checkpoint tables is a plain in-memory
/// table keyed on declared key attributes. All state sits behind a
/// [`Mutex`], so trait methods operate on `&self` from any number of
/// concurrent workers.
///
/// Panics on misconfiguration (scanning an unscripted segment, exhausting
/// a script) are DELIBERATE: the mock is intended for tests, and a wrongly
/// set up test should not pass.
///
/// # Examples
///
/// ```
/// use trawl_store::backend::MockStore;
/// use trawl_store::{Record, ScanPage};
///
/// let store = MockStore::new();
/// store.script_segment(0, [Ok(ScanPage::new(vec![Record::new()], None))]);
/// ```
pub struct MockStore {
    name: String,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<usize, VecDeque<ScriptedResponse>>,
    tables: HashMap<String, MockTable>,
    record_faults: VecDeque<ErrorKind>,
    scan_log: Vec<ScanRequest>,
}

struct MockTable {
    key: Vec<String>,
    rows: Vec<Record>,
}

impl MockTable {
    /// A row matches a key when every key attribute of the table is equal
    /// in both. Linear search; mock tables hold a handful of rows.
    fn position(&self, key: &Record) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| self.key.iter().all(|attr| row.get(attr) == key.get(attr)))
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Change the name of the mock store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Script one segment's scan responses, replacing any existing script.
    pub fn script_segment(&self, segment: usize, responses: impl IntoIterator<Item = ScriptedResponse>) {
        self.lock().scripts.insert(segment, responses.into_iter().collect());
    }

    /// Script every segment with linked pages of the given record batches.
    ///
    /// Continuation cursors are fabricated to chain page `j` to page
    /// `j + 1`; the final page of each segment carries no cursor.
    pub fn with_scripted_segments(batches: Vec<Vec<Vec<Record>>>) -> Self {
        let store = Self::new();
        for (segment, pages) in batches.into_iter().enumerate() {
            let last = pages.len().saturating_sub(1);
            let responses: Vec<ScriptedResponse> = pages
                .into_iter()
                .enumerate()
                .map(|(index, records)| {
                    let next_cursor = (index != last).then(|| Self::cursor(segment, index));
                    Ok(ScanPage::new(records, next_cursor))
                })
                .collect();
            store.script_segment(segment, responses);
        }
        store
    }

    /// The fabricated continuation cursor linking `page` to its successor
    /// within `segment`. Exposed so tests can assert resume positions.
    pub fn cursor(segment: usize, page: usize) -> Cursor {
        [(
            "pk".to_string(),
            AttributeValue::S(format!("segment-{segment}-page-{page}")),
        )]
        .into_iter()
        .collect()
    }

    /// Create an empty table keyed on the given attributes.
    pub fn create_table(&self, name: impl Into<String>, key: &[&str]) {
        self.lock().tables.insert(
            name.into(),
            MockTable {
                key: key.iter().map(|attr| attr.to_string()).collect(),
                rows: Vec::new(),
            },
        );
    }

    /// Inject a failure consumed by the next `get_record`/`put_record`
    /// call, in injection order.
    pub fn fail_next_record_op(&self, kind: ErrorKind) {
        self.lock().record_faults.push_back(kind);
    }

    /// Every scan request observed so far, in arrival order.
    pub fn scan_requests(&self) -> Vec<ScanRequest> {
        self.lock().scan_log.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning only happens if a test already panicked; compounding
        // the panic is fine in a mock.
        self.inner.lock().expect("mock store lock poisoned")
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScanStore for MockStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, request: &ScanRequest) -> Result<ScanPage> {
        let mut inner = self.lock();
        inner.scan_log.push(request.clone());
        let script = inner
            .scripts
            .get_mut(&request.segment)
            .unwrap_or_else(|| panic!("MockStore::scan: segment {} was never scripted", request.segment));
        let response = script
            .pop_front()
            .unwrap_or_else(|| panic!("MockStore::scan: script for segment {} is exhausted", request.segment));
        response.map_err(exn::Exn::from)
    }

    async fn get_record(&self, table: &str, key: &Record, _consistent: bool) -> Result<Option<Record>> {
        let mut inner = self.lock();
        if let Some(fault) = inner.record_faults.pop_front() {
            return Err(exn::Exn::from(fault));
        }
        let table = inner
            .tables
            .get(table)
            .ok_or_else(|| exn::Exn::from(ErrorKind::TableNotFound(table.to_string())))?;
        Ok(table.position(key).map(|index| table.rows[index].clone()))
    }

    async fn put_record(&self, table: &str, record: Record) -> Result<()> {
        let mut inner = self.lock();
        if let Some(fault) = inner.record_faults.pop_front() {
            return Err(exn::Exn::from(fault));
        }
        let table = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| exn::Exn::from(ErrorKind::TableNotFound(table.to_string())))?;
        for attr in &table.key {
            if record.get(attr).is_none() {
                exn::bail!(ErrorKind::InvalidRecord(format!("missing key attribute {attr}")));
            }
        }
        match table.position(&record) {
            Some(index) => table.rows[index] = record,
            None => table.rows.push(record),
        }
        Ok(())
    }
}
