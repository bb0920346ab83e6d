pub mod backend;
pub mod error;
mod models;

pub use crate::backend::ScanStore;
pub use crate::models::{AttributeValue, Cursor, Record, ScanPage, ScanRequest};
use std::sync::Arc;

pub type StoreHandle = Arc<dyn ScanStore + Send + Sync>;
