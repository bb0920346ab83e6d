//! DynamoDB store backend.
//!
//! This module implements [`ScanStore`] on top of `aws-sdk-dynamodb`,
//! including DynamoDB-compatible services (DynamoDB Local, ScyllaDB
//! Alternator) via an endpoint override.
//!
//! # Credentials
//!
//! Credentials come from the standard AWS provider chain (environment,
//! shared config/credentials files, instance metadata). Only the region
//! and endpoint are configurable here; everything else is the SDK's
//! default behavior.

use crate::ScanStore;
use crate::error::{Error, ErrorKind, Result};
use crate::models::{AttributeValue, Cursor, Record, ScanPage, ScanRequest};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::retry::RetryConfig;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue as SdkValue;
use std::collections::HashMap;
use tracing::debug;

/// Error codes DynamoDB uses for capacity rejection. All of them mean
/// "back off and reissue the identical request".
const THROTTLE_CODES: [&str; 3] =
    ["ProvisionedThroughputExceededException", "ThrottlingException", "RequestLimitExceeded"];

/// DynamoDB store backend.
///
/// Shares one SDK client (and its connection pool) across all segment
/// workers. The SDK's own retry layer is disabled: the scan core owns the
/// backoff policy, and stacking two retry layers would hide throttling
/// signals from it.
///
/// # Examples
///
/// ```no_run
/// use trawl_store::backend::DynamoBackend;
///
/// # async fn example() {
/// let backend = DynamoBackend::connect(
///     "dynamodb",
///     Some("us-west-1".to_string()),
///     None::<String>,
/// ).await;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DynamoBackend {
    name: String,
    client: Client,
}

impl DynamoBackend {
    /// Create a new DynamoDB backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in display/logging)
    /// * `region` - AWS region; falls back to the provider chain's region
    /// * `endpoint` - Custom endpoint URL for DynamoDB-compatible services
    pub async fn connect(
        name: impl Into<String>,
        region: Option<String>,
        endpoint: Option<impl Into<String>>,
    ) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let shared = loader.load().await;
        let mut config_builder = aws_sdk_dynamodb::config::Builder::from(&shared)
            // The segment workers drive retries through their own backoff
            // policy; a second retry layer underneath them would reorder
            // and delay the throttling signal they classify on.
            .retry_config(RetryConfig::disabled());
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
        }
    }
}

#[async_trait]
impl ScanStore for DynamoBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, request: &ScanRequest) -> Result<ScanPage> {
        let output = self
            .client
            .scan()
            .table_name(&request.table)
            .segment(to_i32(request.segment)?)
            .total_segments(to_i32(request.total_segments)?)
            .consistent_read(request.consistent)
            .set_exclusive_start_key(
                request.start_cursor.clone().map(|cursor| to_sdk_map(cursor.into_attributes())),
            )
            .send()
            .await
            .map_err(|err| classify(&request.table, err))?;

        let records = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|item| from_sdk_map(item).map(Record::from))
            .collect::<Result<Vec<_>>>()?;
        // DynamoDB signals exhaustion by omitting the key entirely, but an
        // empty map means the same thing and must not be replayed.
        let next_cursor = match output.last_evaluated_key {
            Some(key) if !key.is_empty() => Some(Cursor::new(from_sdk_map(key)?)),
            _ => None,
        };
        debug!(
            table = %request.table,
            segment = request.segment,
            records = records.len(),
            exhausted = next_cursor.is_none(),
            "scanned page"
        );
        Ok(ScanPage::new(records, next_cursor))
    }

    async fn get_record(&self, table: &str, key: &Record, consistent: bool) -> Result<Option<Record>> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .consistent_read(consistent)
            .set_key(Some(to_sdk_map(key.clone().into_attributes())))
            .send()
            .await
            .map_err(|err| classify(table, err))?;
        debug!(table, found = output.item.is_some(), "fetched record");
        output.item.map(|item| from_sdk_map(item).map(Record::from)).transpose()
    }

    async fn put_record(&self, table: &str, record: Record) -> Result<()> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_sdk_map(record.into_attributes())))
            .send()
            .await
            .map_err(|err| classify(table, err))?;
        debug!(table, "stored record");
        Ok(())
    }
}

/// Map an SDK error onto the store error taxonomy.
fn classify<E>(table: &str, err: SdkError<E>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let kind = match err.code() {
        Some(code) if THROTTLE_CODES.contains(&code) => {
            ErrorKind::Throttled(err.message().unwrap_or(code).to_string())
        },
        Some("ResourceNotFoundException") => ErrorKind::TableNotFound(table.to_string()),
        _ => match &err {
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => ErrorKind::Network(err.to_string()),
            _ => ErrorKind::Backend(err.to_string()),
        },
    };
    exn::Exn::from(kind)
}

fn to_i32(value: usize) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| exn::Exn::from(ErrorKind::Backend(format!("segment value {value} out of range"))))
}

fn to_sdk_map(attributes: HashMap<String, AttributeValue>) -> HashMap<String, SdkValue> {
    attributes.into_iter().map(|(name, value)| (name, to_sdk_value(value))).collect()
}

fn from_sdk_map(attributes: HashMap<String, SdkValue>) -> Result<HashMap<String, AttributeValue>> {
    attributes
        .into_iter()
        .map(|(name, value)| Ok((name, from_sdk_value(value)?)))
        .collect()
}

fn to_sdk_value(value: AttributeValue) -> SdkValue {
    match value {
        AttributeValue::S(s) => SdkValue::S(s),
        AttributeValue::N(n) => SdkValue::N(n),
        AttributeValue::B(b) => SdkValue::B(Blob::new(b)),
        AttributeValue::Bool(b) => SdkValue::Bool(b),
        AttributeValue::Null => SdkValue::Null(true),
        AttributeValue::L(list) => SdkValue::L(list.into_iter().map(to_sdk_value).collect()),
        AttributeValue::M(map) => SdkValue::M(to_sdk_map(map)),
        AttributeValue::SS(set) => SdkValue::Ss(set),
        AttributeValue::NS(set) => SdkValue::Ns(set),
        AttributeValue::BS(set) => SdkValue::Bs(set.into_iter().map(Blob::new).collect()),
    }
}

fn from_sdk_value(value: SdkValue) -> Result<AttributeValue> {
    Ok(match value {
        SdkValue::S(s) => AttributeValue::S(s),
        SdkValue::N(n) => AttributeValue::N(n),
        SdkValue::B(b) => AttributeValue::B(b.into_inner()),
        SdkValue::Bool(b) => AttributeValue::Bool(b),
        SdkValue::Null(_) => AttributeValue::Null,
        SdkValue::L(list) => {
            AttributeValue::L(list.into_iter().map(from_sdk_value).collect::<Result<Vec<_>>>()?)
        },
        SdkValue::M(map) => AttributeValue::M(from_sdk_map(map)?),
        SdkValue::Ss(set) => AttributeValue::SS(set),
        SdkValue::Ns(set) => AttributeValue::NS(set),
        SdkValue::Bs(set) => AttributeValue::BS(set.into_iter().map(Blob::into_inner).collect()),
        other => exn::bail!(ErrorKind::InvalidRecord(format!("unsupported attribute type: {other:?}"))),
    })
}
