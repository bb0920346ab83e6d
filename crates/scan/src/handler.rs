use trawl_store::Record;

/// Caller-supplied consumer for scanned record batches.
///
/// Invoked synchronously, once per page, from every segment worker; a
/// worker does not request its next page until the call returns.
/// Implementations must be safe under concurrent invocation from all
/// workers at once.
///
/// The scan core treats the call as fire-and-forget: it observes no return
/// value, and handler-side failures are the caller's responsibility to
/// detect and deal with. The handler must not panic across this boundary;
/// a panic fails that segment's worker task and is reported in the
/// [`ScanReport`](crate::ScanReport) rather than retried.
pub trait ScanHandler: Send + Sync {
    fn handle(&self, records: Vec<Record>);
}

/// Plain closures are handlers, so small consumers need no struct.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use trawl_scan::ScanHandler;
/// use trawl_store::Record;
///
/// let handler: Arc<dyn ScanHandler> = Arc::new(|records: Vec<Record>| {
///     println!("page of {} records", records.len());
/// });
/// handler.handle(Vec::new());
/// ```
impl<F> ScanHandler for F
where
    F: Fn(Vec<Record>) + Send + Sync,
{
    fn handle(&self, records: Vec<Record>) {
        self(records)
    }
}
