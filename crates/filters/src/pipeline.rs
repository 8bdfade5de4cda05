use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::{FilterError, UploadFilter};

/// Filter that returns its input unchanged.
///
/// Every pipeline starts with one, so a pipeline with nothing else
/// registered still produces the bytes to save.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityFilter;

impl UploadFilter for IdentityFilter {
    fn name(&self) -> &str {
        "identity"
    }

    fn process(
        &self,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FilterError>> + Send + '_>> {
        Box::pin(async move { Ok(data) })
    }
}

/// Ordered set of filters applied to every enqueued file.
///
/// Filters run in reverse registration order: the most recently added
/// filter sees the raw bytes first and the identity filter runs last.
/// Cloning is cheap and yields a snapshot; later registrations on the
/// original do not affect the clone.
#[derive(Clone)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn UploadFilter>>,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterPipeline {
    /// Creates a pipeline holding only the identity filter.
    pub fn new() -> Self {
        Self {
            filters: vec![Arc::new(IdentityFilter)],
        }
    }

    /// Registers `filter`. Returns `false` if this instance is already
    /// registered, in which case the pipeline is unchanged.
    pub fn add(&mut self, filter: Arc<dyn UploadFilter>) -> bool {
        if self.filters.iter().any(|f| Arc::ptr_eq(f, &filter)) {
            return false;
        }
        debug!(filter = filter.name(), "filter registered");
        self.filters.push(filter);
        true
    }

    /// Runs every filter over `data`, awaiting each in turn.
    ///
    /// Stops at the first failing filter.
    pub async fn run(&self, data: Vec<u8>) -> Result<Vec<u8>, FilterError> {
        let mut data = data;
        for filter in self.filters.iter().rev() {
            let before = data.len();
            data = filter.process(data).await?;
            debug!(
                filter = filter.name(),
                before,
                after = data.len(),
                "filter applied"
            );
        }
        Ok(data)
    }
}
