//! Content storage capacity check.

use async_trait::async_trait;
use std::sync::Arc;

use crate::clients::PlatformQueryService;
use crate::error::CheckError;
use crate::health::check::StatusCheck;
use crate::health::types::{CheckResult, ResultBuilder, Severity};
use crate::properties::PropertySource;

const DESCRIPTION: &str = "Content Storage Check";

/// Warns once content storage usage reaches the configured percentage
pub struct StorageUsageCheck {
    query: Arc<dyn PlatformQueryService>,
    properties: Arc<dyn PropertySource>,
}

impl StorageUsageCheck {
    pub fn new(query: Arc<dyn PlatformQueryService>, properties: Arc<dyn PropertySource>) -> Self {
        Self { query, properties }
    }
}

#[async_trait]
impl StatusCheck for StorageUsageCheck {
    type State = ();

    fn description(&self) -> &str {
        DESCRIPTION
    }

    async fn run(&self, _previous: ()) -> Result<(CheckResult, ()), CheckError> {
        let threshold = u64::from(self.properties.current().content_storage_percent_threshold);
        let usage = self.query.content_storage_usage().await?;
        let percent = usage.percent_used();

        let mut builder = ResultBuilder::new();
        if usage.total_bytes > 0 && percent >= threshold {
            builder
                .severity(Severity::Warn)
                .add_header("Content storage is nearly full")
                .add_line(format!(
                    "Content storage is {percent}% full ({} of {} bytes used, threshold {threshold}%)",
                    usage.used_bytes, usage.total_bytes
                ));
        }
        Ok((builder.build(DESCRIPTION), ()))
    }
}
