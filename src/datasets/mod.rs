//! Dataset pipelines (C7): three polymorphic variants sharing one
//! `load -> validate -> transform -> serialize` template.

pub mod branch_summary;
pub mod upcoming_arrivals;
pub mod upcoming_birthdays;

use crate::error::CoreError;
use crate::models::DatasetMetadata;
use async_trait::async_trait;
use serde::Serialize;

/// Every pipeline produces `(dataset, metadata)`; the four template steps
/// are implemented per-variant, `run` is the same for all of them.
#[async_trait]
pub trait DatasetPipeline {
    type Row: Send;
    type Output: Serialize + Send;

    fn dataset_id(&self) -> &'static str;

    async fn load(&self) -> Result<Vec<Self::Row>, CoreError>;
    fn validate(&self, rows: &[Self::Row]) -> Result<(), CoreError>;
    fn transform(&self, rows: Vec<Self::Row>) -> Self::Output;
    fn row_count(output: &Self::Output) -> usize;

    async fn run(
        &self,
        branch_id: &str,
        generation_date: &str,
    ) -> Result<(Self::Output, DatasetMetadata), CoreError> {
        let rows = self.load().await?;
        self.validate(&rows)?;
        let output = self.transform(rows);
        let metadata = DatasetMetadata {
            generation_date: generation_date.to_string(),
            built_at: chrono::Utc::now(),
            row_count: Self::row_count(&output),
            cache_key: crate::cache::cache_key(self.dataset_id(), branch_id, generation_date),
        };
        Ok((output, metadata))
    }
}
