//! BranchSummary pipeline: per-district totals for the active branch's
//! current generation.

use crate::datasets::DatasetPipeline;
use crate::error::CoreError;
use crate::models::{BranchSummary, DistrictKpi};
use async_trait::async_trait;
use rocket_db_pools::sqlx::{self, PgPool};
use std::collections::BTreeMap;

#[derive(sqlx::FromRow)]
struct Row {
    district: Option<String>,
    arrival: Option<chrono::NaiveDate>,
    departure: Option<chrono::NaiveDate>,
}

pub struct BranchSummaryPipeline {
    pool: PgPool,
    branch_id: String,
    branches_scope: Vec<String>,
    generation_date: String,
}

impl BranchSummaryPipeline {
    /// `branches_scope` is the set of branches aggregated over — the
    /// intersection-of-allowed-branches decision: callers pass
    /// `allowed_branches` when non-empty, else `[branch_id]`.
    pub fn new(
        pool: PgPool,
        branch_id: String,
        branches_scope: Vec<String>,
        generation_date: String,
    ) -> Self {
        Self {
            pool,
            branch_id,
            branches_scope,
            generation_date,
        }
    }
}

#[async_trait]
impl DatasetPipeline for BranchSummaryPipeline {
    type Row = Row;
    type Output = BranchSummary;

    fn dataset_id(&self) -> &'static str {
        "branch_summary"
    }

    async fn load(&self) -> Result<Vec<Row>, CoreError> {
        sqlx::query_as::<_, Row>(
            "SELECT district, arrival, departure FROM missionary_records \
             WHERE branch = ANY($1) AND generation_date = $2 AND active",
        )
        .bind(&self.branches_scope)
        .bind(&self.generation_date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::DbInsertFailed(e.to_string()))
    }

    fn validate(&self, _rows: &[Row]) -> Result<(), CoreError> {
        Ok(())
    }

    fn transform(&self, rows: Vec<Row>) -> BranchSummary {
        let mut by_district: BTreeMap<String, DistrictKpi> = BTreeMap::new();
        for row in &rows {
            let district = row.district.clone().unwrap_or_else(|| "unknown".to_string());
            let kpi = by_district.entry(district.clone()).or_insert_with(|| DistrictKpi {
                district,
                total_missionaries: 0,
                first_arrival: None,
                last_departure: None,
            });
            kpi.total_missionaries += 1;
            if let Some(arrival) = row.arrival {
                kpi.first_arrival = Some(match kpi.first_arrival {
                    Some(current) => current.min(arrival),
                    None => arrival,
                });
            }
            if let Some(departure) = row.departure {
                kpi.last_departure = Some(match kpi.last_departure {
                    Some(current) => current.max(departure),
                    None => departure,
                });
            }
        }

        let districts: Vec<DistrictKpi> = by_district.into_values().collect();
        let total_missionaries = districts.iter().map(|d| d.total_missionaries).sum();

        let summary = BranchSummary {
            branch_id: self.branch_id.clone(),
            generation_date: self.generation_date.clone(),
            total_missionaries,
            districts,
        };
        summary.validate().expect("totals derived from the same rows always sum correctly");
        summary
    }

    fn row_count(output: &BranchSummary) -> usize {
        output.districts.len()
    }
}
