//! UpcomingArrivals pipeline: missionaries arriving within the configured
//! window, consolidated by `(date, district)`.

use crate::datasets::DatasetPipeline;
use crate::error::CoreError;
use crate::models::UpcomingArrival;
use async_trait::async_trait;
use chrono::NaiveDate;
use rocket_db_pools::sqlx::{self, PgPool};
use std::collections::BTreeMap;

#[derive(sqlx::FromRow)]
struct Row {
    arrival: NaiveDate,
    district: Option<String>,
    departure: Option<NaiveDate>,
}

pub struct UpcomingArrivalsPipeline {
    pool: PgPool,
    branch_id: String,
    today: NaiveDate,
    window_days: i64,
}

impl UpcomingArrivalsPipeline {
    pub fn new(pool: PgPool, branch_id: String, today: NaiveDate, window_days: i64) -> Self {
        Self {
            pool,
            branch_id,
            today,
            window_days,
        }
    }
}

#[async_trait]
impl DatasetPipeline for UpcomingArrivalsPipeline {
    type Row = Row;
    type Output = Vec<UpcomingArrival>;

    fn dataset_id(&self) -> &'static str {
        "upcoming_arrivals"
    }

    async fn load(&self) -> Result<Vec<Row>, CoreError> {
        let horizon = self.today + chrono::Duration::days(self.window_days);
        sqlx::query_as::<_, Row>(
            "SELECT arrival, district, departure FROM missionary_records \
             WHERE branch = $1 AND active AND arrival > $2 AND arrival <= $3",
        )
        .bind(&self.branch_id)
        .bind(self.today)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::DbInsertFailed(e.to_string()))
    }

    fn validate(&self, rows: &[Row]) -> Result<(), CoreError> {
        if rows.iter().any(|r| r.arrival <= self.today) {
            return Err(CoreError::DbInsertFailed(
                "arrival outside the upcoming window".to_string(),
            ));
        }
        Ok(())
    }

    fn transform(&self, rows: Vec<Row>) -> Vec<UpcomingArrival> {
        let mut grouped: BTreeMap<(NaiveDate, String), UpcomingArrival> = BTreeMap::new();
        for row in rows {
            let district = row.district.unwrap_or_else(|| "unknown".to_string());
            let key = (row.arrival, district.clone());
            let entry = grouped.entry(key).or_insert_with(|| UpcomingArrival {
                arrival_date: row.arrival,
                district,
                count: 0,
                max_departure: None,
            });
            entry.count += 1;
            if let Some(departure) = row.departure {
                entry.max_departure = Some(match entry.max_departure {
                    Some(current) => current.max(departure),
                    None => departure,
                });
            }
        }
        grouped.into_values().collect()
    }

    fn row_count(output: &Vec<UpcomingArrival>) -> usize {
        output.len()
    }
}
