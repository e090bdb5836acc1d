//! UpcomingBirthdays pipeline: next birthday falling within the configured
//! window, grouped by month then day, ordered within a day by treatment
//! then name.

use crate::datasets::DatasetPipeline;
use crate::error::CoreError;
use crate::models::UpcomingBirthday;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rocket_db_pools::sqlx::{self, PgPool};

#[derive(sqlx::FromRow)]
struct Row {
    birth_date: NaiveDate,
    treatment: Option<String>,
    name: Option<String>,
}

pub struct UpcomingBirthdaysPipeline {
    pool: PgPool,
    branch_id: String,
    today: NaiveDate,
    window_days: i64,
}

impl UpcomingBirthdaysPipeline {
    pub fn new(pool: PgPool, branch_id: String, today: NaiveDate, window_days: i64) -> Self {
        Self {
            pool,
            branch_id,
            today,
            window_days,
        }
    }

    /// The next occurrence of `birth_date`'s month/day on or after `today`,
    /// wrapping to next year; February 29 falls back to the 28th in
    /// non-leap years.
    fn next_birthday(&self, birth_date: NaiveDate) -> NaiveDate {
        let candidate = NaiveDate::from_ymd_opt(self.today.year(), birth_date.month(), birth_date.day())
            .or_else(|| NaiveDate::from_ymd_opt(self.today.year(), 2, 28))
            .expect("fallback date is always valid");
        if candidate > self.today {
            candidate
        } else {
            NaiveDate::from_ymd_opt(self.today.year() + 1, birth_date.month(), birth_date.day())
                .or_else(|| NaiveDate::from_ymd_opt(self.today.year() + 1, 2, 28))
                .expect("fallback date is always valid")
        }
    }
}

#[async_trait]
impl DatasetPipeline for UpcomingBirthdaysPipeline {
    type Row = Row;
    type Output = Vec<UpcomingBirthday>;

    fn dataset_id(&self) -> &'static str {
        "upcoming_birthdays"
    }

    async fn load(&self) -> Result<Vec<Row>, CoreError> {
        sqlx::query_as::<_, Row>(
            "SELECT birth_date, treatment, name FROM missionary_records \
             WHERE branch = $1 AND active AND birth_date IS NOT NULL",
        )
        .bind(&self.branch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::DbInsertFailed(e.to_string()))
    }

    fn validate(&self, _rows: &[Row]) -> Result<(), CoreError> {
        Ok(())
    }

    fn transform(&self, rows: Vec<Row>) -> Vec<UpcomingBirthday> {
        let horizon = self.today + chrono::Duration::days(self.window_days);

        let mut upcoming: Vec<(NaiveDate, UpcomingBirthday)> = rows
            .into_iter()
            .filter_map(|row| {
                let next = self.next_birthday(row.birth_date);
                if next > self.today && next <= horizon {
                    Some((
                        next,
                        UpcomingBirthday {
                            month: next.month(),
                            day: next.day(),
                            treatment: row.treatment,
                            name: row.name.unwrap_or_default(),
                        },
                    ))
                } else {
                    None
                }
            })
            .collect();

        upcoming.sort_by(|(date_a, a), (date_b, b)| {
            date_a
                .cmp(date_b)
                .then_with(|| a.treatment.cmp(&b.treatment))
                .then_with(|| a.name.cmp(&b.name))
        });

        upcoming.into_iter().map(|(_, birthday)| birthday).collect()
    }

    fn row_count(output: &Vec<UpcomingBirthday>) -> usize {
        output.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(today: NaiveDate) -> UpcomingBirthdaysPipeline {
        UpcomingBirthdaysPipeline {
            pool: rocket_db_pools::sqlx::Pool::connect_lazy("postgres://localhost/test")
                .expect("lazy pool never touches the network"),
            branch_id: "centro".to_string(),
            today,
            window_days: 14,
        }
    }

    #[test]
    fn next_birthday_wraps_to_following_year_when_passed() {
        let p = pipeline(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        let next = p.next_birthday(NaiveDate::from_ymd_opt(1990, 1, 5).unwrap());
        assert_eq!(next, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
    }

    #[test]
    fn next_birthday_stays_in_current_year_when_still_ahead() {
        let p = pipeline(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        let next = p.next_birthday(NaiveDate::from_ymd_opt(1990, 1, 20).unwrap());
        assert_eq!(next, NaiveDate::from_ymd_opt(2025, 1, 20).unwrap());
    }
}
