//! Derived views: today, this hour, and the county choropleth aggregate
//!
//! Everything here is replace-don't-patch: each run rebuilds the views
//! from the current month's master, and the next run supersedes them.

use crate::calls;
use crate::clock::{self, Clock};
use crate::store::{StoreError, TableStore};
use crate::table::{Table, TableError, Value};

/// Error type for the rollup stage
#[derive(Debug)]
pub enum RollupError {
    Store(StoreError),
    Table(TableError),
}

impl std::fmt::Display for RollupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollupError::Store(e) => write!(f, "{}", e),
            RollupError::Table(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RollupError {}

impl From<StoreError> for RollupError {
    fn from(e: StoreError) -> Self {
        RollupError::Store(e)
    }
}

impl From<TableError> for RollupError {
    fn from(e: TableError) -> Self {
        RollupError::Table(e)
    }
}

/// Row counts of the rebuilt views
#[derive(Debug)]
pub struct RollupOutcome {
    pub daily_rows: usize,
    pub hourly_rows: usize,
    pub counties: usize,
}

/// Rebuild all three derived views from the current-month working copy
pub fn build_views(store: &dyn TableStore, clock: &dyn Clock) -> Result<RollupOutcome, RollupError> {
    let master = store.load(calls::TABLE_THIS_MONTH)?;

    let day_start = clock::start_of_day(clock);
    let daily = master.select(|row| {
        row.get(calls::START_DATE)
            .as_date()
            .map(|d| d >= day_start)
            .unwrap_or(false)
    });
    store.save(calls::TABLE_THIS_DAY, &daily)?;

    let hour_start = clock::start_of_hour(clock);
    let hourly = daily.select(|row| {
        row.get(calls::START_DATE)
            .as_date()
            .map(|d| d >= hour_start)
            .unwrap_or(false)
    });
    store.save(calls::TABLE_THIS_HOUR, &hourly)?;

    let counties = county_aggregate(store, &daily)?;

    Ok(RollupOutcome {
        daily_rows: daily.len(),
        hourly_rows: hourly.len(),
        counties,
    })
}

/// Per-county counts of the daily view, de-duplicated by case ID.
/// Duplicates arise when the same case is re-geocoded or re-imported;
/// the first occurrence wins.
pub fn county_counts(daily: &Table) -> Result<Table, TableError> {
    let unique = daily.dedup_by(calls::CASE_ID)?;
    let mut totals = unique.frequency(calls::COUNTY)?;
    totals.rename_field("FREQUENCY", calls::NUM_TODAY)?;
    Ok(totals)
}

/// Join today's totals onto the county polygon reference set. Every
/// polygon ends up with an integer count - zero, never null, for counties
/// without calls - so the choropleth renders every county.
fn county_aggregate(store: &dyn TableStore, daily: &Table) -> Result<usize, RollupError> {
    let unique = daily.dedup_by(calls::CASE_ID)?;
    store.save(calls::TABLE_TODAY_UNIQUE, &unique)?;

    let totals = county_counts(daily)?;
    store.save(calls::TABLE_TODAY_BY_COUNTY, &totals)?;

    let mut counties = store.load(calls::TABLE_COUNTY_REF)?;
    // Drop last run's counts before joining the fresh ones
    counties.delete_field(calls::NUM_TODAY);
    counties.join_field(
        calls::COUNTY_REF_NAME,
        &totals,
        calls::COUNTY,
        calls::NUM_TODAY,
    )?;
    counties.calculate_field(calls::NUM_TODAY, |v| {
        if v.is_null() {
            Value::Integer(0)
        } else {
            v.clone()
        }
    })?;
    store.save(calls::TABLE_COUNTY_REF, &counties)?;
    Ok(counties.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::GeoWorkspace;
    use crate::table::{Field, FieldType};
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn date(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn calls_table(rows: &[(i64, &str, chrono::NaiveDateTime)]) -> Table {
        let mut table = Table::new(vec![
            Field::new(calls::CASE_ID, FieldType::Integer),
            Field::new(calls::COUNTY, FieldType::Text),
            Field::new(calls::START_DATE, FieldType::Date),
        ]);
        for (id, county, when) in rows {
            table
                .push_row(vec![
                    Value::Integer(*id),
                    Value::Text(county.to_string()),
                    Value::Date(*when),
                ])
                .unwrap();
        }
        table
    }

    fn county_ref(names: &[&str]) -> Table {
        let mut table = Table::new(vec![Field::new(calls::COUNTY_REF_NAME, FieldType::Text)]);
        for name in names {
            table
                .push_row(vec![Value::Text(name.to_string())])
                .unwrap();
        }
        table
    }

    #[test]
    fn test_daily_and_hourly_views() {
        let dir = TempDir::new().unwrap();
        let ws = GeoWorkspace::open(dir.path()).unwrap();
        ws.save(
            calls::TABLE_THIS_MONTH,
            &calls_table(&[
                (1, "King", date(2014, 12, 31, 23, 30)),
                (2, "King", date(2015, 1, 1, 9, 15)),
                (3, "Pierce", date(2015, 1, 1, 13, 4)),
                (4, "King", date(2015, 1, 1, 13, 30)),
            ]),
        )
        .unwrap();
        ws.save(calls::TABLE_COUNTY_REF, &county_ref(&["King", "Pierce"]))
            .unwrap();

        let clock = FixedClock(date(2015, 1, 1, 13, 45));
        let outcome = build_views(&ws, &clock).unwrap();

        assert_eq!(outcome.daily_rows, 3, "yesterday's call excluded");
        assert_eq!(outcome.hourly_rows, 2, "only the 13:00 hour");
        assert_eq!(outcome.counties, 2);
        assert_eq!(ws.load(calls::TABLE_THIS_DAY).unwrap().len(), 3);
        assert_eq!(ws.load(calls::TABLE_THIS_HOUR).unwrap().len(), 2);
    }

    #[test]
    fn test_every_polygon_gets_integer_count() {
        let dir = TempDir::new().unwrap();
        let ws = GeoWorkspace::open(dir.path()).unwrap();
        ws.save(
            calls::TABLE_THIS_MONTH,
            &calls_table(&[
                (1, "King", date(2015, 1, 1, 9, 0)),
                (2, "King", date(2015, 1, 1, 10, 0)),
            ]),
        )
        .unwrap();
        ws.save(
            calls::TABLE_COUNTY_REF,
            &county_ref(&["King", "Pierce", "Ferry"]),
        )
        .unwrap();

        build_views(&ws, &FixedClock(date(2015, 1, 1, 12, 0))).unwrap();

        let counties = ws.load(calls::TABLE_COUNTY_REF).unwrap();
        let counts: Vec<&Value> = counties.column(calls::NUM_TODAY).unwrap();
        assert_eq!(counts[0], &Value::Integer(2));
        assert_eq!(counts[1], &Value::Integer(0), "no calls means explicit zero");
        assert_eq!(counts[2], &Value::Integer(0));
        assert!(counts.iter().all(|v| !v.is_null()));
    }

    #[test]
    fn test_stale_counts_are_replaced_not_patched() {
        let dir = TempDir::new().unwrap();
        let ws = GeoWorkspace::open(dir.path()).unwrap();
        ws.save(
            calls::TABLE_THIS_MONTH,
            &calls_table(&[(1, "Pierce", date(2015, 1, 2, 9, 0))]),
        )
        .unwrap();

        // county_ref still carries yesterday's counts
        let mut stale = county_ref(&["King", "Pierce"]);
        stale.add_field(calls::NUM_TODAY, FieldType::Integer).unwrap();
        stale
            .calculate_field(calls::NUM_TODAY, |_| Value::Integer(99))
            .unwrap();
        ws.save(calls::TABLE_COUNTY_REF, &stale).unwrap();

        build_views(&ws, &FixedClock(date(2015, 1, 2, 12, 0))).unwrap();

        let counties = ws.load(calls::TABLE_COUNTY_REF).unwrap();
        let counts: Vec<&Value> = counties.column(calls::NUM_TODAY).unwrap();
        assert_eq!(counts[0], &Value::Integer(0));
        assert_eq!(counts[1], &Value::Integer(1));
    }

    proptest! {
        /// Duplicate case IDs must not inflate county counts: appending
        /// re-imported copies of existing cases leaves the aggregate
        /// exactly as if the duplicates never existed.
        #[test]
        fn prop_county_counts_invariant_to_duplicates(
            rows in proptest::collection::vec((0i64..20, 0usize..3), 1..40),
            dup_indices in proptest::collection::vec(any::<prop::sample::Index>(), 0..20),
        ) {
            let county_names = ["King", "Pierce", "Spokane"];
            let base: Vec<(i64, &str, chrono::NaiveDateTime)> = rows
                .iter()
                .map(|(id, c)| (*id, county_names[*c], date(2015, 1, 1, 9, 0)))
                .collect();

            let mut with_dups = base.clone();
            for idx in &dup_indices {
                let row = *idx.get(&base);
                with_dups.push(row);
            }

            let counts_base = county_counts(&calls_table(&base)).unwrap();
            let counts_dups = county_counts(&calls_table(&with_dups)).unwrap();
            prop_assert_eq!(counts_base, counts_dups);
        }
    }
}
