//! Validation gates
//!
//! Two admission checks guard the pipeline: the start-date field must be
//! populated on import (one collaborator-level re-read is allowed - the
//! export sometimes delivers blank dates on the first pull), and after
//! geocoding every row must have matched. Both gates reject the whole
//! batch; partially-admitted data would silently corrupt the county
//! aggregate downstream.

use crate::calls;
use crate::console;
use crate::store::{StoreError, TableStore, STATUS_FIELD, STATUS_UNMATCHED};
use crate::table::{Table, TableError};
use std::path::Path;

/// Error type for validation gates
#[derive(Debug)]
pub enum ValidateError {
    /// Start-date nulls survived the single re-import
    PersistentNullDates { count: usize },
    /// Distinct county values that failed to geocode, sorted
    UnmatchedCounties(Vec<String>),
    Store(StoreError),
    Table(TableError),
}

impl std::fmt::Display for ValidateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidateError::PersistentNullDates { count } => write!(
                f,
                "Null value(s) found in the start date field after re-import ({} row(s)). Script should be re-run.",
                count
            ),
            ValidateError::UnmatchedCounties(counties) => write!(
                f,
                "{} county value(s) were not matched by the locator: {}",
                counties.len(),
                counties.join(", ")
            ),
            ValidateError::Store(e) => write!(f, "{}", e),
            ValidateError::Table(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ValidateError {}

impl From<StoreError> for ValidateError {
    fn from(e: StoreError) -> Self {
        ValidateError::Store(e)
    }
}

impl From<TableError> for ValidateError {
    fn from(e: TableError) -> Self {
        ValidateError::Table(e)
    }
}

fn null_date_count(table: &Table) -> Result<usize, ValidateError> {
    Ok(table
        .column(calls::START_DATE)?
        .iter()
        .filter(|v| v.is_null())
        .count())
}

/// Import the input artifact, enforcing the populated-date invariant.
/// If null dates are found the import is retried exactly once; if the
/// retry still yields nulls the batch is rejected.
pub fn import_checked(store: &dyn TableStore, path: &Path) -> Result<Table, ValidateError> {
    let table = store.import(path)?;
    let nulls = null_date_count(&table)?;
    if nulls == 0 {
        return Ok(table);
    }

    console::detail("Null value(s) found in the start date field. Trying again...");
    let table = store.import(path)?;
    let nulls = null_date_count(&table)?;
    if nulls == 0 {
        return Ok(table);
    }
    Err(ValidateError::PersistentNullDates { count: nulls })
}

/// All-or-nothing geocode admission: any unmatched row rejects the whole
/// batch. The distinct offending county values are reported so the
/// operator can fix the locator or the data.
pub fn require_full_geocode_match(table: &Table) -> Result<(), ValidateError> {
    let unmatched = table.select(|row| {
        row.get(STATUS_FIELD).as_text() == Some(STATUS_UNMATCHED)
    });
    if unmatched.is_empty() {
        return Ok(());
    }

    let mut counties: Vec<String> = unmatched
        .column(calls::COUNTY)?
        .iter()
        .map(|v| v.key_string())
        .collect();
    counties.sort();
    counties.dedup();
    for county in &counties {
        console::detail(&format!("Unmatched: {}", county));
    }
    Err(ValidateError::UnmatchedCounties(counties))
}
