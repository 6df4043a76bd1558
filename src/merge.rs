//! Monthly master merge stage
//!
//! Reconciles the day's clean, geocoded batch into the running monthly
//! master table. The first merge of a month creates the master as a copy
//! of the batch, fixing the schema of record; later merges are strict
//! appends. An append rejection is never retried - a schema-only diff is
//! written for the operator and the run aborts. After a successful merge
//! the input artifact is renamed so a re-run cannot double-count it.

use crate::calls;
use crate::clock::{self, Clock};
use crate::config::RetentionConfig;
use crate::console;
use crate::store::{StoreError, TableStore};
use crate::table::{SchemaMismatch, Table};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Error type for the merge stage
#[derive(Debug)]
pub enum MergeError {
    /// Append rejected; the schema diff was written to `report_path`
    SchemaConflict {
        report_path: PathBuf,
        mismatch: SchemaMismatch,
    },
    Store(StoreError),
    Io(std::io::Error),
    Pattern(regex::Error),
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeError::SchemaConflict { report_path, mismatch } => write!(
                f,
                "Appending to the master table failed ({}). See {} for details.",
                mismatch,
                report_path.display()
            ),
            MergeError::Store(e) => write!(f, "{}", e),
            MergeError::Io(e) => write!(f, "IO error: {}", e),
            MergeError::Pattern(e) => write!(f, "Regex error: {}", e),
        }
    }
}

impl std::error::Error for MergeError {}

impl From<StoreError> for MergeError {
    fn from(e: StoreError) -> Self {
        MergeError::Store(e)
    }
}

impl From<std::io::Error> for MergeError {
    fn from(e: std::io::Error) -> Self {
        MergeError::Io(e)
    }
}

impl From<regex::Error> for MergeError {
    fn from(e: regex::Error) -> Self {
        MergeError::Pattern(e)
    }
}

/// What a successful merge did
#[derive(Debug)]
pub struct MergeOutcome {
    pub month_table: String,
    /// True when this run created the month's master
    pub created: bool,
    pub merged_rows: usize,
    pub total_rows: usize,
    /// Where the consumed input artifact was renamed to
    pub consumed_input: PathBuf,
}

/// Merge the batch into the current month's master table, rename the
/// consumed input, and refresh the current-month working copy.
pub fn merge(
    store: &dyn TableStore,
    clock: &dyn Clock,
    batch: &Table,
    input_file: &Path,
    diff_report: &Path,
) -> Result<MergeOutcome, MergeError> {
    let month_table = calls::month_table_name(&clock::month_key(clock));

    let (created, master) = if !store.exists(&month_table) {
        console::detail(&format!(
            "{} doesn't exist. Copying new data to it.",
            month_table
        ));
        store.save(&month_table, batch)?;
        (true, batch.clone())
    } else {
        let mut master = store.load(&month_table)?;
        if let Err(mismatch) = master.append(batch) {
            let report = master.schema_diff(batch).render(&month_table, "new batch");
            if let Some(parent) = diff_report.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(diff_report, report)?;
            return Err(MergeError::SchemaConflict {
                report_path: diff_report.to_path_buf(),
                mismatch,
            });
        }
        store.save(&month_table, &master)?;
        (false, master)
    };

    let consumed_input = rename_consumed_input(input_file, clock)?;
    store.save(calls::TABLE_THIS_MONTH, &master)?;

    Ok(MergeOutcome {
        month_table,
        created,
        merged_rows: batch.len(),
        total_rows: master.len(),
        consumed_input,
    })
}

/// Rename the input artifact with a run-timestamp suffix. Re-running the
/// job against the same file would create duplicate records; after this
/// rename the next run simply finds no input.
fn rename_consumed_input(input: &Path, clock: &dyn Clock) -> Result<PathBuf, std::io::Error> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input");
    let suffix = clock::timestamp_suffix(clock);
    let file_name = match input.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}_{}", stem, suffix),
    };
    let renamed = input.with_file_name(file_name);
    std::fs::rename(input, &renamed)?;
    Ok(renamed)
}

/// Delete previous months' master tables, once the day is old enough.
/// Deletion is skipped entirely before the configured hour so yesterday's
/// data survives until the new day's first successful merge has happened.
/// Returns the names of the deleted tables.
pub fn apply_retention(
    store: &dyn TableStore,
    clock: &dyn Clock,
    retention: &RetentionConfig,
) -> Result<Vec<String>, MergeError> {
    if retention.keep_past_months {
        return Ok(Vec::new());
    }
    if clock::current_hour(clock) < retention.deletion_hour {
        console::detail(&format!(
            "Skipping deletion because it is before {}:00.",
            retention.deletion_hour
        ));
        return Ok(Vec::new());
    }

    let month_pattern = Regex::new(&format!(r"^{}\d{{6}}$", calls::MONTH_TABLE_PREFIX))?;
    let current = calls::month_table_name(&clock::month_key(clock));
    let mut deleted = Vec::new();
    for name in store.list_tables()? {
        if month_pattern.is_match(&name) && name != current {
            console::detail(&format!("Deleting {}.", name));
            store.delete(&name)?;
            deleted.push(name);
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::GeoWorkspace;
    use crate::table::{Field, FieldType, Value};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn clock_at(y: i32, mo: u32, d: u32, h: u32) -> FixedClock {
        FixedClock(
            NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_opt(h, 4, 0)
                .unwrap(),
        )
    }

    fn batch(ids: &[i64]) -> Table {
        let mut table = Table::new(vec![Field::new(calls::CASE_ID, FieldType::Integer)]);
        for id in ids {
            table.push_row(vec![Value::Integer(*id)]).unwrap();
        }
        table
    }

    struct Fixture {
        dir: TempDir,
        ws: GeoWorkspace,
        input: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let ws = GeoWorkspace::open(&dir.path().join("gdb")).unwrap();
        let input = dir.path().join("toxdata.json");
        std::fs::write(&input, "[]").unwrap();
        Fixture { dir, ws, input }
    }

    #[test]
    fn test_first_merge_creates_master_as_copy() {
        let f = fixture();
        let clock = clock_at(2015, 1, 1, 13);
        let outcome = merge(
            &f.ws,
            &clock,
            &batch(&[1, 2]),
            &f.input,
            &f.dir.path().join("diff.txt"),
        )
        .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.month_table, "calls_201501");
        assert_eq!(outcome.total_rows, 2);
        assert_eq!(f.ws.load("calls_201501").unwrap().len(), 2);
        assert_eq!(f.ws.load(calls::TABLE_THIS_MONTH).unwrap().len(), 2);
        // Input consumed and renamed with the run timestamp
        assert!(!f.input.exists());
        assert_eq!(
            outcome.consumed_input,
            f.dir.path().join("toxdata_20150101_1304.json")
        );
        assert!(outcome.consumed_input.exists());
    }

    #[test]
    fn test_second_merge_appends_preserving_prior_rows() {
        let f = fixture();
        let clock = clock_at(2015, 1, 1, 13);
        merge(&f.ws, &clock, &batch(&[1, 2]), &f.input, &f.dir.path().join("d.txt")).unwrap();

        std::fs::write(&f.input, "[]").unwrap();
        let clock = clock_at(2015, 1, 2, 13);
        let outcome = merge(
            &f.ws,
            &clock,
            &batch(&[3]),
            &f.input,
            &f.dir.path().join("d.txt"),
        )
        .unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.total_rows, 3);
        let ids = f.ws.load("calls_201501").unwrap();
        let ids: Vec<String> = ids
            .column(calls::CASE_ID)
            .unwrap()
            .iter()
            .map(|v| v.key_string())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_schema_conflict_writes_report_and_leaves_master_alone() {
        let f = fixture();
        let clock = clock_at(2015, 1, 1, 13);
        merge(&f.ws, &clock, &batch(&[1]), &f.input, &f.dir.path().join("d.txt")).unwrap();

        // Next day's export grew an extra column
        let mut bad = batch(&[2]);
        bad.add_field("Extra", FieldType::Text).unwrap();
        std::fs::write(&f.input, "[]").unwrap();
        let report = f.dir.path().join("reports").join("diff.txt");
        let err = merge(&f.ws, &clock_at(2015, 1, 2, 13), &bad, &f.input, &report).unwrap_err();

        match err {
            MergeError::SchemaConflict { report_path, .. } => {
                assert_eq!(report_path, report);
                let text = std::fs::read_to_string(&report).unwrap();
                assert!(text.contains("Only in new batch: Extra"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // Master untouched, input not consumed
        assert_eq!(f.ws.load("calls_201501").unwrap().len(), 1);
        assert!(f.input.exists());
    }

    #[test]
    fn test_retention_skipped_before_deletion_hour() {
        let f = fixture();
        f.ws.save("calls_201412", &batch(&[1])).unwrap();
        f.ws.save("calls_201501", &batch(&[2])).unwrap();

        let deleted =
            apply_retention(&f.ws, &clock_at(2015, 1, 1, 0), &RetentionConfig::default())
                .unwrap();
        assert!(deleted.is_empty());
        assert!(f.ws.exists("calls_201412"));
    }

    #[test]
    fn test_retention_deletes_only_past_months() {
        let f = fixture();
        f.ws.save("calls_201411", &batch(&[1])).unwrap();
        f.ws.save("calls_201412", &batch(&[1])).unwrap();
        f.ws.save("calls_201501", &batch(&[2])).unwrap();
        f.ws.save(calls::TABLE_COUNTY_REF, &batch(&[9])).unwrap();
        f.ws.save(calls::TABLE_THIS_MONTH, &batch(&[2])).unwrap();

        let deleted =
            apply_retention(&f.ws, &clock_at(2015, 1, 1, 1), &RetentionConfig::default())
                .unwrap();
        assert_eq!(
            deleted,
            vec!["calls_201411".to_string(), "calls_201412".to_string()]
        );
        assert!(f.ws.exists("calls_201501"), "current month survives");
        assert!(f.ws.exists(calls::TABLE_COUNTY_REF));
        assert!(f.ws.exists(calls::TABLE_THIS_MONTH));
    }

    #[test]
    fn test_retention_disabled_by_keep_past_months() {
        let f = fixture();
        f.ws.save("calls_201412", &batch(&[1])).unwrap();
        let retention = RetentionConfig {
            keep_past_months: true,
            ..RetentionConfig::default()
        };
        let deleted = apply_retention(&f.ws, &clock_at(2015, 1, 1, 23), &retention).unwrap();
        assert!(deleted.is_empty());
        assert!(f.ws.exists("calls_201412"));
    }
}
