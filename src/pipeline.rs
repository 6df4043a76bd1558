//! Pipeline orchestration
//!
//! One call runs one batch: import and gate, clean, geocode and gate,
//! merge, retention, rollups, then the publish workflow. Stages run
//! strictly in order and any failure aborts the remainder - except
//! publishing, whose failure is demoted to a warning because the local
//! data work has already succeeded by then.

use crate::calls;
use crate::clean;
use crate::clock::{self, Clock};
use crate::config::Config;
use crate::console;
use crate::merge::{self, MergeError};
use crate::portal::PortalTransport;
use crate::publish::{PublishOutcome, PublishWorkflow};
use crate::rollup::{self, RollupError};
use crate::store::{StoreError, TableStore};
use crate::table::TableError;
use crate::validate::{self, ValidateError};

/// Error type for an aborted run
#[derive(Debug)]
pub enum PipelineError {
    Validate(ValidateError),
    Clean(TableError),
    Merge(MergeError),
    Rollup(RollupError),
    Store(StoreError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Validate(e) => write!(f, "{}", e),
            PipelineError::Clean(e) => write!(f, "{}", e),
            PipelineError::Merge(e) => write!(f, "{}", e),
            PipelineError::Rollup(e) => write!(f, "{}", e),
            PipelineError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ValidateError> for PipelineError {
    fn from(e: ValidateError) -> Self {
        PipelineError::Validate(e)
    }
}

impl From<TableError> for PipelineError {
    fn from(e: TableError) -> Self {
        PipelineError::Clean(e)
    }
}

impl From<MergeError> for PipelineError {
    fn from(e: MergeError) -> Self {
        PipelineError::Merge(e)
    }
}

impl From<RollupError> for PipelineError {
    fn from(e: RollupError) -> Self {
        PipelineError::Rollup(e)
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        PipelineError::Store(e)
    }
}

impl PipelineError {
    /// Process exit code: 2 for a rejected batch, 1 for everything else
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Validate(ValidateError::UnmatchedCounties(_)) => 2,
            _ => 1,
        }
    }

    /// Lines for the operator-facing error banner
    pub fn banner_lines(&self) -> Vec<String> {
        match self {
            PipelineError::Validate(ValidateError::UnmatchedCounties(_)) => vec![
                "The counties listed above were not matched".to_string(),
                "and therefore the new data file was NOT ADDED.".to_string(),
            ],
            PipelineError::Merge(MergeError::SchemaConflict { report_path, .. }) => vec![
                "Appending to the master table failed, probably because the table schemas don't match."
                    .to_string(),
                format!("See {} for more details.", report_path.display()),
            ],
            other => vec![other.to_string()],
        }
    }
}

/// What a completed run did
#[derive(Debug)]
pub struct RunSummary {
    pub imported_rows: usize,
    pub cleaned_rows: usize,
    pub month_table: String,
    pub master_rows: usize,
    pub daily_rows: usize,
    pub hourly_rows: usize,
    pub deleted_tables: Vec<String>,
    /// None when publishing was skipped
    pub publish: Option<PublishOutcome>,
}

/// Run the full pipeline. Pass `None` for the transport to skip the
/// publish workflow (local processing only).
pub fn run(
    config: &Config,
    store: &dyn TableStore,
    clock: &dyn Clock,
    transport: Option<&dyn PortalTransport>,
) -> Result<RunSummary, PipelineError> {
    let input_file = &config.workspace.input_file;

    console::step(&format!("Importing {}...", input_file.display()));
    let mut batch = validate::import_checked(store, input_file)?;
    store.save(calls::TABLE_NEW, &batch)?;
    let imported_rows = batch.len();
    console::detail(&format!("{} record(s) imported.", imported_rows));

    console::step("Making sure the start date is a date field...");
    clean::ensure_start_date(&mut batch)?;

    console::step("Keeping only records from today...");
    let day_start = clock::start_of_day(clock);
    let today = batch.select(|row| {
        row.get(calls::START_DATE)
            .as_date()
            .map(|d| d >= day_start)
            .unwrap_or(false)
    });
    store.save(calls::TABLE_NEW_TODAY, &today)?;

    console::step("Cleaning the new data...");
    let cleaned = clean::clean_batch(&today, &config.data.target_state)?;
    store.save(calls::TABLE_NEW_IN_STATE, &cleaned)?;
    let cleaned_rows = cleaned.len();
    console::detail(&format!("{} record(s) in scope.", cleaned_rows));

    console::step(&format!(
        "Geocoding with the {} locator...",
        config.workspace.locator
    ));
    let geocoded = store.geocode(&cleaned, &config.workspace.locator, calls::COUNTY)?;
    store.save(calls::TABLE_NEW_GEO, &geocoded)?;
    validate::require_full_geocode_match(&geocoded)?;

    console::step("Adding new data to this month's table...");
    let merged = merge::merge(
        store,
        clock,
        &geocoded,
        input_file,
        &config.workspace.diff_report,
    )?;
    console::detail(&format!(
        "Success. Renamed input file to {}.",
        merged.consumed_input.display()
    ));

    console::step("Checking for old data tables...");
    let deleted_tables = merge::apply_retention(store, clock, &config.retention)?;

    console::step("Rebuilding today's views...");
    let views = rollup::build_views(store, clock)?;

    if !config.retention.keep_intermediate_tables {
        console::step("Deleting intermediate tables...");
        cleanup_intermediates(store)?;
    }

    let publish = match transport {
        Some(transport) => {
            console::step("Starting the feature service publish process...");
            let outcome = PublishWorkflow::new(config, transport).run();
            if let PublishOutcome::Abandoned { attempts, failure } = &outcome {
                console::warning_banner(&[
                    format!("{} (after {} attempt(s))", failure, attempts),
                    "The local data was processed successfully; only the upload failed."
                        .to_string(),
                ]);
            }
            Some(outcome)
        }
        None => None,
    };

    Ok(RunSummary {
        imported_rows,
        cleaned_rows,
        month_table: merged.month_table,
        master_rows: merged.total_rows,
        daily_rows: views.daily_rows,
        hourly_rows: views.hourly_rows,
        deleted_tables,
        publish,
    })
}

/// Drop the per-run batch tables. Missing tables are fine - an earlier
/// abort may have left only some of them behind.
fn cleanup_intermediates(store: &dyn TableStore) -> Result<(), StoreError> {
    const INTERMEDIATES: [&str; 6] = [
        calls::TABLE_NEW,
        calls::TABLE_NEW_TODAY,
        calls::TABLE_NEW_IN_STATE,
        calls::TABLE_NEW_GEO,
        calls::TABLE_TODAY_UNIQUE,
        calls::TABLE_TODAY_BY_COUNTY,
    ];
    for name in INTERMEDIATES {
        if store.exists(name) {
            store.delete(name)?;
        }
    }
    Ok(())
}
