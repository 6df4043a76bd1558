//! Toxmap - poison-control call ETL and hosted map publisher
//!
//! Ingests the periodic export of poison-control call records, validates
//! and cleans it, geocodes each record to a county, merges it into a
//! month-partitioned master dataset, rebuilds the day's map views, and
//! publishes the refreshed dataset to the hosted feature service.
//!
//! # Stages
//!
//! | Stage | Purpose |
//! |-------|---------|
//! | `validate` | null-date gate (one re-import), all-or-nothing geocode gate |
//! | `clean` | county casing, in-scope filter, display spacing, type fixes |
//! | `merge` | append to the monthly master; schema diff report on conflict |
//! | `rollup` | today / this-hour views and the county choropleth counts |
//! | `publish` | token auth, service-definition upload, publish, share |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use toxmap::{Config, GeoWorkspace, SystemClock};
//!
//! let config = Config::load(Path::new("toxmap.toml")).unwrap();
//! let store = GeoWorkspace::open(&config.workspace.dir).unwrap();
//!
//! // Local processing only; pass a transport to publish as well
//! let summary = toxmap::run(&config, &store, &SystemClock, None).unwrap();
//! println!("{} rows in {}", summary.master_rows, summary.month_table);
//! ```

pub mod calls;
pub mod clean;
pub mod clock;
pub mod config;
pub mod console;
pub mod draft;
pub mod merge;
pub mod pipeline;
pub mod portal;
pub mod publish;
pub mod rollup;
pub mod store;
pub mod table;
pub mod validate;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use pipeline::{run, PipelineError, RunSummary};
pub use portal::{HttpTransport, PortalClient, PortalError, PortalTransport};
pub use publish::{PublishOutcome, PublishWorkflow};
pub use store::{GeoWorkspace, StoreError, TableStore};
pub use table::{Field, FieldType, SchemaMismatch, Table, Value};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify core names are re-exported from the crate root
        let _ = calls::CASE_ID;
        let _ = FieldType::Text;
    }
}
