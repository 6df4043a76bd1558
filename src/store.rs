//! Workspace table store and county geocoder
//!
//! `GeoWorkspace` persists each named table as a JSON document inside a
//! workspace directory and resolves county names to points through an
//! address-locator document stored alongside the tables. The pipeline only
//! talks to the `TableStore` trait, so tests can substitute scripted stores.

use crate::table::{Field, FieldType, Table, TableError, Value};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Geocode match status field added to geocoded tables
pub const STATUS_FIELD: &str = "Status";
/// Geocoded point fields
pub const X_FIELD: &str = "X";
pub const Y_FIELD: &str = "Y";

/// Match status values written by the locator
pub const STATUS_MATCHED: &str = "M";
pub const STATUS_UNMATCHED: &str = "U";

/// Error type for store operations
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Parse { path: PathBuf, message: String },
    MissingTable(String),
    MissingInput(PathBuf),
    MissingLocator(String),
    Table(TableError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Parse { path, message } => {
                write!(f, "Failed to parse {}: {}", path.display(), message)
            }
            StoreError::MissingTable(name) => write!(f, "Table not found: {}", name),
            StoreError::MissingInput(path) => {
                write!(f, "Unable to find {}", path.display())
            }
            StoreError::MissingLocator(name) => write!(f, "Address locator not found: {}", name),
            StoreError::Table(e) => write!(f, "Table error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<TableError> for StoreError {
    fn from(e: TableError) -> Self {
        StoreError::Table(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// The tabular/geospatial collaborator the pipeline runs against
pub trait TableStore {
    /// Import an input artifact into an in-memory table, inferring the
    /// schema from the data (numeric-looking columns come back numeric -
    /// the cleaning stage is responsible for correcting that).
    fn import(&self, path: &Path) -> Result<Table>;

    /// Load a named table from the workspace
    fn load(&self, name: &str) -> Result<Table>;

    /// Save (or overwrite) a named table
    fn save(&self, name: &str, table: &Table) -> Result<()>;

    fn exists(&self, name: &str) -> bool;

    fn delete(&self, name: &str) -> Result<()>;

    /// All table names in the workspace, sorted
    fn list_tables(&self) -> Result<Vec<String>>;

    /// Geocode the address field against a named locator. The result is a
    /// copy of the input annotated with point and match-status fields;
    /// unmatched rows carry [`STATUS_UNMATCHED`].
    fn geocode(&self, table: &Table, locator: &str, address_field: &str) -> Result<Table>;
}

/// County address locator: resolves a county name to a point
#[derive(Debug, Deserialize)]
struct CountyLocator {
    counties: HashMap<String, (f64, f64)>,
}

/// Directory-backed store persisting tables as JSON documents
pub struct GeoWorkspace {
    dir: PathBuf,
}

impl GeoWorkspace {
    /// Open (creating if necessary) a workspace directory
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn locator_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.locator.json", name))
    }

    fn parse_error(path: &Path, e: impl std::fmt::Display) -> StoreError {
        StoreError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    }
}

/// Infer a column type from the JSON values observed in that column.
/// Any string makes the column Text; any fraction makes it Double;
/// otherwise Integer. All-null columns default to Text.
fn infer_type(values: &[&serde_json::Value]) -> FieldType {
    let mut seen_number = false;
    let mut seen_double = false;
    for v in values {
        match v {
            serde_json::Value::Null => {}
            serde_json::Value::Number(n) => {
                seen_number = true;
                if n.as_i64().is_none() {
                    seen_double = true;
                }
            }
            _ => return FieldType::Text,
        }
    }
    match (seen_number, seen_double) {
        (true, true) => FieldType::Double,
        (true, false) => FieldType::Integer,
        (false, _) => FieldType::Text,
    }
}

fn json_to_value(v: &serde_json::Value, field_type: FieldType) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Number(n) => match field_type {
            FieldType::Double => n.as_f64().map(Value::Double).unwrap_or(Value::Null),
            _ => n
                .as_i64()
                .map(Value::Integer)
                .or_else(|| n.as_f64().map(Value::Double))
                .unwrap_or(Value::Null),
        },
        serde_json::Value::Bool(b) => Value::Text(b.to_string()),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

impl TableStore for GeoWorkspace {
    fn import(&self, path: &Path) -> Result<Table> {
        if !path.is_file() {
            return Err(StoreError::MissingInput(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let records: Vec<BTreeMap<String, serde_json::Value>> =
            serde_json::from_str(&content).map_err(|e| Self::parse_error(path, e))?;

        // Union of keys across all records, in sorted order
        let mut names: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        names.sort();

        let null = serde_json::Value::Null;
        let schema: Vec<Field> = names
            .iter()
            .map(|name| {
                let column: Vec<&serde_json::Value> = records
                    .iter()
                    .map(|r| r.get(name).unwrap_or(&null))
                    .collect();
                Field::new(name, infer_type(&column))
            })
            .collect();

        let mut table = Table::new(schema);
        for record in &records {
            let row: Vec<Value> = names
                .iter()
                .map(|name| {
                    let field_type = table.field_type(name).unwrap_or(FieldType::Text);
                    record
                        .get(name)
                        .map(|v| json_to_value(v, field_type))
                        .unwrap_or(Value::Null)
                })
                .collect();
            table.push_row(row)?;
        }
        Ok(table)
    }

    fn load(&self, name: &str) -> Result<Table> {
        let path = self.table_path(name);
        if !path.is_file() {
            return Err(StoreError::MissingTable(name.to_string()));
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| Self::parse_error(&path, e))
    }

    fn save(&self, name: &str, table: &Table) -> Result<()> {
        let path = self.table_path(name);
        let content = serde_json::to_string_pretty(table)
            .map_err(|e| Self::parse_error(&path, e))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.table_path(name).is_file()
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.table_path(name);
        if !path.is_file() {
            return Err(StoreError::MissingTable(name.to_string()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            // Locator documents live beside the tables but are not tables
            if file_name.ends_with(".locator.json") {
                continue;
            }
            if let Some(name) = file_name.strip_suffix(".json") {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn geocode(&self, table: &Table, locator: &str, address_field: &str) -> Result<Table> {
        let path = self.locator_path(locator);
        if !path.is_file() {
            return Err(StoreError::MissingLocator(locator.to_string()));
        }
        let content = std::fs::read_to_string(&path)?;
        let locator: CountyLocator =
            serde_json::from_str(&content).map_err(|e| Self::parse_error(&path, e))?;

        fn hit(
            locator: &CountyLocator,
            row: crate::table::RowRef<'_>,
            address_field: &str,
        ) -> Option<(f64, f64)> {
            row.get(address_field)
                .as_text()
                .and_then(|name| locator.counties.get(name).copied())
        }

        let mut geocoded = table.clone();
        geocoded.add_field(X_FIELD, FieldType::Double)?;
        geocoded.add_field(Y_FIELD, FieldType::Double)?;
        geocoded.add_field(STATUS_FIELD, FieldType::Text)?;
        geocoded.calculate_field_with(X_FIELD, |row| {
            hit(&locator, row, address_field)
                .map(|(x, _)| Value::Double(x))
                .unwrap_or(Value::Null)
        })?;
        geocoded.calculate_field_with(Y_FIELD, |row| {
            hit(&locator, row, address_field)
                .map(|(_, y)| Value::Double(y))
                .unwrap_or(Value::Null)
        })?;
        geocoded.calculate_field_with(STATUS_FIELD, |row| {
            let status = if hit(&locator, row, address_field).is_some() {
                STATUS_MATCHED
            } else {
                STATUS_UNMATCHED
            };
            Value::Text(status.to_string())
        })?;

        Ok(geocoded)
    }
}
