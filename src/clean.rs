//! Batch cleaning stage
//!
//! Order-sensitive, pure transformations over an admitted batch: county
//! names to title case, out-of-scope records dropped, category text spaced
//! for display, and field types reconciled through one reusable migration
//! recipe. Every step is idempotent against its own pre-state.

use crate::calls;
use crate::table::{FieldType, Table, TableError, Value};
use chrono::NaiveDateTime;

/// Run the full cleaning sequence over an admitted batch
pub fn clean_batch(batch: &Table, target_state: &str) -> Result<Table, TableError> {
    let mut batch = batch.clone();
    title_case_county(&mut batch)?;
    let mut in_scope = select_in_scope(&batch, target_state);
    space_categories(&mut in_scope)?;
    ensure_zip_text(&mut in_scope)?;
    Ok(in_scope)
}

/// Title-case the county name field (display and join consistency)
pub fn title_case_county(table: &mut Table) -> Result<(), TableError> {
    table.calculate_field(calls::COUNTY, |v| match v {
        Value::Text(s) => Value::Text(title_case(s)),
        other => other.clone(),
    })
}

/// Keep records from the target state whose county is not an unknown
/// sentinel. Records failing the predicate are dropped, not erred;
/// a null county never matches.
pub fn select_in_scope(table: &Table, target_state: &str) -> Table {
    table.select(|row| {
        let in_state = row.get(calls::STATE).as_text() == Some(target_state);
        let known_county = row
            .get(calls::COUNTY)
            .as_text()
            .map(|c| !c.starts_with(calls::UNKNOWN_COUNTY_PREFIX))
            .unwrap_or(false);
        in_state && known_county
    })
}

/// Insert separator spacing into the category description for display
pub fn space_categories(table: &mut Table) -> Result<(), TableError> {
    table.calculate_field(calls::CATEGORY, |v| match v {
        Value::Text(s) => Value::Text(s.replace('/', " / ")),
        other => other.clone(),
    })
}

/// Migrate a field to the correct type: add a temp field, recompute values
/// through the conversion, delete the original, rename the temp back.
/// A field already of the target type is left alone.
pub fn migrate_field_type<F>(
    table: &mut Table,
    field: &str,
    target_type: FieldType,
    convert: F,
) -> Result<(), TableError>
where
    F: Fn(&Value) -> Value,
{
    if table.field_type(field) == Some(target_type) {
        return Ok(());
    }
    let temp = format!("{}_conv", field);
    table.add_field(&temp, target_type)?;
    table.calculate_field_with(&temp, |row| convert(row.get(field)))?;
    table.delete_field(field);
    table.rename_field(&temp, field)
}

/// The import auto-detects all-digit zips as numbers; the master schema
/// wants text
pub fn ensure_zip_text(table: &mut Table) -> Result<(), TableError> {
    migrate_field_type(table, calls::ZIP, FieldType::Text, |v| match v {
        Value::Null => Value::Null,
        other => Value::Text(other.key_string()),
    })
}

/// The export renders the start date as text like `Jan  1 2015 01:04PM`;
/// migrate it to a real date field. Unparseable values become null.
pub fn ensure_start_date(table: &mut Table) -> Result<(), TableError> {
    migrate_field_type(table, calls::START_DATE, FieldType::Date, |v| match v {
        Value::Date(d) => Value::Date(*d),
        Value::Text(s) => parse_export_timestamp(s)
            .map(Value::Date)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

/// Parse the export's timestamp format, tolerating its double-spaced
/// single-digit days
pub fn parse_export_timestamp(s: &str) -> Option<NaiveDateTime> {
    let squeezed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&squeezed, "%b %e %Y %I:%M%p").ok()
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
