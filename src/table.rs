//! In-memory tabular data model
//!
//! A `Table` is an ordered schema plus rows of values. Stages operate on
//! tables as values; the workspace (`store`) handles persistence. Appending
//! requires an identical schema - mismatches are reported, never coerced.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Column types supported by the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Integer,
    Double,
    Date,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::Text => "Text",
            FieldType::Integer => "Integer",
            FieldType::Double => "Double",
            FieldType::Date => "Date",
        };
        write!(f, "{}", name)
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
        }
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Double(f64),
    Date(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The field type this value inhabits, if any (`Null` is typeless)
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Value::Null => None,
            Value::Text(_) => Some(FieldType::Text),
            Value::Integer(_) => Some(FieldType::Integer),
            Value::Double(_) => Some(FieldType::Double),
            Value::Date(_) => Some(FieldType::Date),
        }
    }

    /// Canonical string form, used for join keys, de-duplication keys,
    /// and operator-facing reports
    pub fn key_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key_string())
    }
}

/// Error type for table operations
#[derive(Debug)]
pub enum TableError {
    UnknownField(String),
    DuplicateField(String),
    RowArity { expected: usize, found: usize },
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::UnknownField(name) => write!(f, "Unknown field: {}", name),
            TableError::DuplicateField(name) => write!(f, "Field already exists: {}", name),
            TableError::RowArity { expected, found } => {
                write!(f, "Row has {} values, schema has {} fields", found, expected)
            }
        }
    }
}

impl std::error::Error for TableError {}

/// Append rejection: the batch schema does not match the master schema
#[derive(Debug, Clone)]
pub struct SchemaMismatch {
    pub expected: Vec<Field>,
    pub found: Vec<Field>,
}

impl std::fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Schema mismatch: expected {} field(s), found {} field(s)",
            self.expected.len(),
            self.found.len()
        )
    }
}

impl std::error::Error for SchemaMismatch {}

/// Schema-only comparison between two tables
#[derive(Debug, Default, Clone)]
pub struct SchemaDiff {
    /// Fields present only in the base (master) table
    pub only_in_base: Vec<Field>,
    /// Fields present only in the candidate (batch) table
    pub only_in_candidate: Vec<Field>,
    /// Fields present in both with differing types: (name, base type, candidate type)
    pub type_changes: Vec<(String, FieldType, FieldType)>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.only_in_base.is_empty()
            && self.only_in_candidate.is_empty()
            && self.type_changes.is_empty()
    }

    /// Render the diff as an operator-readable report
    pub fn render(&self, base_name: &str, candidate_name: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Schema comparison: {} (base) vs {} (candidate)\n",
            base_name, candidate_name
        ));
        if self.is_empty() {
            out.push_str("Schemas are identical.\n");
            return out;
        }
        for field in &self.only_in_base {
            out.push_str(&format!(
                "Only in {}: {} ({})\n",
                base_name, field.name, field.field_type
            ));
        }
        for field in &self.only_in_candidate {
            out.push_str(&format!(
                "Only in {}: {} ({})\n",
                candidate_name, field.name, field.field_type
            ));
        }
        for (name, base, candidate) in &self.type_changes {
            out.push_str(&format!(
                "Type change: {} is {} in {}, {} in {}\n",
                name, base, base_name, candidate, candidate_name
            ));
        }
        out
    }
}

/// Read-only view of one row, with access to field values by name
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    schema: &'a [Field],
    values: &'a [Value],
}

impl<'a> RowRef<'a> {
    /// Value of the named field; `Null` if the field does not exist
    pub fn get(&self, field: &str) -> &'a Value {
        self.schema
            .iter()
            .position(|f| f.name == field)
            .map(|i| &self.values[i])
            .unwrap_or(&Value::Null)
    }
}

/// An ordered schema plus rows of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    schema: Vec<Field>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(schema: Vec<Field>) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn schema(&self) -> &[Field] {
        &self.schema
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(|values| RowRef {
            schema: &self.schema,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.schema.iter().position(|f| f.name == name)
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field_index(name).map(|i| self.schema[i].field_type)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.schema.len() {
            return Err(TableError::RowArity {
                expected: self.schema.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// All values of one column, in row order
    pub fn column(&self, field: &str) -> Result<Vec<&Value>, TableError> {
        let idx = self
            .field_index(field)
            .ok_or_else(|| TableError::UnknownField(field.to_string()))?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Rows satisfying the predicate, as a new table with the same schema
    pub fn select<F>(&self, pred: F) -> Table
    where
        F: Fn(RowRef<'_>) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|values| {
                pred(RowRef {
                    schema: &self.schema,
                    values: values.as_slice(),
                })
            })
            .cloned()
            .collect();
        Table {
            schema: self.schema.clone(),
            rows,
        }
    }

    /// Rewrite one field in place from its current value
    pub fn calculate_field<F>(&mut self, field: &str, f: F) -> Result<(), TableError>
    where
        F: Fn(&Value) -> Value,
    {
        let idx = self
            .field_index(field)
            .ok_or_else(|| TableError::UnknownField(field.to_string()))?;
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        Ok(())
    }

    /// Rewrite one field computed from the whole row
    pub fn calculate_field_with<F>(&mut self, field: &str, f: F) -> Result<(), TableError>
    where
        F: Fn(RowRef<'_>) -> Value,
    {
        let idx = self
            .field_index(field)
            .ok_or_else(|| TableError::UnknownField(field.to_string()))?;
        let computed: Vec<Value> = self
            .rows
            .iter()
            .map(|values| {
                f(RowRef {
                    schema: &self.schema,
                    values,
                })
            })
            .collect();
        for (row, value) in self.rows.iter_mut().zip(computed) {
            row[idx] = value;
        }
        Ok(())
    }

    /// Add a new field, filled with `Null`
    pub fn add_field(&mut self, name: &str, field_type: FieldType) -> Result<(), TableError> {
        if self.field_index(name).is_some() {
            return Err(TableError::DuplicateField(name.to_string()));
        }
        self.schema.push(Field::new(name, field_type));
        for row in &mut self.rows {
            row.push(Value::Null);
        }
        Ok(())
    }

    /// Remove a field and its values. Removing an absent field is a no-op,
    /// matching workspace delete-field semantics.
    pub fn delete_field(&mut self, name: &str) {
        if let Some(idx) = self.field_index(name) {
            self.schema.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
        }
    }

    pub fn rename_field(&mut self, from: &str, to: &str) -> Result<(), TableError> {
        if from != to && self.field_index(to).is_some() {
            return Err(TableError::DuplicateField(to.to_string()));
        }
        let idx = self
            .field_index(from)
            .ok_or_else(|| TableError::UnknownField(from.to_string()))?;
        self.schema[idx].name = to.to_string();
        Ok(())
    }

    /// Strict append: the other table's schema must be identical (names and
    /// types, in order). On mismatch nothing is copied.
    pub fn append(&mut self, other: &Table) -> Result<(), SchemaMismatch> {
        if self.schema != other.schema {
            return Err(SchemaMismatch {
                expected: self.schema.clone(),
                found: other.schema.clone(),
            });
        }
        self.rows.extend(other.rows.iter().cloned());
        Ok(())
    }

    /// Schema-only diff against a candidate table, keyed by field name
    pub fn schema_diff(&self, candidate: &Table) -> SchemaDiff {
        let mut diff = SchemaDiff::default();
        for field in &self.schema {
            match candidate.field_type(&field.name) {
                None => diff.only_in_base.push(field.clone()),
                Some(t) if t != field.field_type => {
                    diff.type_changes
                        .push((field.name.clone(), field.field_type, t));
                }
                Some(_) => {}
            }
        }
        for field in &candidate.schema {
            if self.field_index(&field.name).is_none() {
                diff.only_in_candidate.push(field.clone());
            }
        }
        diff
    }

    /// First occurrence of each key value wins; later duplicates are dropped
    pub fn dedup_by(&self, key_field: &str) -> Result<Table, TableError> {
        let idx = self
            .field_index(key_field)
            .ok_or_else(|| TableError::UnknownField(key_field.to_string()))?;
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let rows = self
            .rows
            .iter()
            .filter(|row| seen.insert(row[idx].key_string()))
            .cloned()
            .collect();
        Ok(Table {
            schema: self.schema.clone(),
            rows,
        })
    }

    /// Group by one field and count rows per distinct value. The result has
    /// the group field plus a `FREQUENCY` integer field, in first-seen order.
    pub fn frequency(&self, group_field: &str) -> Result<Table, TableError> {
        let idx = self
            .field_index(group_field)
            .ok_or_else(|| TableError::UnknownField(group_field.to_string()))?;
        let mut order: Vec<Value> = Vec::new();
        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in &self.rows {
            let key = row[idx].key_string();
            if !counts.contains_key(&key) {
                order.push(row[idx].clone());
            }
            *counts.entry(key).or_insert(0) += 1;
        }
        let mut out = Table::new(vec![
            self.schema[idx].clone(),
            Field::new("FREQUENCY", FieldType::Integer),
        ]);
        for value in order {
            let count = counts[&value.key_string()];
            out.push_row(vec![value, Value::Integer(count)])?;
        }
        Ok(out)
    }

    /// Left join one field from `source` onto this table. Rows with no match
    /// in `source` get `Null` (callers decide how nulls are filled).
    pub fn join_field(
        &mut self,
        target_key: &str,
        source: &Table,
        source_key: &str,
        field: &str,
    ) -> Result<(), TableError> {
        let target_idx = self
            .field_index(target_key)
            .ok_or_else(|| TableError::UnknownField(target_key.to_string()))?;
        let source_key_idx = source
            .field_index(source_key)
            .ok_or_else(|| TableError::UnknownField(source_key.to_string()))?;
        let source_field_idx = source
            .field_index(field)
            .ok_or_else(|| TableError::UnknownField(field.to_string()))?;

        // First match wins, as in a keyed lookup join
        let mut lookup: HashMap<String, &Value> = HashMap::new();
        for row in &source.rows {
            lookup
                .entry(row[source_key_idx].key_string())
                .or_insert(&row[source_field_idx]);
        }

        let joined: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                lookup
                    .get(&row[target_idx].key_string())
                    .map(|v| (*v).clone())
                    .unwrap_or(Value::Null)
            })
            .collect();

        self.schema.push(Field::new(
            field,
            source.schema[source_field_idx].field_type,
        ));
        for (row, value) in self.rows.iter_mut().zip(joined) {
            row.push(value);
        }
        Ok(())
    }
}
