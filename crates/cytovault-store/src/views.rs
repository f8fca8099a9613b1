// cytovault-store/src/views.rs
// ============================================================================
// Module: Derived Views
// Description: Joined tables, the measurement pivot, and CSV export.
// Purpose: Reshape catalog rows into tables downstream tools consume.
// Dependencies: cytovault-catalog, cytovault-core, csv
// ============================================================================

//! ## Overview
//! Long-format measurement rows pivot into one column per (channel, metric,
//! scope) and one row per cell, optionally joined with cell identity and
//! position columns. Column and row order are deterministic so repeated
//! exports of unchanged data are byte-identical.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::Path;

use cytovault_catalog::queries::CellWithIdentity;
use cytovault_catalog::queries::MeasurementWithContext;
use cytovault_core::Cell;
use cytovault_core::Measurement;
use cytovault_core::MeasurementScope;

use crate::error::StoreError;

// ============================================================================
// SECTION: Table Rows
// ============================================================================

/// One cell joined with the names of its full lineage.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRow {
    /// The cell record.
    pub cell: Cell,
    /// Field-of-view name.
    pub fov: String,
    /// Biological replicate name.
    pub bio_rep: String,
    /// Condition name.
    pub condition: String,
    /// Timepoint name, when the field has one.
    pub timepoint: Option<String>,
}

impl From<CellWithIdentity> for CellRow {
    fn from(row: CellWithIdentity) -> Self {
        Self {
            cell: row.cell,
            fov: row.fov_name,
            bio_rep: row.bio_rep_name,
            condition: row.condition_name,
            timepoint: row.timepoint_name,
        }
    }
}

/// One long-format measurement joined with channel and cell identity.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    /// The measurement record.
    pub measurement: Measurement,
    /// Channel name.
    pub channel: String,
    /// Label value of the measured cell within its run.
    pub cell_label: i64,
    /// Field-of-view name.
    pub fov: String,
}

impl From<MeasurementWithContext> for MeasurementRow {
    fn from(row: MeasurementWithContext) -> Self {
        Self {
            measurement: row.measurement,
            channel: row.channel_name,
            cell_label: row.cell_label_value,
            fov: row.fov_name,
        }
    }
}

// ============================================================================
// SECTION: Pivot Table
// ============================================================================

/// Wide-format measurement table: one row per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    /// Identity column names; empty when identity is not joined.
    pub identity_columns: Vec<String>,
    /// Value column names, one per (channel, metric, scope).
    pub value_columns: Vec<String>,
    /// Rows in cell-id order.
    pub rows: Vec<PivotRow>,
}

/// One pivot row.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    /// Cell surrogate id.
    pub cell_id: i64,
    /// Identity values aligned with the identity columns.
    pub identity: Vec<String>,
    /// Measurement values aligned with the value columns; `None` where the
    /// cell has no value for a column.
    pub values: Vec<Option<f64>>,
}

/// Builds the pivot from joined cell and measurement rows.
#[must_use]
pub fn build_pivot(
    cells: &[CellRow],
    measurements: &[MeasurementRow],
    include_identity: bool,
) -> PivotTable {
    let column_keys: BTreeSet<(String, String, MeasurementScope)> = measurements
        .iter()
        .map(|row| {
            (
                row.channel.clone(),
                row.measurement.metric.clone(),
                row.measurement.scope,
            )
        })
        .collect();
    let column_index: HashMap<&(String, String, MeasurementScope), usize> =
        column_keys.iter().enumerate().map(|(index, key)| (key, index)).collect();

    let mut values_by_cell: HashMap<i64, Vec<Option<f64>>> = HashMap::new();
    for row in measurements {
        let key = (
            row.channel.clone(),
            row.measurement.metric.clone(),
            row.measurement.scope,
        );
        if let Some(&index) = column_index.get(&key) {
            let values = values_by_cell
                .entry(row.measurement.cell_id)
                .or_insert_with(|| vec![None; column_keys.len()]);
            values[index] = Some(row.measurement.value);
        }
    }

    let identity_columns = if include_identity {
        vec![
            "label_value".to_owned(),
            "fov".to_owned(),
            "bio_rep".to_owned(),
            "condition".to_owned(),
            "timepoint".to_owned(),
            "centroid_x".to_owned(),
            "centroid_y".to_owned(),
        ]
    } else {
        Vec::new()
    };

    let rows = cells
        .iter()
        .map(|row| {
            let identity = if include_identity {
                vec![
                    row.cell.label_value.to_string(),
                    row.fov.clone(),
                    row.bio_rep.clone(),
                    row.condition.clone(),
                    row.timepoint.clone().unwrap_or_default(),
                    row.cell.centroid_x.to_string(),
                    row.cell.centroid_y.to_string(),
                ]
            } else {
                Vec::new()
            };
            let values = values_by_cell
                .remove(&row.cell.id)
                .unwrap_or_else(|| vec![None; column_keys.len()]);
            PivotRow {
                cell_id: row.cell.id,
                identity,
                values,
            }
        })
        .collect();

    PivotTable {
        identity_columns,
        value_columns: column_keys.iter().map(|key| column_label(key)).collect(),
        rows,
    }
}

/// Builds the exported column name for a (channel, metric, scope) key.
fn column_label((channel, metric, scope): &(String, String, MeasurementScope)) -> String {
    match scope {
        MeasurementScope::WholeCell => format!("{channel}_{metric}"),
        scoped => format!("{channel}_{metric}_{}", scoped.label()),
    }
}

// ============================================================================
// SECTION: CSV Export
// ============================================================================

/// Writes a pivot table as CSV.
///
/// # Errors
///
/// Returns [`StoreError::Csv`] when serialization fails and I/O errors when
/// the file cannot be written.
pub fn write_csv(table: &PivotTable, path: &Path) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["cell_id".to_owned()];
    header.extend(table.identity_columns.iter().cloned());
    header.extend(table.value_columns.iter().cloned());
    writer.write_record(&header)?;
    for row in &table.rows {
        let mut record = vec![row.cell_id.to_string()];
        record.extend(row.identity.iter().cloned());
        record.extend(
            row.values
                .iter()
                .map(|value| value.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
