//! Collection assembly: sniff every table, map every row, flatten.
//!
//! Reads are best effort in permissive mode. A table that cannot be described
//! or queried contributes nothing and leaves a [`TableDiagnostic`] behind, so
//! callers can audit completeness without the listing ever failing. Strict
//! mode returns the first such failure instead.

use crate::database::ItemStore;
use crate::error::{Result, ToramError};
use crate::mapper::{TitleIndex, map_crystal_row, map_row};
use crate::models::CompleteView;
use crate::shapes::{CRYSTAL_MAP, ColumnMap, Shape, column_map, order_column, sniff};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Pseudo table name used for failures that are not tied to one table.
pub const SCHEMA_TABLE: &str = "sqlite_master";

pub const DEFAULT_CRYSTAL_TABLE: &str = "xtal";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    EnumerationFailed { error: String },
    IntrospectionFailed { error: String },
    QueryFailed { error: String },
    Unsupported,
    /// The table was read, but some mapped columns do not exist.
    MissingColumns { columns: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDiagnostic {
    pub table: String,
    pub reason: SkipReason,
}

impl TableDiagnostic {
    /// Whether the table contributed no rows because of this diagnostic.
    pub fn is_skip(&self) -> bool {
        !matches!(self.reason, SkipReason::MissingColumns { .. })
    }

    /// Whether the diagnostic comes from a failed query rather than a data mismatch.
    pub fn is_failure(&self) -> bool {
        matches!(
            self.reason,
            SkipReason::EnumerationFailed { .. }
                | SkipReason::IntrospectionFailed { .. }
                | SkipReason::QueryFailed { .. }
        )
    }
}

impl fmt::Display for TableDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            SkipReason::EnumerationFailed { error } => write!(f, "{}: table enumeration failed: {}", self.table, error),
            SkipReason::IntrospectionFailed { error } => write!(f, "{}: column introspection failed: {}", self.table, error),
            SkipReason::QueryFailed { error } => write!(f, "{}: row query failed: {}", self.table, error),
            SkipReason::Unsupported => write!(f, "{}: no known column layout", self.table),
            SkipReason::MissingColumns { columns } => {
                write!(f, "{}: {} mapped columns absent ({})", self.table, columns.len(), columns.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Listing {
    pub views: Vec<CompleteView>,
    pub diagnostics: Vec<TableDiagnostic>,
}

impl Listing {
    pub fn skipped_tables(&self) -> impl Iterator<Item = &TableDiagnostic> {
        self.diagnostics.iter().filter(|d| d.is_skip())
    }
}

#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    /// Turn read failures into diagnostics instead of errors.
    pub permissive: bool,
    /// The dedicated crystal table, excluded from generic sniffing.
    pub crystal_table: String,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            permissive: true,
            crystal_table: DEFAULT_CRYSTAL_TABLE.to_string(),
        }
    }
}

/// A table accepted by the column sniffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub table: String,
    pub shape: Shape,
    pub columns: Vec<String>,
}

/// Per-table summary for schema inspection.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    pub shape: Shape,
    pub columns: Vec<String>,
    pub rows: Option<usize>,
    pub missing_columns: Vec<String>,
    pub error: Option<String>,
}

pub struct Assembler<'a, S: ItemStore + ?Sized> {
    store: &'a S,
    options: AssemblerOptions,
}

impl<'a, S: ItemStore + ?Sized> Assembler<'a, S> {
    pub fn new(store: &'a S, options: AssemblerOptions) -> Self {
        Self { store, options }
    }

    /// Record `reason` against `table`, or return `error` in strict mode.
    fn tolerate(
        &self,
        diagnostics: &mut Vec<TableDiagnostic>,
        table: &str,
        reason: SkipReason,
        error: ToramError,
    ) -> Result<()> {
        if !self.options.permissive {
            return Err(error);
        }
        warn!("Skipping table {}: {}", table, error);
        diagnostics.push(TableDiagnostic {
            table: table.to_string(),
            reason,
        });
        Ok(())
    }

    fn note_missing(&self, diagnostics: &mut Vec<TableDiagnostic>, table: &str, map: &ColumnMap, columns: &[String]) {
        let missing = map.missing_columns(columns);
        if missing.is_empty() {
            return;
        }
        debug!("Table {} lacks {} mapped columns: {:?}", table, missing.len(), missing);
        diagnostics.push(TableDiagnostic {
            table: table.to_string(),
            reason: SkipReason::MissingColumns {
                columns: missing.into_iter().map(String::from).collect(),
            },
        });
    }

    /// Sniffed candidate tables in enumeration order, excluding the crystal table.
    /// Unsupported tables only show up in the returned diagnostics.
    pub fn candidate_tables(&self) -> Result<(Vec<Candidate>, Vec<TableDiagnostic>)> {
        let mut diagnostics = Vec::new();
        let mut candidates = Vec::new();

        let names = match self.store.table_names() {
            Ok(names) => names,
            Err(e) => {
                let reason = SkipReason::EnumerationFailed { error: e.to_string() };
                self.tolerate(&mut diagnostics, SCHEMA_TABLE, reason, e)?;
                return Ok((candidates, diagnostics));
            }
        };

        for table in names {
            if table == self.options.crystal_table {
                continue;
            }

            let columns = match self.store.table_columns(&table) {
                Ok(columns) => columns,
                Err(e) => {
                    let reason = SkipReason::IntrospectionFailed { error: e.to_string() };
                    self.tolerate(&mut diagnostics, &table, reason, e)?;
                    continue;
                }
            };

            let shape = sniff(&columns);
            if shape == Shape::Unsupported {
                warn!("Skipping table {}: matches no known shape", table);
                diagnostics.push(TableDiagnostic {
                    table,
                    reason: SkipReason::Unsupported,
                });
                continue;
            }

            candidates.push(Candidate { table, shape, columns });
        }

        Ok((candidates, diagnostics))
    }

    /// Every candidate table mapped by its shape, tables in alphabetical order
    /// and rows in each table's ordering column.
    pub fn load_equipment(&self) -> Result<Listing> {
        let (candidates, mut diagnostics) = self.candidate_tables()?;
        let mut views = Vec::new();

        for candidate in candidates {
            let Some(map) = column_map(candidate.shape) else {
                continue;
            };
            self.note_missing(&mut diagnostics, &candidate.table, map, &candidate.columns);

            let order_by = order_column(&candidate.columns);
            let rows = match self.store.fetch_rows(&candidate.table, order_by) {
                Ok(rows) => rows,
                Err(e) => {
                    let reason = SkipReason::QueryFailed { error: e.to_string() };
                    self.tolerate(&mut diagnostics, &candidate.table, reason, e)?;
                    continue;
                }
            };

            debug!(
                "Mapped {} rows from {} ({}, ordered by {})",
                rows.len(),
                candidate.table,
                candidate.shape,
                order_by
            );
            views.extend(rows.iter().map(|row| map_row(row, map, &candidate.table)));
        }

        info!("Loaded {} equipment entries ({} table diagnostics)", views.len(), diagnostics.len());
        Ok(Listing { views, diagnostics })
    }

    /// The dedicated crystal table, with "Used For" resolution.
    pub fn load_crystals(&self) -> Result<Listing> {
        let table = self.options.crystal_table.as_str();
        let mut diagnostics = Vec::new();

        let columns = match self.store.table_columns(table) {
            Ok(columns) => columns,
            Err(e) => {
                let reason = SkipReason::IntrospectionFailed { error: e.to_string() };
                self.tolerate(&mut diagnostics, table, reason, e)?;
                return Ok(Listing { views: Vec::new(), diagnostics });
            }
        };

        if sniff(&columns) != Shape::CrystalLike {
            if !self.options.permissive {
                return Err(ToramError::UnsupportedTable(table.to_string()));
            }
            warn!("Crystal table {} is missing or has an unexpected layout", table);
            diagnostics.push(TableDiagnostic {
                table: table.to_string(),
                reason: SkipReason::Unsupported,
            });
            return Ok(Listing { views: Vec::new(), diagnostics });
        }
        self.note_missing(&mut diagnostics, table, &CRYSTAL_MAP, &columns);

        let rows = match self.store.fetch_rows(table, "title") {
            Ok(rows) => rows,
            Err(e) => {
                let reason = SkipReason::QueryFailed { error: e.to_string() };
                self.tolerate(&mut diagnostics, table, reason, e)?;
                return Ok(Listing { views: Vec::new(), diagnostics });
            }
        };

        let index = TitleIndex::build(&rows);
        let views: Vec<_> = rows.iter().map(|row| map_crystal_row(row, table, &index)).collect();

        info!("Loaded {} crystals from {}", views.len(), table);
        Ok(Listing { views, diagnostics })
    }

    /// Describe every table: columns, shape, row count and unmapped columns.
    /// Per-table failures are reported in the table's entry. If the tables
    /// cannot be enumerated, permissive mode reports a single schema entry.
    pub fn inspect(&self) -> Result<Vec<TableReport>> {
        let mut reports = Vec::new();

        let names = match self.store.table_names() {
            Ok(names) => names,
            Err(e) if self.options.permissive => {
                warn!("Cannot enumerate tables: {}", e);
                reports.push(TableReport {
                    table: SCHEMA_TABLE.to_string(),
                    shape: Shape::Unsupported,
                    columns: Vec::new(),
                    rows: None,
                    missing_columns: Vec::new(),
                    error: Some(e.to_string()),
                });
                return Ok(reports);
            }
            Err(e) => return Err(e),
        };

        for table in names {
            let mut report = TableReport {
                table: table.clone(),
                shape: Shape::Unsupported,
                columns: Vec::new(),
                rows: None,
                missing_columns: Vec::new(),
                error: None,
            };

            match self.store.table_columns(&table) {
                Ok(columns) => {
                    report.shape = sniff(&columns);
                    let map = if table == self.options.crystal_table && report.shape == Shape::CrystalLike {
                        Some(&CRYSTAL_MAP)
                    } else {
                        column_map(report.shape)
                    };
                    if let Some(map) = map {
                        report.missing_columns = map.missing_columns(&columns).into_iter().map(String::from).collect();
                    }
                    report.columns = columns;
                }
                Err(e) => report.error = Some(e.to_string()),
            }

            if report.error.is_none() {
                match self.store.row_count(&table) {
                    Ok(count) => report.rows = Some(count),
                    Err(e) => report.error = Some(e.to_string()),
                }
            }

            reports.push(report);
        }

        Ok(reports)
    }
}
