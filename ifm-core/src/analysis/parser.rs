use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use ifm_types::{DefectCategory, DefectPrevalence};

use crate::analysis::heatmap::HeatmapFigure;
use crate::runtime::types::WorkflowError;

/// Preamble lines written by the recognition model before the header row.
pub const DEFAULT_SKIP_ROWS: usize = 2;

pub const X_COLUMN: &str = "x";
pub const Y_COLUMN: &str = "y";

/// One classified point of the recognition output.
#[derive(Debug, Clone, PartialEq)]
pub struct DefectRow {
    pub x: f64,
    pub y: f64,
    /// Category scores in declaration order.
    pub scores: [f64; 4],
    pub category: DefectCategory,
}

/// A parsed recognition output table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefectTable {
    pub rows: Vec<DefectRow>,
}

impl DefectTable {
    /// Row count per category, in declaration order.
    pub fn counts(&self) -> [usize; 4] {
        let mut counts = [0usize; 4];
        for row in &self.rows {
            counts[row.category.index()] += 1;
        }
        counts
    }

    pub fn prevalence(&self) -> DefectPrevalence {
        DefectPrevalence::from_counts(self.counts())
    }

    pub fn labels(&self) -> Vec<u8> {
        self.rows.iter().map(|r| r.category.label()).collect()
    }

    pub fn heatmap(&self) -> HeatmapFigure {
        HeatmapFigure::new(
            self.rows.iter().map(|r| r.x).collect(),
            self.rows.iter().map(|r| r.y).collect(),
            self.labels(),
        )
    }
}

/// Read and classify the recognition output table at `path`.
pub fn parse_defect_table(path: &Path) -> Result<DefectTable, WorkflowError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => WorkflowError::MissingFile {
            path: path.display().to_string(),
        },
        _ => WorkflowError::io(format!("{}: {e}", path.display())),
    })?;
    read_defect_table(
        BufReader::new(file),
        DEFAULT_SKIP_ROWS,
        &path.display().to_string(),
    )
}

/// Classify a table from any buffered reader, skipping `skip_rows`
/// physical lines before the header.  `source` names the table in errors.
pub fn read_defect_table<R: BufRead>(
    mut reader: R,
    skip_rows: usize,
    source: &str,
) -> Result<DefectTable, WorkflowError> {
    let malformed = |reason: String| WorkflowError::MalformedTable {
        path: source.to_owned(),
        reason,
    };

    let mut line = String::new();
    for _ in 0..skip_rows {
        line.clear();
        if reader.read_line(&mut line).map_err(WorkflowError::io)? == 0 {
            break;
        }
    }

    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv.headers().map_err(|e| malformed(e.to_string()))?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);

    let mut missing = Vec::new();
    let mut category_columns = [0usize; 4];
    for category in DefectCategory::ALL {
        match position(category.column_name()) {
            Some(idx) => category_columns[category.index()] = idx,
            None => missing.push(category.column_name()),
        }
    }
    let x_column = position(X_COLUMN);
    let y_column = position(Y_COLUMN);
    if x_column.is_none() {
        missing.push(X_COLUMN);
    }
    if y_column.is_none() {
        missing.push(Y_COLUMN);
    }
    let (Some(x_column), Some(y_column)) = (x_column, y_column) else {
        return Err(malformed(format!("missing columns: {}", missing.join(", "))));
    };
    if !missing.is_empty() {
        return Err(malformed(format!("missing columns: {}", missing.join(", "))));
    }

    let mut rows = Vec::new();
    for (idx, record) in csv.records().enumerate() {
        let row_number = idx + 1;
        let record = record.map_err(|e| malformed(format!("row {row_number}: {e}")))?;
        let cell = |column: usize, name: &str| -> Result<f64, WorkflowError> {
            let raw = record.get(column).unwrap_or("");
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    malformed(format!(
                        "row {row_number}, column '{name}': invalid number '{raw}'"
                    ))
                })
        };

        let mut scores = [0f64; 4];
        for category in DefectCategory::ALL {
            scores[category.index()] =
                cell(category_columns[category.index()], category.column_name())?;
        }
        rows.push(DefectRow {
            x: cell(x_column, X_COLUMN)?,
            y: cell(y_column, Y_COLUMN)?,
            scores,
            category: DefectCategory::argmax(&scores),
        });
    }

    Ok(DefectTable { rows })
}
