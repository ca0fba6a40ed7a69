//! Classification of recognition output tables.

pub mod heatmap;
pub mod parser;

pub use heatmap::HeatmapFigure;
pub use parser::{parse_defect_table, read_defect_table, DefectRow, DefectTable, DEFAULT_SKIP_ROWS};
