use std::io;
use std::path::Path;

use thiserror::Error;

/// Errores fatales del proceso de conciliación.
///
/// Todo lo que llega acá aborta la corrida completa; los errores por registro
/// (decode/validación) se manejan en el loop de procesamiento y nunca se
/// convierten en `ReconcileError`.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("cannot open spreadsheet {path}: {source}")]
    Workbook {
        path: String,
        #[source]
        source: calamine::Error,
    },

    #[error("unsupported spreadsheet format: {path} (expected .xlsx/.xlsm/.xls/.ods or .csv)")]
    UnsupportedSpreadsheet { path: String },

    #[error("sheet '{sheet}' has no rows")]
    SheetEmpty { sheet: String },

    #[error("column '{column}' not found in header of sheet '{sheet}'")]
    ColumnNotFound { column: String, sheet: String },

    #[error("csv error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("{path} no parece ni array JSON ni NDJSON")]
    Format { path: String },

    #[error("io error in {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("directory walk failed under {root}: {source}")]
    Walk {
        root: String,
        #[source]
        source: walkdir::Error,
    },
}

impl ReconcileError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        ReconcileError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn csv(path: &Path, source: csv::Error) -> Self {
        ReconcileError::Csv {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn workbook(path: &Path, source: calamine::Error) -> Self {
        ReconcileError::Workbook {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn format(path: &Path) -> Self {
        ReconcileError::Format {
            path: path.display().to_string(),
        }
    }
}
