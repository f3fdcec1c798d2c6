use std::collections::HashSet;

use crate::errors::ReconcileError;
use crate::progress::ProgressTracker;
use crate::sheet;

/// Checkpoint de progreso cada N filas del Excel
const ROW_CHECKPOINT: u64 = 10_000;

/// Extrae el set de valores distintos no vacíos de la columna `column_header`.
///
/// La primera fila de la hoja es la cabecera; de ahí sale el índice de la
/// columna. El resto de las filas se recorre en streaming: nunca hay más de
/// una fila viva, la memoria la acota el tamaño del set de claves.
pub fn extract_key_set(
    path: &str,
    sheet_name: &str,
    column_header: &str,
) -> Result<HashSet<String>, ReconcileError> {
    let mut rows = sheet::open_sheet(path, sheet_name)?;

    let header = match rows.next_row()? {
        Some(h) => h,
        None => {
            return Err(ReconcileError::SheetEmpty {
                sheet: sheet_name.to_string(),
            })
        }
    };

    let col_idx = header
        .iter()
        .position(|h| h.trim() == column_header)
        .ok_or_else(|| ReconcileError::ColumnNotFound {
            column: column_header.to_string(),
            sheet: sheet_name.to_string(),
        })?;

    let mut keys = HashSet::new();
    let mut progress = ProgressTracker::new("Filas leídas", ROW_CHECKPOINT);
    let mut scanned = 0u64;

    while let Some(row) = rows.next_row()? {
        scanned += 1;
        // Filas cortas no llegan hasta la columna objetivo; el set deduplica solo
        if let Some(cell) = row.get(col_idx) {
            if !cell.is_empty() {
                keys.insert(cell.clone());
            }
        }
        progress.update(scanned);
    }
    progress.finish();

    Ok(keys)
}

/// Cuenta filas de datos (sin cabecera) en modo streaming.
/// Hoja completamente vacía cuenta 0 sin error.
pub fn count_data_rows(path: &str, sheet_name: &str) -> Result<u64, ReconcileError> {
    let mut rows = sheet::open_sheet(path, sheet_name)?;

    // descartar primera fila
    if rows.next_row()?.is_none() {
        return Ok(0);
    }

    let mut count = 0u64;
    while rows.next_row()?.is_some() {
        count += 1;
    }
    Ok(count)
}
