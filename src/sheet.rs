use std::fs::File;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::errors::ReconcileError;

/// Cursor de filas sobre una hoja de cálculo: cada fila llega como columnas
/// string ordenadas, de a una por vez.
///
/// Backends: workbook XLSX/XLS/ODS via calamine, o export plano `.csv` (ahí
/// el nombre de hoja se ignora — un CSV es una sola hoja implícita).
pub struct SheetRows {
    path: String,
    inner: Inner,
}

enum Inner {
    Workbook { range: Range<Data>, next: usize },
    Csv { records: csv::StringRecordsIntoIter<File> },
}

/// Abre la hoja `sheet_name` de `path` según la extensión del archivo.
pub fn open_sheet(path: &str, sheet_name: &str) -> Result<SheetRows, ReconcileError> {
    let p = Path::new(path);
    let ext = p
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let inner = match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => {
            let mut workbook = open_workbook_auto(p).map_err(|e| ReconcileError::workbook(p, e))?;
            let range = workbook
                .worksheet_range(sheet_name)
                .map_err(|e| ReconcileError::workbook(p, e))?;
            Inner::Workbook { range, next: 0 }
        }
        "csv" => {
            let reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(p)
                .map_err(|e| ReconcileError::csv(p, e))?;
            Inner::Csv {
                records: reader.into_records(),
            }
        }
        _ => {
            return Err(ReconcileError::UnsupportedSpreadsheet {
                path: path.to_string(),
            })
        }
    };

    Ok(SheetRows {
        path: path.to_string(),
        inner,
    })
}

impl SheetRows {
    /// Siguiente fila, o `None` al agotar la hoja. Cursor solo-avance:
    /// los errores del lector se propagan tal cual, envueltos con la ruta.
    pub fn next_row(&mut self) -> Result<Option<Vec<String>>, ReconcileError> {
        match &mut self.inner {
            Inner::Workbook { range, next } => {
                if *next >= range.height() {
                    return Ok(None);
                }
                let row_idx = *next;
                *next += 1;

                let mut row = Vec::with_capacity(range.width());
                for col in 0..range.width() {
                    row.push(cell_to_string(range.get((row_idx, col))));
                }
                Ok(Some(row))
            }
            Inner::Csv { records } => match records.next() {
                None => Ok(None),
                Some(Ok(record)) => Ok(Some(record.iter().map(|f| f.to_string()).collect())),
                Some(Err(e)) => Err(ReconcileError::Csv {
                    path: self.path.clone(),
                    source: e,
                }),
            },
        }
    }
}

fn cell_to_string(cell: Option<&Data>) -> String {
    match cell {
        None | Some(Data::Empty) => String::new(),
        Some(v) => v.to_string().trim().to_string(),
    }
}
