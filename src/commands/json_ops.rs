use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use walkdir::WalkDir;

use crate::errors::ReconcileError;
use crate::file_utils::is_json_file;
use crate::models::CfdiRecord;

/// Registros decodificados por archivo que se contrastan contra el set de
/// claves del Excel (chequeo advisory, nunca afecta el conteo)
const KEY_SAMPLE_PER_FILE: usize = 5;

/// Framing detectado por el primer byte significativo del archivo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    /// Un único array JSON de objetos
    Array,
    /// Objetos top-level, uno por línea (NDJSON)
    Lines,
}

/// Falla recuperable de un elemento: se loguea y el stream sigue
#[derive(Debug)]
pub struct DecodeFailure {
    pub ordinal: usize,
    pub message: String,
}

/// Resultado de un elemento del stream
#[derive(Debug)]
pub enum StreamItem {
    Record { ordinal: usize, record: CfdiRecord },
    Skip(DecodeFailure),
}

/// Detecta el framing mirando el primer byte no-blanco sin comprometerse a
/// decodificar: `[` ⇒ array (se consume el bracket), `{` ⇒ NDJSON (el byte
/// queda en el reader), otra cosa ⇒ `None` (el caller falla con FormatError).
pub fn sniff_mode<R: BufRead>(reader: &mut R) -> io::Result<Option<FramingMode>> {
    match peek_nonspace(reader)? {
        Some(b'[') => {
            reader.consume(1);
            Ok(Some(FramingMode::Array))
        }
        Some(b'{') => Ok(Some(FramingMode::Lines)),
        _ => Ok(None),
    }
}

/// Secuencia lazy de registros decodificados: solo-avance, no reiniciable.
/// En modo array termina al consumir el `]` de cierre; en modo líneas, al
/// agotarse el stream (fin normal, no error).
pub struct RecordStream<R: BufRead> {
    reader: R,
    mode: FramingMode,
    ordinal: usize,
    done: bool,
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(reader: R, mode: FramingMode) -> Self {
        RecordStream {
            reader,
            mode,
            ordinal: 0,
            done: false,
        }
    }

    /// Próximo elemento, o `None` al terminar. Un `Err` acá es fatal para el
    /// archivo (IO o truncamiento); las fallas por elemento llegan como
    /// `StreamItem::Skip` y no cortan nada.
    pub fn next_record(&mut self) -> Option<io::Result<StreamItem>> {
        if self.done {
            return None;
        }
        match self.mode {
            FramingMode::Array => self.next_array_element(),
            FramingMode::Lines => self.next_line_element(),
        }
    }

    fn next_array_element(&mut self) -> Option<io::Result<StreamItem>> {
        if let Err(e) = skip_separators(&mut self.reader) {
            return Some(Err(e));
        }
        match peek_byte(&mut self.reader) {
            Err(e) => Some(Err(e)),
            Ok(None) => Some(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "array JSON sin cerrar",
            ))),
            Ok(Some(b']')) => {
                self.reader.consume(1);
                self.done = true;
                None
            }
            Ok(Some(_)) => {
                self.ordinal += 1;
                let raw = match read_element(&mut self.reader) {
                    Ok(raw) => raw,
                    Err(e) => return Some(Err(e)),
                };
                Some(Ok(parse_element(&raw, self.ordinal)))
            }
        }
    }

    fn next_line_element(&mut self) -> Option<io::Result<StreamItem>> {
        loop {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Err(e) => return Some(Err(e)),
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    self.ordinal += 1;
                    return Some(Ok(parse_element(trimmed, self.ordinal)));
                }
            }
        }
    }
}

fn parse_element(raw: &str, ordinal: usize) -> StreamItem {
    match serde_json::from_str::<CfdiRecord>(raw) {
        Ok(record) => StreamItem::Record { ordinal, record },
        Err(e) => StreamItem::Skip(DecodeFailure {
            ordinal,
            message: e.to_string(),
        }),
    }
}

fn peek_byte<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    let buf = reader.fill_buf()?;
    Ok(buf.first().copied())
}

/// Avanza hasta el primer byte no-blanco y lo devuelve sin consumirlo.
fn peek_nonspace<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(pos) => {
                reader.consume(pos);
                let buf = reader.fill_buf()?;
                return Ok(buf.first().copied());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Consume blancos y comas entre elementos del array.
fn skip_separators<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        match peek_byte(reader)? {
            Some(b) if b.is_ascii_whitespace() || b == b',' => reader.consume(1),
            _ => return Ok(()),
        }
    }
}

/// Lee el texto crudo del próximo valor JSON balanceado.
///
/// Contador de profundidad sobre `{}`/`[]`, con tracking de strings y
/// escapes; los scalars terminan en el delimitador (que no se consume).
/// Garantiza avance: un byte suelto de cierre se devuelve como elemento de
/// un byte para que el decode lo rechace y el stream siga.
fn read_element<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut out: Vec<u8> = Vec::new();
    let mut depth: u32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    loop {
        let byte = match peek_byte(reader)? {
            Some(b) => b,
            None => {
                if depth > 0 || in_string {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "elemento JSON truncado",
                    ));
                }
                break;
            }
        };

        if in_string {
            reader.consume(1);
            out.push(byte);
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
                if depth == 0 {
                    break;
                }
            }
            continue;
        }

        match byte {
            b'{' | b'[' => {
                reader.consume(1);
                out.push(byte);
                depth += 1;
            }
            b'}' | b']' => {
                if depth == 0 {
                    if out.is_empty() {
                        reader.consume(1);
                        out.push(byte);
                    }
                    break;
                }
                reader.consume(1);
                out.push(byte);
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            b'"' => {
                reader.consume(1);
                out.push(byte);
                in_string = true;
            }
            b',' if depth == 0 => break,
            b if b.is_ascii_whitespace() && depth == 0 => break,
            _ => {
                reader.consume(1);
                out.push(byte);
            }
        }
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Pipeline por archivo: abrir → detectar framing → decodificar + validar
/// cada elemento. Devuelve la cantidad de registros válidos; decode y
/// validación fallidos se loguean con ordinal 1-based y se saltean.
pub fn count_valid_records(
    path: &Path,
    key_set: Option<&HashSet<String>>,
) -> Result<u64, ReconcileError> {
    let file = File::open(path).map_err(|e| ReconcileError::io(path, e))?;
    let mut reader = BufReader::new(file);

    let mode = match sniff_mode(&mut reader).map_err(|e| ReconcileError::io(path, e))? {
        Some(mode) => mode,
        None => return Err(ReconcileError::format(path)),
    };

    let mut stream = RecordStream::new(reader, mode);
    let mut valid = 0u64;
    let mut decoded = 0usize;

    while let Some(item) = stream.next_record() {
        match item.map_err(|e| ReconcileError::io(path, e))? {
            StreamItem::Skip(failure) => {
                eprintln!(
                    "❌ ERROR decode {}: registro {}: {}",
                    path.display(),
                    failure.ordinal,
                    failure.message
                );
            }
            StreamItem::Record { ordinal, record } => {
                decoded += 1;
                if let Some(keys) = key_set {
                    if decoded <= KEY_SAMPLE_PER_FILE
                        && !record.cfdi_id.is_empty()
                        && !keys.contains(&record.cfdi_id)
                    {
                        eprintln!(
                            "⚠️  {}: cfdiId '{}' (registro {}) no está en el Excel",
                            path.display(),
                            record.cfdi_id,
                            ordinal
                        );
                    }
                }
                match record.validate() {
                    Ok(()) => valid += 1,
                    Err(reason) => {
                        eprintln!(
                            "❌ ERROR validación {}: registro {}: {}",
                            path.display(),
                            ordinal,
                            reason
                        );
                    }
                }
            }
        }
    }

    Ok(valid)
}

/// Recorre el árbol de directorios y suma los registros válidos de cada
/// `.json`. Errores a nivel archivo (abrir, framing, IO a mitad de stream)
/// abortan el recorrido completo; errores por registro nunca.
pub fn aggregate_json_dir(
    root: &str,
    key_set: Option<&HashSet<String>>,
) -> Result<u64, ReconcileError> {
    let mut total = 0u64;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| ReconcileError::Walk {
            root: root.to_string(),
            source: e,
        })?;
        if !entry.file_type().is_file() || !is_json_file(entry.path()) {
            continue;
        }

        let count = count_valid_records(entry.path(), key_set)?;
        println!(
            " → {}: {} objetos válidos",
            entry.file_name().to_string_lossy(),
            count
        );
        total += count;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const U1: &str = "f81d4fae-7dec-11d0-a765-00a0c91e6bf6";
    const U2: &str = "936da01f-9abd-4d9d-80c7-02af85c822a8";
    const U3: &str = "6fa459ea-ee8a-3ca4-894e-db77e160355e";

    fn record_json(cfdi_id: &str, uuid: &str) -> String {
        format!(
            r#"{{"cfdiId":"{}","uuid":"{}","total":1234.565}}"#,
            cfdi_id, uuid
        )
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).expect("create file");
        f.write_all(content.as_bytes()).expect("write file");
        path
    }

    #[test]
    fn test_sniff_array_mode() {
        let mut reader = BufReader::new("  \n\t[{}]".as_bytes());
        assert_eq!(sniff_mode(&mut reader).unwrap(), Some(FramingMode::Array));
    }

    #[test]
    fn test_sniff_lines_mode() {
        let mut reader = BufReader::new("\n{\"a\":1}".as_bytes());
        assert_eq!(sniff_mode(&mut reader).unwrap(), Some(FramingMode::Lines));
    }

    #[test]
    fn test_sniff_rejects_other_content() {
        let mut reader = BufReader::new("hola".as_bytes());
        assert_eq!(sniff_mode(&mut reader).unwrap(), None);

        let mut empty = BufReader::new("".as_bytes());
        assert_eq!(sniff_mode(&mut empty).unwrap(), None);
    }

    #[test]
    fn test_read_element_nested_and_strings() {
        let mut reader = BufReader::new(r#"{"a":{"b":[1,2]},"c":"x,]}\" y"} ,next"#.as_bytes());
        let raw = read_element(&mut reader).unwrap();
        assert_eq!(raw, r#"{"a":{"b":[1,2]},"c":"x,]}\" y"}"#);
    }

    #[test]
    fn test_read_element_scalar_stops_at_delimiter() {
        let mut reader = BufReader::new("true,false".as_bytes());
        assert_eq!(read_element(&mut reader).unwrap(), "true");
    }

    #[test]
    fn test_count_array_file_skips_bad_elements() {
        let dir = TempDir::new().expect("tempdir");
        // 3 válidos + 1 con campo desconocido + 1 con sintaxis rota (balanceado)
        let content = format!(
            "[{},\n {},\n {{\"cfdiId\":\"X\",\"sorpresa\":true}},\n {{\"cfdiId\": }},\n {}]",
            record_json("A1", U1),
            record_json("A2", U2),
            record_json("A3", U3)
        );
        let path = write_file(dir.path(), "datos.json", &content);

        assert_eq!(count_valid_records(&path, None).unwrap(), 3);
    }

    #[test]
    fn test_count_lines_file_skips_bad_elements() {
        let dir = TempDir::new().expect("tempdir");
        let content = format!(
            "{}\n{}\nesto no es json\n{}\n",
            record_json("A1", U1),
            record_json("A2", U2),
            record_json("A3", U3)
        );
        let path = write_file(dir.path(), "datos.json", &content);

        assert_eq!(count_valid_records(&path, None).unwrap(), 3);
    }

    #[test]
    fn test_mode_independence() {
        let dir = TempDir::new().expect("tempdir");
        let records = [
            record_json("A1", U1),
            record_json("A2", U2),
            record_json("A3", U3),
        ];

        let array = format!("[{}]", records.join(","));
        let lines = records.join("\n");
        let array_path = write_file(dir.path(), "array.json", &array);
        let lines_path = write_file(dir.path(), "lines.json", &lines);

        assert_eq!(
            count_valid_records(&array_path, None).unwrap(),
            count_valid_records(&lines_path, None).unwrap()
        );
    }

    #[test]
    fn test_validation_failures_not_counted() {
        let dir = TempDir::new().expect("tempdir");
        // cfdiId vacío y uuid nil: decodifican bien pero no validan
        let content = format!(
            "{}\n{}\n{}\n",
            record_json("", U1),
            r#"{"cfdiId":"B1"}"#,
            record_json("A1", U1)
        );
        let path = write_file(dir.path(), "datos.json", &content);

        assert_eq!(count_valid_records(&path, None).unwrap(), 1);
    }

    #[test]
    fn test_format_error_for_unrecognized_content() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_file(dir.path(), "datos.json", "  no-json");

        assert!(matches!(
            count_valid_records(&path, None),
            Err(ReconcileError::Format { .. })
        ));
    }

    #[test]
    fn test_truncated_array_is_fatal() {
        let dir = TempDir::new().expect("tempdir");
        let content = format!("[{}", record_json("A1", U1));
        let path = write_file(dir.path(), "datos.json", &content);

        assert!(matches!(
            count_valid_records(&path, None),
            Err(ReconcileError::Io { .. })
        ));
    }

    #[test]
    fn test_key_sample_does_not_affect_count() {
        let dir = TempDir::new().expect("tempdir");
        let content = format!("[{},{}]", record_json("A1", U1), record_json("ZZ", U2));
        let path = write_file(dir.path(), "datos.json", &content);

        // "ZZ" no está en el set: warning advisory, el conteo no cambia
        let keys: HashSet<String> = ["A1"].iter().map(|s| s.to_string()).collect();
        assert_eq!(count_valid_records(&path, Some(&keys)).unwrap(), 2);
    }

    #[test]
    fn test_aggregate_sums_nested_dirs_and_ignores_other_files() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");

        write_file(
            dir.path(),
            "a.json",
            &format!("[{}]", record_json("A1", U1)),
        );
        write_file(
            &dir.path().join("sub"),
            "b.json",
            &format!("{}\n{}", record_json("A2", U2), record_json("A3", U3)),
        );
        write_file(dir.path(), "notas.txt", "no es json");

        let total = aggregate_json_dir(&dir.path().display().to_string(), None).unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_end_to_end_counts_match() {
        use crate::commands::excel_ops;

        let dir = TempDir::new().expect("tempdir");
        write_file(
            dir.path(),
            "export.csv",
            "Uuid,CfdiId,Total\nu1,A1,1\nu2,A2,2\nu3,A3,3\n",
        );
        // 3 registros válidos + 1 elemento malformado que se saltea
        let content = format!(
            "[{},{},{{\"cfdiId\":\"A9\",\"sorpresa\":1}},{}]",
            record_json("A1", U1),
            record_json("A2", U2),
            record_json("A3", U3)
        );
        write_file(dir.path(), "datos.json", &content);

        let excel = dir.path().join("export.csv").display().to_string();
        let keys = excel_ops::extract_key_set(&excel, "Hoja1", "CfdiId").unwrap();
        let expected: HashSet<String> =
            ["A1", "A2", "A3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(keys, expected);

        let excel_count = excel_ops::count_data_rows(&excel, "Hoja1").unwrap();
        let json_count =
            aggregate_json_dir(&dir.path().display().to_string(), Some(&keys)).unwrap();

        assert_eq!(excel_count, 3);
        assert_eq!(json_count, 3);
    }

    #[test]
    fn test_aggregate_aborts_on_file_level_error() {
        let dir = TempDir::new().expect("tempdir");
        write_file(
            dir.path(),
            "a.json",
            &format!("[{}]", record_json("A1", U1)),
        );
        write_file(dir.path(), "b.json", "<xml>");

        assert!(aggregate_json_dir(&dir.path().display().to_string(), None).is_err());
    }
}
