use std::error::Error;
use std::path::Path;

use walkdir::WalkDir;

/// Valida que un archivo exista antes de arrancar el procesamiento
pub fn validate_file_exists(path: &str) -> Result<(), Box<dyn Error>> {
    if !Path::new(path).exists() {
        return Err(format!("File not found: {}", path).into());
    }
    Ok(())
}

/// Valida que la ruta exista y sea un directorio
pub fn validate_dir_exists(path: &str) -> Result<(), Box<dyn Error>> {
    let p = Path::new(path);
    if !p.is_dir() {
        return Err(format!("Directory not found: {}", path).into());
    }
    Ok(())
}

/// Calcula el tamaño de un archivo en bytes
pub fn get_file_size(path: &str) -> Result<u64, Box<dyn Error>> {
    let metadata = std::fs::metadata(path)?;
    Ok(metadata.len())
}

/// Formatea bytes en formato legible (KB, MB, GB)
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Extensión `.json` (case-insensitive, como exporta el proveedor)
pub fn is_json_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Cuenta los `.json` bajo un directorio (para reportar antes de procesar).
/// Los errores del walk se ignoran acá; el recorrido real los propaga.
pub fn count_json_files(dir: &str) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_json_file(e.path()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_is_json_file() {
        assert!(is_json_file(Path::new("/tmp/a.json")));
        assert!(is_json_file(Path::new("/tmp/a.JSON")));
        assert!(!is_json_file(Path::new("/tmp/a.jsonl")));
        assert!(!is_json_file(Path::new("/tmp/json")));
    }
}
