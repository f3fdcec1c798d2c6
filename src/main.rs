use std::env;
use std::error::Error;
use std::process;

// Importar módulos locales
mod commands;
mod errors;
mod file_utils;
mod models;
mod progress;
mod sheet;

use commands::{excel_ops, json_ops};
use file_utils::{
    count_json_files, format_bytes, get_file_size, validate_dir_exists, validate_file_exists,
};
use models::ColumnMap;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();

    let mut excel_path: Option<String> = None;
    let mut sheet_name: Option<String> = None;
    let mut json_dir: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-excel" if i + 1 < args.len() => {
                excel_path = Some(args[i + 1].clone());
                i += 2;
            }
            "-sheet" if i + 1 < args.len() => {
                sheet_name = Some(args[i + 1].clone());
                i += 2;
            }
            "-jsondir" if i + 1 < args.len() => {
                json_dir = Some(args[i + 1].clone());
                i += 2;
            }
            "-excel" | "-sheet" | "-jsondir" => {
                eprintln!("❌ Falta el valor para {}", args[i]);
                help();
                process::exit(1);
            }
            "help" | "-h" | "--help" => {
                help();
                return Ok(());
            }
            other => {
                eprintln!("❌ Flag desconocido: {}", other);
                help();
                process::exit(1);
            }
        }
    }

    // Los tres flags son obligatorios
    let (excel_path, sheet_name, json_dir) = match (excel_path, sheet_name, json_dir) {
        (Some(e), Some(s), Some(j)) => (e, s, j),
        _ => {
            help();
            process::exit(1);
        }
    };

    banner();
    println!(
        "📅 Corrida: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    validate_file_exists(&excel_path)?;
    validate_dir_exists(&json_dir)?;

    println!(
        "📄 Excel:   {} ({})",
        excel_path,
        format_bytes(get_file_size(&excel_path)?)
    );
    println!("📋 Hoja:    {}", sheet_name);
    println!(
        "📂 JSONs:   {} ({} archivos .json)",
        json_dir,
        count_json_files(&json_dir)
    );
    println!();

    // 1. Set de claves de la columna CfdiId (para el chequeo advisory)
    let columns = ColumnMap::cfdi_details_2022();
    let key_header = columns
        .header_for("cfdiId")
        .ok_or("cfdiId sin encabezado mapeado")?;
    println!("🔑 Extrayendo claves de la columna '{}'...", key_header);
    let key_set = excel_ops::extract_key_set(&excel_path, &sheet_name, key_header)?;
    println!("🔑 {} identificadores únicos en el Excel", key_set.len());
    println!();

    // 2. Conteo de filas del Excel en modo streaming
    let excel_count = excel_ops::count_data_rows(&excel_path, &sheet_name)?;
    println!("Filas en Excel: {}", excel_count);
    println!();

    // 3. Recorrido del directorio de JSONs
    let json_count = json_ops::aggregate_json_dir(&json_dir, Some(&key_set))?;
    println!("Objetos totales en JSONs: {}", json_count);
    println!();

    // 4. Veredicto final
    if excel_count != json_count {
        eprintln!("❌ Mismatch: Excel={} vs JSONs={}", excel_count, json_count);
        process::exit(1);
    }
    println!("✅ Coinciden filas Excel y total de objetos JSON.");

    Ok(())
}

fn banner() {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  CFDI Tools - Conciliación Excel / JSON                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!(
        "🔖 v{} (Build #{} - {})",
        env!("CFDI_TOOLS_VERSION"),
        env!("BUILD_NUMBER"),
        env!("BUILD_DATE")
    );
}

fn help() {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  CFDI Tools - Conciliación Excel / JSON                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Uso: cfdi_tools -excel <input.xlsx> -sheet <hoja> -jsondir <dir>");
    println!();
    println!("  -excel    Export Excel (.xlsx/.xls/.ods, también .csv plano)");
    println!("  -sheet    Nombre de la hoja (ej: CFDIDETAILS2022; ignorado para .csv)");
    println!("  -jsondir  Directorio con los archivos .json a contrastar");
    println!();
    println!("El proceso:");
    println!("  1. Extrae el set de CfdiId de la hoja (chequeo advisory)");
    println!("  2. Cuenta las filas de datos del Excel (streaming, sin cabecera)");
    println!("  3. Recorre el directorio y cuenta los objetos JSON válidos");
    println!("     - array JSON o NDJSON, detectado por el primer byte");
    println!("     - registros malformados se loguean y se saltean");
    println!("  4. Compara totales: mismatch ⇒ exit code != 0");
    println!();
    println!("EXAMPLES:");
    println!();
    println!("  cfdi_tools -excel cfdis_2022.xlsx -sheet CFDIDETAILS2022 -jsondir ./jsons");
    println!();
    println!("  # Export plano en CSV (el nombre de hoja se ignora)");
    println!("  cfdi_tools -excel cfdis_2022.csv -sheet CFDIDETAILS2022 -jsondir ./jsons");
}
