use std::collections::HashMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use lazy_static::lazy_static;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// Registro CFDI del export JSON (una línea de concepto por registro).
///
/// Esquema estricto: un campo desconocido en el payload rechaza ese elemento.
/// Campos ausentes toman su valor default — los campos de enriquecimiento
/// faltan con frecuencia en los dumps de producción.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CfdiRecord {
    pub cfdi_id: String,
    pub status: String,
    pub cfdi_relation_type: String,
    pub related_cfdi: Vec<Uuid>,
    #[serde(rename = "type")]
    pub cfdi_type: String,
    pub uuid: Uuid,
    pub series: String,
    pub reference: String,
    pub emitter_rfc: String,
    pub emitter_company_name: String,
    pub emitter_postal_code: String,
    pub cfdi_usage: String,
    pub receiver_rfc: String,
    pub receiver_company_name: String,
    pub receptor_postal_code: String,
    pub origin: String,
    pub currency: String,
    pub stamped_date: String,
    pub invoice_date: String,
    pub grouping: String,
    #[serde(deserialize_with = "de_decimal")]
    pub iva: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub sub_total: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub total: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub exchange_rate: BigDecimal,
    pub cancelled: String,
    #[serde(deserialize_with = "de_decimal")]
    pub discount: BigDecimal,
    pub way_of_payment: String,
    pub payment_method: String,
    pub certificate_number: String,
    pub concept_product_service_key: String,
    pub concept_product_service_key_description: String,
    pub concepts: String,
    pub concept_identification_number: String,
    pub unit: String,
    #[serde(deserialize_with = "de_decimal")]
    pub concept_quantity: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub concept_amount: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub concept_unit_value: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub transferred_iva: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub transferred_ieps: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub transferred_base: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub transferred_tax: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub withholding_tax: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub withholding_isr: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub base0_iva: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub base8_iva: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub base16_iva: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub base_exempt_iva: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub base_ieps: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub ieps_rate_or_fee: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub ieps: BigDecimal,
    #[serde(deserialize_with = "de_decimal")]
    pub vat_rate_or_fee: BigDecimal,
    pub file_name: String,
    pub is_valid: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("uuid vacío")]
    EmptyUuid,
    #[error("cfdiId vacío")]
    EmptyCfdiId,
}

impl CfdiRecord {
    /// Validación estructural mínima: uuid presente y no-nil, cfdiId no vacío.
    /// El resto de los campos no se valida acá.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.uuid.is_nil() {
            return Err(ValidationError::EmptyUuid);
        }
        if self.cfdi_id.is_empty() {
            return Err(ValidationError::EmptyCfdiId);
        }
        Ok(())
    }
}

/// Montos con precisión exacta: se decodifican desde el texto literal del
/// número JSON (via `arbitrary_precision`), nunca pasando por f64. También
/// se acepta el monto como string (exports viejos lo emitían entre comillas).
fn de_decimal<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => {
            return Err(de::Error::custom(format!(
                "monto inválido: se esperaba número, llegó {}",
                other
            )))
        }
    };
    BigDecimal::from_str(text.trim()).map_err(de::Error::custom)
}

lazy_static! {
    /// Mapeo campo JSON → encabezado de columna del export Excel CFDIDETAILS2022.
    static ref CFDI_DETAILS_2022_HEADERS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("cfdiId", "CfdiId");
        m.insert("uuid", "Uuid");
        m.insert("emitterRfc", "EmitterRfc");
        m.insert("receiverRfc", "ReceiverRfc");
        m.insert("invoiceDate", "InvoiceDate");
        m.insert("total", "Total");
        m
    };
}

/// Configuración inmutable de encabezados: se construye una vez y se pasa por
/// referencia al extractor de claves.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    headers: HashMap<&'static str, &'static str>,
}

impl ColumnMap {
    pub fn cfdi_details_2022() -> Self {
        ColumnMap {
            headers: CFDI_DETAILS_2022_HEADERS.clone(),
        }
    }

    pub fn header_for(&self, field: &str) -> Option<&'static str> {
        self.headers.get(field).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json(cfdi_id: &str, uuid: &str) -> String {
        format!(r#"{{"cfdiId":"{}","uuid":"{}"}}"#, cfdi_id, uuid)
    }

    #[test]
    fn test_decode_minimal_record() {
        let rec: CfdiRecord = serde_json::from_str(&minimal_json(
            "A1",
            "f81d4fae-7dec-11d0-a765-00a0c91e6bf6",
        ))
        .unwrap();
        assert_eq!(rec.cfdi_id, "A1");
        assert!(!rec.uuid.is_nil());
        // Campos ausentes quedan en default
        assert_eq!(rec.status, "");
        assert_eq!(rec.total, BigDecimal::from(0));
        assert!(rec.related_cfdi.is_empty());
        assert!(!rec.is_valid);
    }

    #[test]
    fn test_decode_rejects_unknown_field() {
        let json = r#"{"cfdiId":"A1","uuid":"f81d4fae-7dec-11d0-a765-00a0c91e6bf6","sorpresa":1}"#;
        let result: Result<CfdiRecord, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_decimal_preserves_exact_value() {
        let json = r#"{"cfdiId":"A1","uuid":"f81d4fae-7dec-11d0-a765-00a0c91e6bf6","total":1234.565,"subTotal":0.1}"#;
        let rec: CfdiRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.total, BigDecimal::from_str("1234.565").unwrap());
        assert_eq!(rec.sub_total, BigDecimal::from_str("0.1").unwrap());
    }

    #[test]
    fn test_decimal_accepts_quoted_amount() {
        let json = r#"{"cfdiId":"A1","uuid":"f81d4fae-7dec-11d0-a765-00a0c91e6bf6","iva":"16.004"}"#;
        let rec: CfdiRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.iva, BigDecimal::from_str("16.004").unwrap());
    }

    #[test]
    fn test_related_cfdi_list() {
        let json = r#"{"cfdiId":"A1","uuid":"f81d4fae-7dec-11d0-a765-00a0c91e6bf6","relatedCfdi":["936da01f-9abd-4d9d-80c7-02af85c822a8"]}"#;
        let rec: CfdiRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.related_cfdi.len(), 1);
    }

    #[test]
    fn test_validate_rejects_empty_cfdi_id() {
        let rec: CfdiRecord = serde_json::from_str(&minimal_json(
            "",
            "f81d4fae-7dec-11d0-a765-00a0c91e6bf6",
        ))
        .unwrap();
        assert_eq!(rec.validate(), Err(ValidationError::EmptyCfdiId));
    }

    #[test]
    fn test_validate_rejects_nil_uuid() {
        // uuid ausente decodifica como nil y falla validación
        let rec: CfdiRecord = serde_json::from_str(r#"{"cfdiId":"A1"}"#).unwrap();
        assert_eq!(rec.validate(), Err(ValidationError::EmptyUuid));

        let rec: CfdiRecord = serde_json::from_str(&minimal_json(
            "A1",
            "00000000-0000-0000-0000-000000000000",
        ))
        .unwrap();
        assert_eq!(rec.validate(), Err(ValidationError::EmptyUuid));
    }

    #[test]
    fn test_validate_accepts_minimal_valid_record() {
        let rec: CfdiRecord = serde_json::from_str(&minimal_json(
            "A1",
            "f81d4fae-7dec-11d0-a765-00a0c91e6bf6",
        ))
        .unwrap();
        assert!(rec.validate().is_ok());
    }

    #[test]
    fn test_column_map_lookup() {
        let map = ColumnMap::cfdi_details_2022();
        assert_eq!(map.header_for("cfdiId"), Some("CfdiId"));
        assert_eq!(map.header_for("noExiste"), None);
    }
}
