//! Data models shared by the pipeline stages

use crate::period::PeriodBucket;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Genus- or species-level name, the unit of batching
pub type Taxon = String;

// ============================================================================
// Raw occurrence record
// ============================================================================

/// One occurrence record as returned by the occurrence database.
///
/// The upstream shape is not guaranteed, so the record is kept as an opaque
/// field-code map and read through typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawOccurrenceRecord(Map<String, Value>);

impl RawOccurrenceRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Raw value of a field, `None` when absent or JSON null
    pub fn value(&self, code: &str) -> Option<&Value> {
        self.0.get(code).filter(|v| !v.is_null())
    }

    /// Non-empty string value of a field
    pub fn text(&self, code: &str) -> Option<&str> {
        self.value(code)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Numeric value of a field, accepting JSON numbers and numeric strings
    pub fn number(&self, code: &str) -> Option<f64> {
        let n = match self.value(code)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }?;
        n.is_finite().then_some(n)
    }
}

impl From<Value> for RawOccurrenceRecord {
    /// Non-object values become an empty record, which the normalizer drops
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

// ============================================================================
// Canonical output
// ============================================================================

/// Normalized fossil occurrence, one map marker.
///
/// Serialized with the field names the map front end reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrencePoint {
    #[serde(rename = "genero")]
    pub genus: String,

    #[serde(rename = "especie")]
    pub species: String,

    #[serde(rename = "familia")]
    pub family: String,

    #[serde(rename = "formacao")]
    pub formation: String,

    pub lat: f64,

    pub lng: f64,

    /// Early age bound, copied verbatim from upstream
    #[serde(rename = "inicio")]
    pub early_age: Value,

    /// Late age bound, copied verbatim from upstream
    #[serde(rename = "fim")]
    pub late_age: Value,

    #[serde(rename = "periodo")]
    pub period: PeriodBucket,

    /// Illustration URL, or empty when the taxon has none
    #[serde(rename = "imagem")]
    pub image: String,
}

/// Payload served to the map front end
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(rename = "dados_processados")]
    pub points: Vec<OccurrencePoint>,
}

impl Dataset {
    pub fn new(points: Vec<OccurrencePoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_record_accessors() {
        let record = RawOccurrenceRecord::from(json!({
            "lat": "-23.5",
            "lng": 46.6,
            "tna": "",
            "gnn": "Titanis",
            "fml": null,
            "eag": "NaN"
        }));

        assert_eq!(record.number("lat"), Some(-23.5));
        assert_eq!(record.number("lng"), Some(46.6));
        assert_eq!(record.number("eag"), None);
        assert_eq!(record.text("tna"), None);
        assert_eq!(record.text("gnn"), Some("Titanis"));
        assert!(record.value("fml").is_none());
        assert!(record.value("missing").is_none());
    }

    #[test]
    fn test_non_object_record_is_empty() {
        let record = RawOccurrenceRecord::from(json!(["not", "a", "record"]));
        assert_eq!(record, RawOccurrenceRecord::default());
    }

    #[test]
    fn test_dataset_wire_names() {
        let point = OccurrencePoint {
            genus: "Titanis walleri".into(),
            species: "walleri".into(),
            family: "Phorusrhacidae".into(),
            formation: "Não definida".into(),
            lat: 29.1,
            lng: -82.4,
            early_age: json!(4.9),
            late_age: json!(1.8),
            period: PeriodBucket::Neogeno,
            image: String::new(),
        };
        let value = serde_json::to_value(Dataset::new(vec![point])).unwrap();
        let first = &value["dados_processados"][0];
        assert_eq!(first["genero"], "Titanis walleri");
        assert_eq!(first["inicio"], 4.9);
        assert_eq!(first["periodo"], "neogeno");
        assert_eq!(first["imagem"], "");
    }
}
