//! Raw occurrence → [`OccurrencePoint`] normalization
//!
//! Only the four mandatory fields (`lat`, `lng`, `eag`, `lag`) decide whether
//! a record survives; every other field has a fallback.

use crate::models::{OccurrencePoint, RawOccurrenceRecord};
use crate::period::{classify, PeriodBucket};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

pub const UNIDENTIFIED_GENUS: &str = "Não identificado";
pub const UNDEFINED_FAMILY: &str = "Não definido";
pub const UNDEFINED_FORMATION: &str = "Não definida";
pub const NO_FAMILY_SENTINEL: &str = "NO_FAMILY_SPECIFIED";

/// Upstream field codes read by the normalizer
mod field {
    pub const LAT: &str = "lat";
    pub const LNG: &str = "lng";
    pub const EARLY_AGE: &str = "eag";
    pub const LATE_AGE: &str = "lag";
    pub const TAXON_NAME: &str = "tna";
    pub const GENUS_NAME: &str = "gnn";
    pub const SPECIES_NAME: &str = "spn";
    pub const IDENTIFICATION: &str = "idt";
    pub const FAMILY: &str = "fml";
    pub const STRATUM: &str = "sfn";
    pub const STRATUM_ALT: &str = "sfm";
    pub const ERA_CANDIDATES: [&str; 3] = ["oei", "oli", "pnm"];
}

/// Converts raw records against a fixed set of illustration assets
pub struct RecordNormalizer<'a> {
    assets: HashSet<&'a str>,
    image_base: &'a Url,
}

impl<'a> RecordNormalizer<'a> {
    /// `image_base` must end in `/`; see
    /// [`IngestConfig::image_base_url`](crate::config::IngestConfig::image_base_url)
    pub fn new(known_assets: &'a [String], image_base: &'a Url) -> Self {
        Self {
            assets: known_assets.iter().map(String::as_str).collect(),
            image_base,
        }
    }

    pub fn normalize(&self, records: &[RawOccurrenceRecord]) -> Vec<OccurrencePoint> {
        let points: Vec<OccurrencePoint> =
            records.iter().filter_map(|r| self.normalize_one(r)).collect();

        debug!(
            input = records.len(),
            output = points.len(),
            dropped = records.len() - points.len(),
            "Normalized occurrence records"
        );
        points
    }

    pub fn normalize_one(&self, record: &RawOccurrenceRecord) -> Option<OccurrencePoint> {
        let early_age = record.value(field::EARLY_AGE)?.clone();
        let late_age = record.value(field::LATE_AGE)?.clone();
        let (Some(lat), Some(lng)) = (record.number(field::LAT), record.number(field::LNG)) else {
            if record.value(field::LAT).is_some() && record.value(field::LNG).is_some() {
                debug!("Dropping record with non-numeric coordinates");
            }
            return None;
        };

        Some(OccurrencePoint {
            genus: display_genus(record).to_string(),
            species: species(record).to_string(),
            family: family(record).to_string(),
            formation: formation(record).to_string(),
            lat,
            lng,
            early_age,
            late_age,
            period: period(record),
            image: self.image_url(record),
        })
    }

    /// Asset name for the record: `Genus_species` first, then `Genus`
    pub fn resolve_image_name(&self, record: &RawOccurrenceRecord) -> Option<String> {
        let base = record
            .text(field::GENUS_NAME)
            .or_else(|| record.text(field::TAXON_NAME))?;
        let genus = base.split(' ').next().filter(|g| !g.is_empty())?;

        if let Some(species) = record.text(field::SPECIES_NAME) {
            let compound = format!("{}_{}", genus, species);
            if self.assets.contains(compound.as_str()) {
                return Some(compound);
            }
        }

        self.assets.contains(genus).then(|| genus.to_string())
    }

    fn image_url(&self, record: &RawOccurrenceRecord) -> String {
        let Some(name) = self.resolve_image_name(record) else {
            return String::new();
        };

        let mut url = self.image_base.clone();
        match url.path_segments_mut() {
            Ok(mut segments) => {
                segments.pop_if_empty().push(&format!("{}.jpg", name));
            },
            Err(()) => return String::new(),
        }
        url.into()
    }
}

/// Full taxon name, then generic name
fn display_genus(record: &RawOccurrenceRecord) -> &str {
    record
        .text(field::TAXON_NAME)
        .or_else(|| record.text(field::GENUS_NAME))
        .unwrap_or(UNIDENTIFIED_GENUS)
}

/// Word after the first space of the identification, else the species name
fn species(record: &RawOccurrenceRecord) -> &str {
    match record.text(field::IDENTIFICATION) {
        Some(idt) if idt.contains(' ') => idt.split(' ').nth(1).unwrap_or_default(),
        _ => record.text(field::SPECIES_NAME).unwrap_or_default(),
    }
}

fn family(record: &RawOccurrenceRecord) -> &str {
    record
        .text(field::FAMILY)
        .filter(|f| *f != NO_FAMILY_SENTINEL)
        .unwrap_or(UNDEFINED_FAMILY)
}

fn formation(record: &RawOccurrenceRecord) -> &str {
    record
        .text(field::STRATUM)
        .or_else(|| record.text(field::STRATUM_ALT))
        .unwrap_or(UNDEFINED_FORMATION)
}

fn period(record: &RawOccurrenceRecord) -> PeriodBucket {
    let era = field::ERA_CANDIDATES
        .iter()
        .find_map(|code| record.text(code));
    classify(era)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn base_url() -> Url {
        Url::parse("https://raw.githubusercontent.com/LuksNMDS/mapa-tcc-imagens/main/static/imagens/")
            .unwrap()
    }

    fn record(value: Value) -> RawOccurrenceRecord {
        RawOccurrenceRecord::from(value)
    }

    fn located(extra: Value) -> RawOccurrenceRecord {
        let mut fields = json!({ "lat": "-30.1", "lng": -51.2, "eag": 66.0, "lag": "72.1" });
        for (k, v) in extra.as_object().unwrap() {
            fields[k] = v.clone();
        }
        record(fields)
    }

    #[test]
    fn test_records_missing_mandatory_fields_are_dropped() {
        let assets: Vec<String> = Vec::new();
        let base = base_url();
        let normalizer = RecordNormalizer::new(&assets, &base);

        let records = vec![
            record(json!({ "lng": 1.0, "eag": 1, "lag": 0 })),
            record(json!({ "lat": 1.0, "eag": 1, "lag": 0 })),
            record(json!({ "lat": 1.0, "lng": 1.0, "lag": 0 })),
            record(json!({ "lat": 1.0, "lng": 1.0, "eag": 1 })),
            record(json!({ "lat": null, "lng": 1.0, "eag": 1, "lag": 0 })),
            record(json!({ "lat": 1.0, "lng": 1.0, "eag": 1, "lag": null })),
            located(json!({})),
            located(json!({ "tna": "Titanis walleri" })),
        ];

        let points = normalizer.normalize(&records);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].lat, -30.1);
        assert_eq!(points[0].early_age, json!(66.0));
        assert_eq!(points[0].late_age, json!("72.1"));
    }

    #[test]
    fn test_non_numeric_coordinates_are_dropped() {
        let assets: Vec<String> = Vec::new();
        let base = base_url();
        let normalizer = RecordNormalizer::new(&assets, &base);

        let bad = record(json!({ "lat": "north", "lng": 1.0, "eag": 1, "lag": 0 }));
        assert!(normalizer.normalize_one(&bad).is_none());
    }

    #[test]
    fn test_defaults_for_sparse_record() {
        let assets: Vec<String> = Vec::new();
        let base = base_url();
        let point = RecordNormalizer::new(&assets, &base)
            .normalize_one(&located(json!({})))
            .unwrap();

        assert_eq!(point.genus, UNIDENTIFIED_GENUS);
        assert_eq!(point.species, "");
        assert_eq!(point.family, UNDEFINED_FAMILY);
        assert_eq!(point.formation, UNDEFINED_FORMATION);
        assert_eq!(point.period, PeriodBucket::Outro);
        assert_eq!(point.image, "");
    }

    #[test]
    fn test_family_fallback() {
        let assets: Vec<String> = Vec::new();
        let base = base_url();
        let normalizer = RecordNormalizer::new(&assets, &base);

        let family_of = |v: Value| normalizer.normalize_one(&located(v)).unwrap().family;

        assert_eq!(family_of(json!({ "fml": "NO_FAMILY_SPECIFIED" })), UNDEFINED_FAMILY);
        assert_eq!(family_of(json!({ "fml": null })), UNDEFINED_FAMILY);
        assert_eq!(family_of(json!({})), UNDEFINED_FAMILY);
        assert_eq!(family_of(json!({ "fml": "Tyrannosauridae" })), "Tyrannosauridae");
    }

    #[test]
    fn test_genus_and_species_precedence() {
        let assets: Vec<String> = Vec::new();
        let base = base_url();
        let normalizer = RecordNormalizer::new(&assets, &base);

        let point = normalizer
            .normalize_one(&located(json!({
                "tna": "Smilodon populator",
                "gnn": "Smilodon",
                "idt": "Smilodon cf. populator",
                "spn": "fatalis"
            })))
            .unwrap();
        assert_eq!(point.genus, "Smilodon populator");
        assert_eq!(point.species, "cf.");

        let point = normalizer
            .normalize_one(&located(json!({ "gnn": "Smilodon", "idt": "Smilodon", "spn": "fatalis" })))
            .unwrap();
        assert_eq!(point.genus, "Smilodon");
        assert_eq!(point.species, "fatalis");
    }

    #[test]
    fn test_formation_and_period() {
        let assets: Vec<String> = Vec::new();
        let base = base_url();
        let normalizer = RecordNormalizer::new(&assets, &base);

        let point = normalizer
            .normalize_one(&located(json!({
                "sfm": "Hell Creek",
                "oei": "",
                "oli": "Late/Maastrichtian",
                "pnm": "Campanian"
            })))
            .unwrap();
        assert_eq!(point.formation, "Hell Creek");
        assert_eq!(point.period, PeriodBucket::Cretaceo);

        let point = normalizer
            .normalize_one(&located(json!({ "sfn": "Santa Maria", "sfm": "Other", "pnm": "Carnian" })))
            .unwrap();
        assert_eq!(point.formation, "Santa Maria");
        assert_eq!(point.period, PeriodBucket::Triassico);
    }

    #[test]
    fn test_image_resolution() {
        let assets = vec!["Rex_imperator".to_string(), "Rex".to_string()];
        let base = base_url();
        let normalizer = RecordNormalizer::new(&assets, &base);

        let point = normalizer
            .normalize_one(&located(json!({ "gnn": "Rex", "spn": "imperator" })))
            .unwrap();
        assert_eq!(
            point.image,
            "https://raw.githubusercontent.com/LuksNMDS/mapa-tcc-imagens/main/static/imagens/Rex_imperator.jpg"
        );

        let point = normalizer
            .normalize_one(&located(json!({ "gnn": "Rex", "spn": "unknown" })))
            .unwrap();
        assert!(point.image.ends_with("/static/imagens/Rex.jpg"));

        let point = normalizer
            .normalize_one(&located(json!({ "gnn": "Nemo", "spn": "imperator" })))
            .unwrap();
        assert_eq!(point.image, "");
    }

    #[test]
    fn test_image_genus_from_full_name() {
        let assets = vec!["Rex".to_string()];
        let base = base_url();
        let normalizer = RecordNormalizer::new(&assets, &base);

        let rec = located(json!({ "tna": "Rex imperator" }));
        assert_eq!(normalizer.resolve_image_name(&rec).as_deref(), Some("Rex"));
    }

    #[test]
    fn test_image_name_is_percent_encoded() {
        let assets = vec!["Homo sapiens".to_string()];
        let base = base_url();
        let normalizer = RecordNormalizer::new(&assets, &base);

        // Genus is the first word, so only an exact single-word asset matches
        let rec = located(json!({ "gnn": "Homo sapiens" }));
        assert_eq!(normalizer.resolve_image_name(&rec), None);

        let assets = vec!["Homo_sapiens?".to_string()];
        let normalizer = RecordNormalizer::new(&assets, &base);
        let point = normalizer
            .normalize_one(&located(json!({ "gnn": "Homo", "spn": "sapiens?" })))
            .unwrap();
        assert!(point.image.ends_with("/Homo_sapiens%3F.jpg"), "{}", point.image);
    }
}
