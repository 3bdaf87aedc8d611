//! Stratigraphic stage to geological period classification
//!
//! The stage table lives in `data/stage_periods.tsv` and is compiled into the
//! binary. It is parsed once, on first use, into an immutable map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

const STAGE_TABLE: &str = include_str!("../data/stage_periods.tsv");

static STAGES: LazyLock<StageTable> = LazyLock::new(|| StageTable::parse(STAGE_TABLE));

/// Coarse geological period bucket used by the map filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeriodBucket {
    Cretaceo,
    Jurassico,
    Triassico,
    Permiano,
    Carbonifero,
    Devoniano,
    Siluriano,
    Ordoviciano,
    Cambriano,
    Quaternario,
    Neogeno,
    Paleogeno,
    /// Unknown or unmapped stage
    #[default]
    Outro,
}

impl PeriodBucket {
    pub fn all() -> [PeriodBucket; 13] {
        [
            PeriodBucket::Cretaceo,
            PeriodBucket::Jurassico,
            PeriodBucket::Triassico,
            PeriodBucket::Permiano,
            PeriodBucket::Carbonifero,
            PeriodBucket::Devoniano,
            PeriodBucket::Siluriano,
            PeriodBucket::Ordoviciano,
            PeriodBucket::Cambriano,
            PeriodBucket::Quaternario,
            PeriodBucket::Neogeno,
            PeriodBucket::Paleogeno,
            PeriodBucket::Outro,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodBucket::Cretaceo => "cretaceo",
            PeriodBucket::Jurassico => "jurassico",
            PeriodBucket::Triassico => "triassico",
            PeriodBucket::Permiano => "permiano",
            PeriodBucket::Carbonifero => "carbonifero",
            PeriodBucket::Devoniano => "devoniano",
            PeriodBucket::Siluriano => "siluriano",
            PeriodBucket::Ordoviciano => "ordoviciano",
            PeriodBucket::Cambriano => "cambriano",
            PeriodBucket::Quaternario => "quaternario",
            PeriodBucket::Neogeno => "neogeno",
            PeriodBucket::Paleogeno => "paleogeno",
            PeriodBucket::Outro => "outro",
        }
    }
}

impl std::fmt::Display for PeriodBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PeriodBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PeriodBucket::all()
            .into_iter()
            .find(|bucket| bucket.as_str() == s)
            .ok_or_else(|| format!("Unknown period bucket: {}", s))
    }
}

/// Parsed stage table
#[derive(Debug)]
struct StageTable {
    version: u32,
    entries: HashMap<String, PeriodBucket>,
}

impl StageTable {
    fn parse(source: &str) -> Self {
        let mut version = 0;
        let mut entries = HashMap::new();

        for (index, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix('#') {
                if let Some(v) = comment.trim().strip_prefix("version:") {
                    version = v.trim().parse().unwrap_or(0);
                }
                continue;
            }

            match parse_entry(line) {
                Some((stage, bucket)) => {
                    entries.insert(stage, bucket);
                },
                None => warn!(line = index + 1, content = %line, "Skipping malformed stage table line"),
            }
        }

        Self { version, entries }
    }
}

fn parse_entry(line: &str) -> Option<(String, PeriodBucket)> {
    let (stage, bucket) = line.split_once('\t')?;
    let stage = stage.trim().to_lowercase();
    if stage.is_empty() || stage.split_whitespace().count() != 1 {
        return None;
    }
    let bucket = bucket.trim().parse().ok()?;
    Some((stage, bucket))
}

/// Version declared in the embedded stage table header
pub fn table_version() -> u32 {
    STAGES.version
}

/// Number of stages known to the classifier
pub fn table_len() -> usize {
    STAGES.entries.len()
}

/// Map an era/stage string to its period bucket.
///
/// Only the last whitespace-separated word after the final `/` is looked up,
/// case-insensitively: `"Upper/Maastrichtian"` and `"Late Maastrichtian"`
/// both resolve through `maastrichtian`. Anything unmatched is
/// [`PeriodBucket::Outro`].
pub fn classify(era: Option<&str>) -> PeriodBucket {
    let Some(era) = era else {
        return PeriodBucket::Outro;
    };

    let tail = era.rsplit('/').next().unwrap_or(era);
    let Some(term) = tail.split_whitespace().last() else {
        return PeriodBucket::Outro;
    };

    STAGES
        .entries
        .get(&term.to_lowercase())
        .copied()
        .unwrap_or(PeriodBucket::Outro)
}
