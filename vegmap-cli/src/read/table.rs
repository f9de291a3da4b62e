//! Lecture de la table de végétation et de la légende (JSON)
//!
//! La table est un tableau de lignes, une ligne par entrée de classification.
//! Plusieurs lignes partagent l'ElmID d'un élément mosaïque; une ligne sans
//! code de type déclare un élément sans classification.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use vegmap::{AttributeSource, Legend, LegendEntry, MemoryAttributeSource, VegetationRecord};

use super::{value_element_id, value_f64, value_text, ReadRejection};
use crate::config::ColumnMapping;

/// Résultat de lecture de la table de végétation
#[derive(Debug)]
pub struct AttributeRead {
    pub source: MemoryAttributeSource,
    /// Lignes lues
    pub rows: usize,
    /// Lignes écartées
    pub rejected: Vec<ReadRejection>,
}

/// Lit la table de végétation
pub fn read_attributes(path: &Path, columns: &ColumnMapping) -> Result<AttributeRead> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read attribute table: {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .context(format!("Failed to parse attribute table: {}", path.display()))?;

    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(mut object) => match object.remove("rows") {
            Some(Value::Array(rows)) => rows,
            _ => bail!("{} has no rows array", path.display()),
        },
        _ => bail!("{} is not an array of rows", path.display()),
    };

    let mut source = MemoryAttributeSource::new();
    let mut rejected = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let Some(object) = row.as_object() else {
            rejected.push(ReadRejection {
                index,
                element: None,
                reason: "row is not an object".to_string(),
            });
            continue;
        };
        let field = |name: &str| object.get(name).unwrap_or(&Value::Null);

        let Some(id) = value_element_id(field(&columns.elmid)) else {
            rejected.push(ReadRejection {
                index,
                element: None,
                reason: format!("missing {} value", columns.elmid),
            });
            continue;
        };

        match value_text(field(&columns.type_code)) {
            Some(type_code) => {
                let mut record = VegetationRecord::new(type_code).with_cover(
                    value_text(field(&columns.cover_code)),
                    value_f64(field(&columns.cover_percent)),
                );
                record.sub_type_code = value_text(field(&columns.sub_type_code));
                record.proportion = value_f64(field(&columns.proportion));
                source.push_record(id.clone(), record);
            }
            None => source.insert_element(id.clone()),
        }

        if source.survey_year(&id).is_none() {
            if let Some(year) = survey_year(field(&columns.date)) {
                source.set_survey_year(id, year);
            }
        }
    }

    for rejection in &rejected {
        warn!(
            index = rejection.index,
            reason = rejection.reason.as_str(),
            "Attribute row rejected"
        );
    }
    info!(
        path = %path.display(),
        rows = rows.len(),
        elements = source.len(),
        rejected = rejected.len(),
        "Attribute table loaded"
    );

    Ok(AttributeRead {
        source,
        rows: rows.len(),
        rejected,
    })
}

fn year_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?:^|[^0-9])([12][0-9]{3})(?:[^0-9]|$)").ok())
        .as_ref()
}

/// Année d'une date de relevé ("2008-06-12", "12-6-2008", 2008)
fn survey_year(value: &Value) -> Option<u16> {
    if let Value::Number(n) = value {
        return n
            .as_u64()
            .filter(|year| (1000..=2999).contains(year))
            .map(|year| year as u16);
    }
    let text = value.as_str()?;
    let captures = year_pattern()?.captures(text)?;
    captures.get(1)?.as_str().parse().ok()
}

#[derive(Debug, Deserialize)]
struct LegendFile {
    version: String,
    entries: BTreeMap<String, LegendEntry>,
}

/// Lit une légende: `{"version": ..., "entries": {code: description}}`
pub fn read_legend(path: &Path) -> Result<Legend> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read legend: {}", path.display()))?;
    let file: LegendFile = serde_json::from_str(&content)
        .context(format!("Failed to parse legend: {}", path.display()))?;

    info!(
        path = %path.display(),
        version = file.version.as_str(),
        codes = file.entries.len(),
        "Legend loaded"
    );
    Ok(Legend::new(file.version, file.entries))
}
