//! Export d'une carte vers un écrivain de conteneur géométrique
//!
//! Chaque élément est écrit avec sa géométrie et une table d'attributs
//! aplatie: un jeu de colonnes par entrée de classification, suffixées par le
//! rang de l'entrée (`type_1`, `prop_1`, `type_2`...). Les noms de colonnes
//! tiennent en 10 caractères pour rester compatibles avec les formats à
//! colonnes courtes.
//!
//! Un refus de l'écrivain n'interrompt pas l'export (sauf en mode strict):
//! il est consigné dans le rapport avec l'identifiant et la raison.

use tracing::{debug, info, warn};

use super::{MapData, MapElement};
use crate::error::{ExportError, VegmapError};
use crate::report::ExportReport;
use crate::source::FeatureWriter;
use crate::types::{ElementKind, FieldValue, FlatAttributes, VegetationRecord};

/// Colonnes par élément
pub const FIELD_ELEMENT_ID: &str = "elmid";
pub const FIELD_KIND: &str = "loctype";
pub const FIELD_AREA_HA: &str = "oppha";
pub const FIELD_YEAR: &str = "year";
pub const FIELD_ORPHAN: &str = "orphan";
pub const FIELD_TYPE_COUNT: &str = "n_types";

fn column(prefix: &str, rank: usize) -> String {
    format!("{}_{}", prefix, rank)
}

impl MapData {
    /// Exporte les éléments sélectionnés vers `writer`
    ///
    /// # Errors
    ///
    /// Retourne `ExportError` si aucun enregistrement n'a pu être écrit alors
    /// qu'au moins un a été refusé, ou si l'écrivain refuse d'ouvrir ou de
    /// finaliser le conteneur. Le rapport reste accessible dans l'erreur.
    pub fn export<W: FeatureWriter + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<ExportReport, ExportError> {
        let mut report = ExportReport::default();
        let strict = self.options().strict;

        if let Err(rejection) = writer.begin(self.crs()) {
            warn!(reason = %rejection, "Writer refused to open the container");
            report.aborted = Some(rejection.reason);
            report.skipped = self.iter().map(|element| element.id().clone()).collect();
            return Err(ExportError { report });
        }

        let mut elements = self.iter();
        for element in elements.by_ref() {
            let outcome = self
                .flatten(element)
                .map_err(|err| err.to_string())
                .and_then(|attributes| {
                    writer
                        .write(element.id(), element.geometry(), &attributes)
                        .map_err(|rejection| rejection.reason)
                });

            match outcome {
                Ok(()) => {
                    debug!(element = %element.id(), "Element exported");
                    report.record_written(element.id());
                }
                Err(reason) => {
                    warn!(element = %element.id(), reason = %reason, "Element rejected");
                    report.record_failure(element.id(), reason);
                    if strict {
                        break;
                    }
                }
            }
        }
        report
            .skipped
            .extend(elements.map(|element| element.id().clone()));

        if let Err(rejection) = writer.finish() {
            warn!(reason = %rejection, "Writer refused to finalize the container");
            report.aborted = Some(rejection.reason);
            return Err(ExportError { report });
        }

        info!(
            written = report.written.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Export completed"
        );

        if report.written.is_empty() && !report.failed.is_empty() {
            return Err(ExportError { report });
        }
        Ok(report)
    }

    /// Attributs aplatis d'un élément, enrichis par la légende
    pub fn flatten(&self, element: &MapElement) -> Result<FlatAttributes, VegmapError> {
        let descriptions = element.classification(self.classifier())?;
        let mut attributes = FlatAttributes::new();

        attributes.push(FIELD_ELEMENT_ID, element.id());
        attributes.push(FIELD_KIND, element.kind().code());
        attributes.push(
            FIELD_AREA_HA,
            match element.kind() {
                ElementKind::Polygon => FieldValue::Real(element.area_ha()),
                ElementKind::Line => FieldValue::Null,
            },
        );
        attributes.push(
            FIELD_YEAR,
            element
                .survey_year()
                .map(|year| FieldValue::Integer(i64::from(year)))
                .unwrap_or(FieldValue::Null),
        );
        attributes.push(FIELD_ORPHAN, i64::from(element.is_orphan()));
        attributes.push(FIELD_TYPE_COUNT, element.records().len() as i64);

        for (index, (record, description)) in
            element.records().iter().zip(&descriptions).enumerate()
        {
            let rank = index + 1;
            attributes.push(column("type", rank), record.type_code.as_str());
            attributes.push(column("name", rank), description.name.clone());
            attributes.push(column("main", rank), description.main_type.as_str());
            attributes.push(column("sub", rank), description.sub_type.clone());
            attributes.push(column("sbb", rank), record.sub_type_code.clone());
            attributes.push(column("stage", rank), description.successional_stage.clone());
            attributes.push(column("qual", rank), description.quality_class.clone());
            attributes.push(column("covc", rank), record.cover_code.clone());
            attributes.push(column("cov", rank), record.cover_percent);
            attributes.push(column("prop", rank), record.proportion);
        }

        Ok(attributes)
    }
}

fn text(attributes: &FlatAttributes, name: &str) -> Option<String> {
    match attributes.get(name)? {
        FieldValue::Null => None,
        value => Some(value.to_text()).filter(|s| !s.is_empty()),
    }
}

/// Reconstruit les entrées de classification d'un enregistrement exporté
///
/// La provenance (noms, types principaux) est perdue; restent les codes, le
/// recouvrement et les proportions, dans l'ordre des rangs.
pub fn records_from_flat(attributes: &FlatAttributes) -> Vec<VegetationRecord> {
    let count = attributes
        .get(FIELD_TYPE_COUNT)
        .and_then(FieldValue::as_f64)
        .map(|n| n.max(0.0) as usize);

    let mut records = Vec::new();
    for rank in 1.. {
        if count.is_some_and(|count| rank > count) {
            break;
        }
        let Some(type_code) = text(attributes, &column("type", rank)) else {
            break;
        };

        let mut record = VegetationRecord::new(type_code).with_cover(
            text(attributes, &column("covc", rank)),
            attributes
                .get(&column("cov", rank))
                .and_then(FieldValue::as_f64),
        );
        record.sub_type_code = text(attributes, &column("sbb", rank));
        record.proportion = attributes
            .get(&column("prop", rank))
            .and_then(FieldValue::as_f64);
        records.push(record);
    }
    records
}

/// Année de relevé d'un enregistrement exporté
pub fn survey_year_from_flat(attributes: &FlatAttributes) -> Option<u16> {
    attributes
        .get(FIELD_YEAR)
        .and_then(FieldValue::as_f64)
        .filter(|year| *year >= 1.0 && *year <= f64::from(u16::MAX))
        .map(|year| year as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::legend::{Legend, LegendEntry};
    use crate::report::ExportStatus;
    use crate::source::{
        MemoryAttributeSource, MemoryGeometrySource, MemoryWriter, WriteRejection,
    };
    use crate::types::{Crs, ElementId};
    use geo::{Geometry, LineString, Polygon};
    use std::sync::Arc;

    fn square(x: f64, size: f64) -> Geometry {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![(x, 0.0), (x + size, 0.0), (x + size, size), (x, size), (x, 0.0)]),
            vec![],
        ))
    }

    fn legend() -> Arc<Legend> {
        Arc::new(Legend::new(
            "test",
            vec![
                (
                    "11A1".to_string(),
                    LegendEntry {
                        main_type: "11".to_string(),
                        sub_type: Some("11A".to_string()),
                        quality_class: Some("2".to_string()),
                        name: Some("Zeegras".to_string()),
                        ..Default::default()
                    },
                ),
                ("33B".to_string(), LegendEntry::new("33")),
            ],
        ))
    }

    /// Polygones 1 et 3, ligne 2
    fn map(options: BuildOptions) -> MapData {
        let mut geometries = MemoryGeometrySource::new(Crs::default());
        geometries.insert(1, square(0.0, 100.0)).unwrap();
        geometries
            .insert(
                2,
                Geometry::LineString(LineString::from(vec![(0.0, 200.0), (50.0, 200.0)])),
            )
            .unwrap();
        geometries.insert(3, square(200.0, 100.0)).unwrap();

        let mut attributes = MemoryAttributeSource::from_rows(vec![
            (
                1,
                VegetationRecord::new("11A1")
                    .with_proportion(70.0)
                    .with_sub_type("11Aa01")
                    .with_cover(Some("3".to_string()), Some(40.0)),
            ),
            (1, VegetationRecord::new("33B").with_proportion(30.0)),
            (2, VegetationRecord::new("33B")),
            (3, VegetationRecord::new("33B")),
        ]);
        attributes.set_survey_year(1, 2012);

        MapData::from_sources(geometries, attributes, legend(), options).unwrap()
    }

    #[test]
    fn test_flatten_columns() {
        let map = map(BuildOptions::default());
        let element = map.element(&ElementId::from(1)).unwrap();
        let attributes = map.flatten(element).unwrap();

        assert_eq!(attributes.get("elmid"), Some(&FieldValue::Integer(1)));
        assert_eq!(attributes.get("loctype"), Some(&FieldValue::Text("v".to_string())));
        assert_eq!(attributes.get("oppha"), Some(&FieldValue::Real(1.0)));
        assert_eq!(attributes.get("year"), Some(&FieldValue::Integer(2012)));
        assert_eq!(attributes.get("name_1"), Some(&FieldValue::Text("Zeegras".to_string())));
        assert_eq!(attributes.get("sub_1"), Some(&FieldValue::Text("11A".to_string())));
        assert_eq!(attributes.get("prop_2"), Some(&FieldValue::Real(30.0)));
        assert!(attributes.iter().all(|(name, _)| name.len() <= 10));
    }

    #[test]
    fn test_export_round_trip() {
        let map = map(BuildOptions::default());
        let mut writer = MemoryWriter::new();
        let report = map.export(&mut writer).unwrap();

        assert_eq!(report.status(), ExportStatus::Success);
        assert_eq!(report.written.len(), 3);
        assert!(writer.is_finished());

        let first = &writer.features()[0];
        let records = records_from_flat(&first.attributes);
        assert_eq!(records, map.element(&ElementId::from(1)).unwrap().records());
        assert_eq!(survey_year_from_flat(&first.attributes), Some(2012));
        assert_eq!(survey_year_from_flat(&writer.features()[1].attributes), None);
    }

    #[test]
    fn test_rejected_record_does_not_stop_lenient_export() {
        let map = map(BuildOptions::lenient());
        let mut writer = MemoryWriter::single_kind(ElementKind::Polygon);
        let report = map.export(&mut writer).unwrap();

        assert_eq!(report.status(), ExportStatus::PartialSuccess);
        assert_eq!(report.written, vec![ElementId::from(1), ElementId::from(3)]);
        assert_eq!(report.failed_ids(), vec![&ElementId::from(2)]);
        assert!(report.failed[0].reason.contains("LineString"));
    }

    #[test]
    fn test_strict_export_stops_at_first_failure() {
        let map = map(BuildOptions::default());
        let mut writer = MemoryWriter::single_kind(ElementKind::Polygon);
        let report = map.export(&mut writer).unwrap();

        assert_eq!(report.written, vec![ElementId::from(1)]);
        assert_eq!(report.failed_ids(), vec![&ElementId::from(2)]);
        assert_eq!(report.skipped, vec![ElementId::from(3)]);
    }

    #[test]
    fn test_export_fails_when_nothing_written() {
        let map = map(BuildOptions::lenient()).lines();
        let mut writer = MemoryWriter::single_kind(ElementKind::Polygon);
        let err = map.export(&mut writer).unwrap_err();

        assert_eq!(err.report.status(), ExportStatus::Failed);
        assert!(err.to_string().contains("element 2"));
    }

    #[test]
    fn test_empty_selection_exports_nothing() {
        let map = map(BuildOptions::default()).select(|_| false);
        let report = map.export(&mut MemoryWriter::new()).unwrap();
        assert!(report.written.is_empty());
        assert_eq!(report.status(), ExportStatus::Success);
    }

    struct ClosedWriter;

    impl FeatureWriter for ClosedWriter {
        fn begin(&mut self, _crs: Crs) -> Result<(), WriteRejection> {
            Err(WriteRejection::new("read-only container"))
        }

        fn write(
            &mut self,
            _id: &ElementId,
            _geometry: &Geometry,
            _attributes: &FlatAttributes,
        ) -> Result<(), WriteRejection> {
            Ok(())
        }
    }

    #[test]
    fn test_writer_refusing_container() {
        let map = map(BuildOptions::default());
        let err = map.export(&mut ClosedWriter).unwrap_err();
        assert_eq!(err.report.aborted.as_deref(), Some("read-only container"));
        assert_eq!(err.report.skipped.len(), 3);
        assert!(err.to_string().contains("read-only container"));
    }

    #[test]
    fn test_export_through_trait_object() {
        let map = map(BuildOptions::default());
        let mut writer = MemoryWriter::new();
        let dyn_writer: &mut dyn FeatureWriter = &mut writer;
        assert_eq!(map.export(dyn_writer).unwrap().written.len(), 3);
    }
}
