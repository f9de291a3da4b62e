//! Tests d'intégration: jointure, export et comparaison de deux campagnes

use std::sync::Arc;

use geo::{Geometry, LineString, Polygon};
use vegmap::{
    records_from_flat, BuildOptions, ChangeKind, CompareOptions, Crs, ElementId, ExportStatus,
    IssueKind, Legend, LegendEntry, MapData, MemoryAttributeSource, MemoryGeometrySource,
    MemoryWriter, TemporalComparator, TypeFilter, TypeKey, VegetationRecord, VegmapError,
};

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
    Geometry::Polygon(Polygon::new(
        LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]),
        vec![],
    ))
}

fn legend() -> Arc<Legend> {
    Arc::new(Legend::new(
        "SBB-2020",
        vec![
            (
                "A".to_string(),
                LegendEntry {
                    main_type: "heide".to_string(),
                    name: Some("Droge heide".to_string()),
                    ..Default::default()
                },
            ),
            (
                "B".to_string(),
                LegendEntry {
                    main_type: "bos".to_string(),
                    name: Some("Berkenbos".to_string()),
                    ..Default::default()
                },
            ),
        ],
    ))
}

#[test]
fn test_split_polygon_between_campaigns() {
    // Campagne 1: élément 1, carré de 100, type A
    let mut geometries = MemoryGeometrySource::new(Crs::default());
    geometries.insert(1, rect(0.0, 0.0, 10.0, 10.0)).unwrap();
    let attributes = MemoryAttributeSource::from_rows(vec![(1, VegetationRecord::new("A"))]);
    let earlier =
        MapData::from_sources(geometries, attributes, legend(), BuildOptions::default()).unwrap();

    // Campagne 2: élément 10 (60, type B) recouvre 60 de l'élément 1,
    // élément 11 (50, type A) en recouvre 40 et déborde de 10
    let mut geometries = MemoryGeometrySource::new(Crs::default());
    geometries.insert(10, rect(0.0, 0.0, 6.0, 10.0)).unwrap();
    geometries.insert(11, rect(6.0, 0.0, 11.0, 10.0)).unwrap();
    let attributes = MemoryAttributeSource::from_rows(vec![
        (10, VegetationRecord::new("B")),
        (11, VegetationRecord::new("A")),
    ]);
    let later =
        MapData::from_sources(geometries, attributes, legend(), BuildOptions::default()).unwrap();

    let comparison = TemporalComparator::new(&earlier, &later, CompareOptions::default())
        .unwrap()
        .compute()
        .unwrap();

    for record in &comparison.records {
        println!(
            "{:?}: {:?} -> {:?} ({:.1})",
            record.kind, record.earlier, record.later, record.area
        );
    }

    let transitions: Vec<_> = comparison
        .records
        .iter()
        .filter(|r| r.kind == ChangeKind::Transition)
        .collect();
    assert_eq!(transitions.len(), 2, "Each overlapping pair is reported");
    assert_eq!(transitions[0].later, Some(ElementId::from(10)));
    assert!((transitions[0].area - 60.0).abs() < 1e-6);
    assert_eq!(transitions[1].later, Some(ElementId::from(11)));
    assert!((transitions[1].area - 40.0).abs() < 1e-6);

    let a_to_b = comparison.transitions[&(TypeKey::from("A"), TypeKey::from("B"))];
    let a_to_a = comparison.transitions[&(TypeKey::from("A"), TypeKey::from("A"))];
    assert!((a_to_b - 60.0).abs() < 1e-6);
    assert!((a_to_a - 40.0).abs() < 1e-6);

    assert!(comparison.disappeared_area() < 1e-6, "Element 1 is fully covered");
    assert!(
        (comparison.appeared_area() - 10.0).abs() < 1e-6,
        "The part of element 11 outside element 1 has appeared"
    );
}

#[test]
fn test_orphan_attribute_strict_and_lenient() {
    let build = |options: BuildOptions| {
        let mut geometries = MemoryGeometrySource::new(Crs::default());
        geometries.insert(1, rect(0.0, 0.0, 10.0, 10.0)).unwrap();
        let attributes = MemoryAttributeSource::from_rows(vec![
            (1, VegetationRecord::new("A")),
            (5, VegetationRecord::new("B")),
        ]);
        MapData::from_sources(geometries, attributes, legend(), options)
    };

    let err = build(BuildOptions::default()).unwrap_err();
    println!("{}", err);
    assert_eq!(err.element_ids(), vec![&ElementId::from(5)]);
    assert!(err.to_string().contains("element 5"));
    assert_eq!(err.partial.len(), 1, "Partial map keeps joinable elements");

    let map = build(BuildOptions::lenient()).unwrap();
    assert_eq!(map.report().warnings().count(), 1);
    assert_eq!(map.report().issues[0].kind, IssueKind::OrphanAttribute);

    // L'erreur se propage comme VegmapError
    let as_vegmap: Result<MapData, VegmapError> =
        build(BuildOptions::default()).map_err(VegmapError::from);
    assert!(matches!(as_vegmap, Err(VegmapError::Join(_))));
}

#[test]
fn test_proportions_over_hundred() {
    let mut geometries = MemoryGeometrySource::new(Crs::default());
    geometries.insert(1, rect(0.0, 0.0, 10.0, 10.0)).unwrap();
    let attributes = MemoryAttributeSource::from_rows(vec![
        (1, VegetationRecord::new("A").with_proportion(40.0)),
        (1, VegetationRecord::new("B").with_proportion(40.0)),
        (1, VegetationRecord::new("A").with_proportion(30.0)),
    ]);

    let err = MapData::from_sources(geometries, attributes, legend(), BuildOptions::lenient())
        .unwrap_err();
    assert!(err
        .report
        .errors()
        .any(|issue| matches!(issue.kind, IssueKind::ProportionSum { .. })));
    assert!(err.to_string().contains("110"));
}

#[test]
fn test_export_and_reread() {
    let mut geometries = MemoryGeometrySource::new(Crs::default());
    geometries.insert(1, rect(0.0, 0.0, 10.0, 10.0)).unwrap();
    geometries.insert("A7", rect(10.0, 0.0, 20.0, 10.0)).unwrap();
    let mut attributes = MemoryAttributeSource::from_rows(vec![
        (ElementId::from(1), VegetationRecord::new("A").with_proportion(70.0)),
        (ElementId::from(1), VegetationRecord::new("B").with_proportion(30.0)),
        (ElementId::from("A7"), VegetationRecord::new("B")),
    ]);
    attributes.set_survey_year(1, 2009);
    let map =
        MapData::from_sources(geometries, attributes, legend(), BuildOptions::default()).unwrap();

    let mut writer = MemoryWriter::new();
    let report = map.export(&mut writer).unwrap();
    assert_eq!(report.status(), ExportStatus::Success);

    for feature in writer.features() {
        let codes: Vec<String> = records_from_flat(&feature.attributes)
            .into_iter()
            .map(|r| r.type_code)
            .collect();
        let expected: Vec<String> = map
            .element(&feature.id)
            .unwrap()
            .records()
            .iter()
            .map(|r| r.type_code.clone())
            .collect();
        assert_eq!(codes, expected, "Codes of element {} survive export", feature.id);
    }

    // Relecture complète: la carte reconstruite a les mêmes éléments
    let (geometries, attributes) = writer.into_sources().unwrap();
    let reread =
        MapData::from_sources(geometries, attributes, legend(), BuildOptions::default()).unwrap();
    assert_eq!(reread.element_ids(), map.element_ids());
    assert_eq!(reread.campaign_label(), "2009");
    assert_eq!(
        reread.area_by_type().unwrap(),
        map.area_by_type().unwrap()
    );
}

#[test]
fn test_query_then_export_subset() {
    let mut geometries = MemoryGeometrySource::new(Crs::default());
    let mut attributes = MemoryAttributeSource::new();
    for i in 0..10i64 {
        let x = i as f64 * 10.0;
        geometries.insert(i, rect(x, 0.0, x + 10.0, 10.0)).unwrap();
        attributes.push_record(i, VegetationRecord::new(if i < 5 { "A" } else { "B" }));
    }
    let map =
        MapData::from_sources(geometries, attributes, legend(), BuildOptions::default()).unwrap();

    let subset = map
        .filter_by_type(&TypeFilter::Code("B".to_string()))
        .filter_by_spatial(&rect(55.0, 2.0, 75.0, 8.0), vegmap::SpatialPredicate::Intersects);
    assert_eq!(
        subset.element_ids(),
        vec![&ElementId::from(5), &ElementId::from(6), &ElementId::from(7)]
    );

    let mut writer = MemoryWriter::new();
    let report = subset.export(&mut writer).unwrap();
    assert_eq!(report.written.len(), 3);
    assert_eq!(map.len(), 10, "Filtering never alters the source map");
}

#[test]
fn test_shared_classifier_cache_across_campaigns() {
    let legend = legend();
    let cache = Arc::new(vegmap::ClassificationCache::new());

    let build = |offset: i64| {
        let mut geometries = MemoryGeometrySource::new(Crs::default());
        geometries.insert(offset, rect(0.0, 0.0, 10.0, 10.0)).unwrap();
        let attributes =
            MemoryAttributeSource::from_rows(vec![(offset, VegetationRecord::new("A"))]);
        MapData::build_with_classifier(
            Arc::new(geometries),
            Arc::new(attributes),
            vegmap::VegetationClassifier::with_cache(legend.clone(), cache.clone()),
            BuildOptions::default(),
        )
        .unwrap()
    };

    let first = build(1);
    let second = build(2);
    let a = first.classification(&ElementId::from(1)).unwrap();
    let b = second.classification(&ElementId::from(2)).unwrap();
    assert!(Arc::ptr_eq(&a[0], &b[0]), "Same legend shares cached descriptions");
    assert_eq!(cache.len_for(legend.id()), 1);
}
