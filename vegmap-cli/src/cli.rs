//! Définition et implémentation des commandes CLI
//!
//! - `check`: jointure d'une campagne et rapport d'intégrité
//! - `export`: jointure, filtres éventuels et export GeoJSON
//! - `compare`: transitions de végétation entre deux campagnes

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use geo::{Geometry, Rect};
use tracing::info;
use vegmap::{
    ClassificationCache, GridSampler, Legend, MapData, SpatialPredicate, TemporalComparator,
    TypeFilter, TypeLevel, VegetationClassifier,
};

use vegmap_cli::{
    read_attributes, read_geometries, read_legend, Config, GeoJsonFeatureWriter, RunReport,
    TransitionTable,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Join a campaign and report integrity issues
    Check {
        #[command(flatten)]
        campaign: CampaignArgs,

        /// Legend JSON file
        #[arg(short, long)]
        legend: PathBuf,

        /// Save the report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Join a campaign and export it to GeoJSON
    Export {
        #[command(flatten)]
        campaign: CampaignArgs,

        /// Legend JSON file
        #[arg(short, long)]
        legend: PathBuf,

        /// Output GeoJSON file
        #[arg(short, long)]
        output: PathBuf,

        /// Keep elements with this vegetation code
        #[arg(long)]
        code: Option<String>,

        /// Keep elements with a code starting with this prefix
        #[arg(long, conflicts_with = "code")]
        prefix: Option<String>,

        /// Keep elements matching a bounding box: minx,miny,maxx,maxy
        #[arg(long)]
        bbox: Option<String>,

        /// Spatial predicate used with --bbox
        #[arg(long, value_enum, default_value_t = PredicateArg::Intersects)]
        predicate: PredicateArg,

        /// Save the report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Compare two campaigns and report vegetation transitions
    Compare {
        /// Earlier campaign geometries (GeoJSON)
        #[arg(long)]
        earlier_geometries: PathBuf,

        /// Earlier campaign vegetation table (JSON rows)
        #[arg(long)]
        earlier_attributes: PathBuf,

        /// Later campaign geometries (GeoJSON)
        #[arg(long)]
        later_geometries: PathBuf,

        /// Later campaign vegetation table (JSON rows)
        #[arg(long)]
        later_attributes: PathBuf,

        /// Legend JSON file shared by both campaigns
        #[arg(short, long)]
        legend: PathBuf,

        /// Grouping level of the transitions
        #[arg(long, value_enum)]
        level: Option<LevelArg>,

        /// Also count transitions on a regular grid with this step
        #[arg(long)]
        grid: Option<f64>,

        /// Run on a single thread
        #[arg(long)]
        sequential: bool,

        /// Report orphan classifications as warnings instead of errors
        #[arg(long)]
        lenient: bool,

        /// Save the transition table as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Save every change record as JSON
        #[arg(long)]
        records: Option<PathBuf>,
    },
}

/// Fichiers d'une campagne
#[derive(Args)]
pub struct CampaignArgs {
    /// Geometries (GeoJSON FeatureCollection)
    #[arg(short, long)]
    pub geometries: PathBuf,

    /// Vegetation table (JSON rows)
    #[arg(short, long)]
    pub attributes: PathBuf,

    /// Report orphan classifications as warnings instead of errors
    #[arg(long)]
    pub lenient: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PredicateArg {
    Intersects,
    Within,
    Contains,
}

impl From<PredicateArg> for SpatialPredicate {
    fn from(arg: PredicateArg) -> Self {
        match arg {
            PredicateArg::Intersects => SpatialPredicate::Intersects,
            PredicateArg::Within => SpatialPredicate::Within,
            PredicateArg::Contains => SpatialPredicate::Contains,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LevelArg {
    Code,
    MainType,
    SubType,
    QualityClass,
    SyntaxonClass,
}

impl From<LevelArg> for TypeLevel {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::Code => TypeLevel::Code,
            LevelArg::MainType => TypeLevel::MainType,
            LevelArg::SubType => TypeLevel::SubType,
            LevelArg::QualityClass => TypeLevel::QualityClass,
            LevelArg::SyntaxonClass => TypeLevel::SyntaxonClass,
        }
    }
}

/// Exécute la commande check
pub fn cmd_check(
    config: &Config,
    campaign: &CampaignArgs,
    legend: &Path,
    report_path: Option<&Path>,
) -> Result<()> {
    let started_at = Instant::now();
    let legend = Arc::new(read_legend(legend)?);
    let cache = Arc::new(ClassificationCache::new());

    let (map, mut report) = load_campaign(config, campaign, &legend, &cache)?;
    if let Some(map) = &map {
        report.record_areas(&map.area_by_type()?);
    }
    report.set_duration(started_at.elapsed());
    report.finalize();
    report.display();

    if let Some(path) = report_path {
        report
            .save_to_file(path)
            .context(format!("Failed to save report: {}", path.display()))?;
    }
    if map.is_none() {
        bail!("Join failed: {}", report.summary());
    }
    Ok(())
}

/// Exécute la commande export
#[allow(clippy::too_many_arguments)]
pub fn cmd_export(
    config: &Config,
    campaign: &CampaignArgs,
    legend: &Path,
    output: &Path,
    code: Option<String>,
    prefix: Option<String>,
    bbox: Option<&str>,
    predicate: PredicateArg,
    report_path: Option<&Path>,
) -> Result<()> {
    let started_at = Instant::now();
    let legend = Arc::new(read_legend(legend)?);
    let cache = Arc::new(ClassificationCache::new());

    let (map, mut report) = load_campaign(config, campaign, &legend, &cache)?;
    let Some(map) = map else {
        report.finalize();
        report.display();
        bail!("Join failed, nothing exported: {}", report.summary());
    };

    let mut selection = map.clone();
    if let Some(code) = code {
        selection = selection.filter_by_type(&TypeFilter::Code(code));
    } else if let Some(prefix) = prefix {
        selection = selection.filter_by_type(&TypeFilter::Prefix(prefix));
    }
    if let Some(bbox) = bbox {
        let area = parse_bbox(bbox)?;
        selection = selection.filter_by_spatial(&area, predicate.into());
    }
    info!(
        selected = selection.len(),
        total = map.len(),
        output = %output.display(),
        "Exporting selection"
    );

    let mut writer = GeoJsonFeatureWriter::create(output)?;
    let outcome = selection.export(&mut writer);
    match &outcome {
        Ok(export) => report.record_export(export),
        Err(err) => report.record_export(&err.report),
    }
    report.record_areas(&selection.area_by_type()?);
    report.set_duration(started_at.elapsed());
    report.finalize();
    report.display();

    if let Some(path) = report_path {
        report
            .save_to_file(path)
            .context(format!("Failed to save report: {}", path.display()))?;
    }
    outcome.context(format!("Export to {} failed", output.display()))?;
    Ok(())
}

/// Exécute la commande compare
#[allow(clippy::too_many_arguments)]
pub fn cmd_compare(
    config: &Config,
    earlier: &CampaignArgs,
    later: &CampaignArgs,
    legend: &Path,
    level: Option<LevelArg>,
    grid: Option<f64>,
    sequential: bool,
    output: Option<&Path>,
    records: Option<&Path>,
) -> Result<()> {
    let started_at = Instant::now();
    let legend = Arc::new(read_legend(legend)?);
    // Un seul cache pour les deux campagnes: la légende est commune
    let cache = Arc::new(ClassificationCache::new());

    let mut maps = Vec::with_capacity(2);
    for campaign in [earlier, later] {
        let (map, mut report) = load_campaign(config, campaign, &legend, &cache)?;
        report.finalize();
        let Some(map) = map else {
            report.display();
            bail!("Join failed: {}", report.summary());
        };
        println!("{}", report.summary());
        maps.push(map);
    }
    let (earlier_map, later_map) = (&maps[0], &maps[1]);

    let mut options = config.compare;
    if let Some(level) = level {
        options.level = level.into();
    }
    if sequential {
        options.parallel = false;
    }

    let comparison = TemporalComparator::new(earlier_map, later_map, options)?.compute()?;
    let table = TransitionTable::from_comparison(&comparison);
    table.display();

    if let Some(step) = grid {
        let sampler = GridSampler::new(step)?;
        let counts = sampler.sample_transitions(earlier_map, later_map, options.level)?;
        println!("\n--- GRID SAMPLE (step {}) ---", sampler.step());
        for ((from, to), count) in &counts {
            println!("  {} -> {}: {} points", from, to, count);
        }
    }

    if let Some(path) = output {
        table
            .save_to_file(path)
            .context(format!("Failed to save transitions: {}", path.display()))?;
    }
    if let Some(path) = records {
        let json = serde_json::to_string_pretty(&comparison)?;
        std::fs::write(path, json)
            .context(format!("Failed to save change records: {}", path.display()))?;
    }

    info!(
        records = comparison.records.len(),
        duration_ms = started_at.elapsed().as_millis() as u64,
        "Comparison done"
    );
    Ok(())
}

/// Lit et joint une campagne; `None` si la jointure a échoué
fn load_campaign(
    config: &Config,
    campaign: &CampaignArgs,
    legend: &Arc<Legend>,
    cache: &Arc<ClassificationCache>,
) -> Result<(Option<MapData>, RunReport)> {
    let geometries = read_geometries(&campaign.geometries, &config.elmid_field, config.crs)?;
    let attributes = read_attributes(&campaign.attributes, &config.columns)?;

    let mut options = config.build;
    if campaign.lenient {
        options.strict = false;
    }

    let mut report = RunReport::default();
    report.record_geometries(&geometries);
    report.record_attributes(&attributes);

    let classifier = VegetationClassifier::with_cache(legend.clone(), cache.clone());
    match MapData::build_with_classifier(
        Arc::new(geometries.source),
        Arc::new(attributes.source),
        classifier,
        options,
    ) {
        Ok(map) => {
            report.campaign = map.campaign_label();
            report.record_join(map.report());
            Ok((Some(map), report))
        }
        Err(err) => {
            report.campaign = err.partial.campaign_label();
            report.record_join(&err.report);
            Ok((None, report))
        }
    }
}

/// Rectangle `minx,miny,maxx,maxy`
fn parse_bbox(raw: &str) -> Result<Geometry> {
    let values = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .context(format!("Invalid bbox: {}", raw))?;
    let [min_x, min_y, max_x, max_y] = values[..] else {
        bail!("Invalid bbox: {} (expected minx,miny,maxx,maxy)", raw);
    };
    if min_x > max_x || min_y > max_y {
        bail!("Invalid bbox: {} (min greater than max)", raw);
    }
    Ok(Geometry::Polygon(
        Rect::new((min_x, min_y), (max_x, max_y)).to_polygon(),
    ))
}
