//! # vegmap-cli
//!
//! Lecture de cartes de végétation (GeoJSON + table JSON), contrôle de la
//! jointure, export GeoJSON et comparaison de campagnes.
//!
//! ## Features
//!
//! - Lecteurs GeoJSON (géométries) et JSON (table de végétation, légende)
//! - Écrivain GeoJSON en streaming (geozero)
//! - Rapport d'exécution affichable ou sauvegardé en JSON
//!
//! ## Usage CLI
//!
//! ```bash
//! # Contrôle d'une campagne
//! vegmap check -g vlakken_2008.geojson -a vegetatie_2008.json -l sbb.json
//!
//! # Export d'une sélection
//! vegmap export -g vlakken_2008.geojson -a vegetatie_2008.json -l sbb.json \
//!     --prefix 11 -o heide_2008.geojson
//!
//! # Transitions entre deux campagnes
//! vegmap compare --earlier-geometries vlakken_2008.geojson --earlier-attributes vegetatie_2008.json \
//!     --later-geometries vlakken_2020.geojson --later-attributes vegetatie_2020.json \
//!     -l sbb.json --level main-type -o transitions.json
//! ```

pub mod config;
pub mod export;
pub mod read;
pub mod report;

pub use config::Config;
pub use export::GeoJsonFeatureWriter;
pub use read::{read_attributes, read_exported, read_geometries, read_legend};
pub use report::{RunReport, RunStatus, TransitionTable};
