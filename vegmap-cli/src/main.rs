//! Point d'entrée CLI pour vegmap

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::{CampaignArgs, Commands};
use vegmap_cli::Config;

/// Contrôler, exporter et comparer des cartes de végétation
#[derive(Parser)]
#[command(name = "vegmap")]
#[command(author, version)]
#[command(about = "Contrôler, exporter et comparer des campagnes de cartographie de la végétation")]
#[command(long_about = "Jointure des géométries de terrain et de la table de végétation, contrôle d'intégrité, export GeoJSON et matrice de transition entre deux campagnes.\n\nLe fichier de configuration peut aussi être désigné par la variable VEGMAP_CONFIG.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Fichier de configuration JSON (colonnes, ElmID, CRS, options)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Configurer le logging
    init_logging(cli.verbose, cli.quiet);

    let config = Config::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Check {
            campaign,
            legend,
            report,
        } => {
            info!(geometries = %campaign.geometries.display(), "Checking campaign");
            cli::cmd_check(&config, &campaign, &legend, report.as_deref())?;
        }
        Commands::Export {
            campaign,
            legend,
            output,
            code,
            prefix,
            bbox,
            predicate,
            report,
        } => {
            info!(geometries = %campaign.geometries.display(), output = %output.display(), "Exporting to GeoJSON");
            cli::cmd_export(
                &config,
                &campaign,
                &legend,
                &output,
                code,
                prefix,
                bbox.as_deref(),
                predicate,
                report.as_deref(),
            )?;
        }
        Commands::Compare {
            earlier_geometries,
            earlier_attributes,
            later_geometries,
            later_attributes,
            legend,
            level,
            grid,
            sequential,
            lenient,
            output,
            records,
        } => {
            let earlier = CampaignArgs {
                geometries: earlier_geometries,
                attributes: earlier_attributes,
                lenient,
            };
            let later = CampaignArgs {
                geometries: later_geometries,
                attributes: later_attributes,
                lenient,
            };
            info!(
                earlier = %earlier.geometries.display(),
                later = %later.geometries.display(),
                "Comparing campaigns"
            );
            cli::cmd_compare(
                &config,
                &earlier,
                &later,
                &legend,
                level,
                grid,
                sequential,
                output.as_deref(),
                records.as_deref(),
            )?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
