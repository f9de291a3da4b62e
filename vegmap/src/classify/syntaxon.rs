//! Niveaux syntaxonomiques des codes du catalogue Staatsbosbeheer
//!
//! Un code valide désigne une classe (`11`), une alliance (`11A`), une
//! association (`11A1`), une sous-association (`11A1a`), ou une communauté
//! tronc/dérivée d'une classe (`11-a`, `11/a`) ou d'une alliance (`11A-a`,
//! `11A/a`).

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Niveau syntaxonomique d'un code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyntaxonLevel {
    Class,
    ClassTrunk,
    ClassDerivative,
    Alliance,
    AllianceTrunk,
    AllianceDerivative,
    Association,
    Subassociation,
}

impl SyntaxonLevel {
    /// Tous les niveaux, du plus général au plus précis
    pub const ALL: [SyntaxonLevel; 8] = [
        SyntaxonLevel::Class,
        SyntaxonLevel::ClassTrunk,
        SyntaxonLevel::ClassDerivative,
        SyntaxonLevel::Alliance,
        SyntaxonLevel::AllianceTrunk,
        SyntaxonLevel::AllianceDerivative,
        SyntaxonLevel::Association,
        SyntaxonLevel::Subassociation,
    ];

    fn pattern(&self) -> &'static str {
        match self {
            SyntaxonLevel::Class => r"^[0-9][0-9]$",
            SyntaxonLevel::ClassTrunk => r"^[0-9]+-[a-z]$",
            SyntaxonLevel::ClassDerivative => r"^[0-9]+/[a-z]$",
            SyntaxonLevel::Alliance => r"^[0-9]+[A-Z]$",
            SyntaxonLevel::AllianceTrunk => r"^[0-9]+[A-Z]-[a-z]$",
            SyntaxonLevel::AllianceDerivative => r"^[0-9]+[A-Z]/[a-z]$",
            SyntaxonLevel::Association => r"^[0-9]+[A-Z][0-9]+$",
            SyntaxonLevel::Subassociation => r"^[0-9]+[A-Z][0-9]+[a-z]$",
        }
    }
}

fn patterns() -> &'static [(SyntaxonLevel, Regex)] {
    static PATTERNS: OnceLock<Vec<(SyntaxonLevel, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SyntaxonLevel::ALL
            .iter()
            .filter_map(|level| Regex::new(level.pattern()).ok().map(|re| (*level, re)))
            .collect()
    })
}

/// Niveau syntaxonomique d'un code, `None` si le code n'est pas reconnu
pub fn level(code: &str) -> Option<SyntaxonLevel> {
    patterns()
        .iter()
        .find(|(_, re)| re.is_match(code))
        .map(|(level, _)| *level)
}

/// Classe d'un code reconnu (ses deux premiers caractères)
///
/// Les classes sont numérotées sur deux chiffres ("08", "14"). Un code
/// abrégé sur un seul chiffre comme "1A" est reconnu comme alliance mais
/// sa classe vaut alors "1A": écrire "01A" pour obtenir "01".
pub fn class(code: &str) -> Option<&str> {
    level(code)?;
    code.get(..2)
}
