use crate::entity::{Echelon, EntityType};

/// Maps an entity type to the symbol code used to draw it on a map.
pub trait SymbolCoder: Send + Sync {
    fn sidc(&self, entity_type: &EntityType) -> Option<String>;
}

/// Fifteen character MIL-STD-2525 style codes with an unknown affiliation.
///
/// Affiliation is left to the viewer, which colours symbols by force id.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchelonSymbolCoder;

impl EchelonSymbolCoder {
    fn echelon_code(echelon: Option<Echelon>) -> char {
        match echelon {
            None => '-',
            Some(Echelon::FireTeam) => 'A',
            Some(Echelon::Squad) => 'B',
            Some(Echelon::Section) => 'C',
            Some(Echelon::Platoon) => 'D',
            Some(Echelon::Company) => 'E',
            Some(Echelon::Battalion) => 'F',
            Some(Echelon::Regiment) => 'G',
            Some(Echelon::Brigade) => 'H',
            Some(Echelon::Division) => 'I',
            Some(Echelon::Corps) => 'J',
            Some(Echelon::Army) => 'K',
        }
    }
}

impl SymbolCoder for EchelonSymbolCoder {
    fn sidc(&self, entity_type: &EntityType) -> Option<String> {
        // Battle dimension and function id
        let (dimension, function) = match (entity_type.kind, entity_type.domain) {
            (EntityType::KIND_LIFEFORM, _) => ('G', "UCI---"),
            (EntityType::KIND_PLATFORM, EntityType::DOMAIN_LAND) => ('G', "UCA---"),
            (EntityType::KIND_PLATFORM, EntityType::DOMAIN_AIR) => ('A', "MF----"),
            (EntityType::KIND_PLATFORM, EntityType::DOMAIN_SURFACE) => ('S', "CL----"),
            _ => return None,
        };

        Some(format!(
            "SU{}P{}-{}---",
            dimension,
            function,
            Self::echelon_code(entity_type.echelon)
        ))
    }
}
