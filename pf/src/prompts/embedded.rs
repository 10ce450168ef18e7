//! Embedded prompts
//!
//! Compiled into the binary from the `.pmt` files under `pf/prompts/`.

use tracing::debug;

pub const CLARIFY: &str = include_str!("../../prompts/clarify.pmt");
pub const CLARIFY_SYSTEM: &str = include_str!("../../prompts/clarify-system.pmt");
pub const ARCHITECTURE: &str = include_str!("../../prompts/architecture.pmt");
pub const ARCHITECTURE_SYSTEM: &str = include_str!("../../prompts/architecture-system.pmt");
pub const DATABASE: &str = include_str!("../../prompts/database.pmt");
pub const DATABASE_SYSTEM: &str = include_str!("../../prompts/database-system.pmt");
pub const API: &str = include_str!("../../prompts/api.pmt");
pub const API_SYSTEM: &str = include_str!("../../prompts/api-system.pmt");
pub const BLUEPRINT: &str = include_str!("../../prompts/blueprint.pmt");
pub const BLUEPRINT_SYSTEM: &str = include_str!("../../prompts/blueprint-system.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let found = match name {
        "clarify" => Some(CLARIFY),
        "clarify-system" => Some(CLARIFY_SYSTEM),
        "architecture" => Some(ARCHITECTURE),
        "architecture-system" => Some(ARCHITECTURE_SYSTEM),
        "database" => Some(DATABASE),
        "database-system" => Some(DATABASE_SYSTEM),
        "api" => Some(API),
        "api-system" => Some(API_SYSTEM),
        "blueprint" => Some(BLUEPRINT),
        "blueprint-system" => Some(BLUEPRINT_SYSTEM),
        _ => None,
    };
    if found.is_none() {
        debug!(%name, "get_embedded: no match found");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageKind;

    #[test]
    fn test_every_stage_has_both_templates() {
        for stage in StageKind::ALL {
            assert!(get_embedded(stage.name()).is_some(), "missing {stage}");
            assert!(get_embedded(&format!("{}-system", stage.name())).is_some(), "missing {stage}-system");
        }
    }

    #[test]
    fn test_structured_stages_ask_for_json() {
        assert!(CLARIFY_SYSTEM.contains("JSON array"));
        assert!(BLUEPRINT_SYSTEM.contains("\"phases\""));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("deploy").is_none());
    }
}
