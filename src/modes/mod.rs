//! Structured-output mode catalog.
//!
//! Each mode pairs a JSON Schema for its `data` payload with the prompt
//! fragments the enrichment pipeline feeds the model. Definitions live one
//! per file and register here in order; the first registered mode is the
//! fallback for unknown identifiers.

mod email;
mod event;
mod note;
mod ticket;

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;

/// Mode identifier that triggers model-driven mode selection.
pub const AUTO_MODE: &str = "auto";

#[derive(Debug, Clone)]
pub struct ModeDefinition {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub route: &'static str,
    pub system: &'static str,
    pub user_hint: &'static str,
    pub data_schema: Value,
}

#[derive(Serialize, Debug, Clone)]
pub struct ModeSummary {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub route: &'static str,
}

static MODES: Lazy<Vec<ModeDefinition>> = Lazy::new(|| {
    vec![
        note::definition(),
        email::definition(),
        event::definition(),
        ticket::definition(),
    ]
});

/// Look up a mode by id, falling back to the first registered mode.
pub fn resolve_mode(id: &str) -> &'static ModeDefinition {
    MODES
        .iter()
        .find(|mode| mode.id == id)
        .unwrap_or_else(|| &MODES[0])
}

pub fn first_mode() -> &'static ModeDefinition {
    &MODES[0]
}

pub fn list_modes() -> Vec<ModeSummary> {
    MODES
        .iter()
        .map(|mode| ModeSummary {
            id: mode.id,
            label: mode.label,
            description: mode.description,
            route: mode.route,
        })
        .collect()
}

pub fn mode_ids() -> Vec<&'static str> {
    MODES.iter().map(|mode| mode.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_modes_in_order() {
        let ids = mode_ids();
        assert_eq!(ids, vec!["note", "email", "event", "ticket"]);
    }

    #[test]
    fn unknown_id_falls_back_to_first_mode() {
        assert_eq!(resolve_mode("note").id, "note");
        assert_eq!(resolve_mode("shopping-list").id, "note");
    }

    #[test]
    fn every_data_schema_is_a_closed_object() {
        for summary in list_modes() {
            let mode = resolve_mode(summary.id);
            let schema = &mode.data_schema;
            assert_eq!(schema["type"], "object", "{}", mode.id);
            assert_eq!(schema["additionalProperties"], false, "{}", mode.id);
            let required = schema["required"].as_array().unwrap();
            let properties = schema["properties"].as_object().unwrap();
            assert_eq!(required.len(), properties.len(), "{}", mode.id);
        }
    }

    #[test]
    fn summaries_expose_routes() {
        let modes = list_modes();
        assert_eq!(modes[0].route, "notes");
        assert!(modes.iter().all(|m| !m.description.is_empty()));
    }
}
