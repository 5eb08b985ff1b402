use super::ModeDefinition;
use serde_json::json;

pub fn definition() -> ModeDefinition {
    ModeDefinition {
        id: "note",
        label: "Note",
        description: "Structured notes with summary, bullets, and action items.",
        route: "notes",
        system: "Be concrete and concise. Do not invent details. \
                 If unknown, use empty string for required strings and empty arrays for lists.",
        user_hint: "Create a clear summary plus bullets (3-7). Actions should be imperative. \
                    Unknown: empty arrays for actions/decisions/questions, empty string for title/summary.",
        data_schema: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "title": { "type": "string" },
                "summary": { "type": "string" },
                "bullets": { "type": "array", "items": { "type": "string" } },
                "action_items": { "type": "array", "items": { "type": "string" } },
                "decisions": { "type": "array", "items": { "type": "string" } },
                "questions": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["title", "summary", "bullets", "action_items", "decisions", "questions"]
        }),
    }
}
