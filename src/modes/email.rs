use super::ModeDefinition;
use serde_json::json;

pub fn definition() -> ModeDefinition {
    ModeDefinition {
        id: "email",
        label: "Email",
        description: "Email draft with subject, body, recipients, and intent.",
        route: "email",
        system: "Be concrete and concise. Do not invent recipients. \
                 If unknown, use empty string for required strings and empty arrays for recipients.",
        user_hint: "Draft a clear email. Subject short; body 4-8 sentences. \
                    Unknown: empty arrays for to/cc/bcc, empty string for subject/body/intent/tone.",
        data_schema: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "subject": { "type": "string" },
                "body": { "type": "string" },
                "to": { "type": "array", "items": { "type": "string" } },
                "cc": { "type": "array", "items": { "type": "string" } },
                "bcc": { "type": "array", "items": { "type": "string" } },
                "intent": { "type": "string" },
                "tone": { "type": "string" }
            },
            "required": ["subject", "body", "to", "cc", "bcc", "intent", "tone"]
        }),
    }
}
