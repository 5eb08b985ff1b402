use super::ModeDefinition;
use serde_json::json;

pub fn definition() -> ModeDefinition {
    ModeDefinition {
        id: "event",
        label: "Event",
        description: "Calendar event details with date/time, location, attendees, and reminders.",
        route: "calendar",
        system: "You fill the JSON schema exactly. Do not add extra keys.",
        user_hint: "Extract a calendar event. Use null for unknown date/time/timezone/location/duration. \
                    Use empty arrays if unknown.",
        data_schema: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "title": { "type": "string" },
                "date": { "type": ["string", "null"] },
                "time": { "type": ["string", "null"] },
                "timezone": { "type": ["string", "null"] },
                "location": { "type": ["string", "null"] },
                "attendees": { "type": "array", "items": { "type": "string" } },
                "duration_minutes": { "type": ["number", "null"] },
                "description": { "type": "string" },
                "reminders": { "type": "array", "items": { "type": "string" } }
            },
            "required": [
                "title",
                "date",
                "time",
                "timezone",
                "location",
                "attendees",
                "duration_minutes",
                "description",
                "reminders"
            ]
        }),
    }
}
