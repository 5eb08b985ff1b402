//! Transcript enrichment and follow-up update pipelines.
//!
//! Both pipelines ask for a structured completion constrained to the mode's
//! schema, validate the payload locally, and allow themselves exactly one
//! corrective retry before failing the operation.

use crate::change_log::{build_change_log, ChangeLogEntry};
use crate::modes::{first_mode, list_modes, mode_ids, resolve_mode, AUTO_MODE};
use crate::schema::{envelope_schema, update_schema, validate};
use crate::settings::AppSettings;
use anyhow::{anyhow, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const ENRICH_MODEL: &str = "gpt-4o-mini";
const CLASSIFY_MODEL: &str = "gpt-4o-mini";

const STRICT_JSON_SYSTEM: &str =
    "You are an assistant that must return STRICT JSON that matches the provided schema. \
     Do not add extra keys. Always fill clean_transcript, summary, actions, tags, and data. ";

const UPDATE_SYSTEM: &str = "You are updating existing structured data with a follow-up transcript. \
     Return STRICT JSON matching the provided schema. Update only what changed. \
     Keep unchanged fields the same. \
     Set clean_transcript to the concatenation of the previous clean_transcript and the new \
     transcript separated by a newline. ";

/// One enrichment result. `data` is mode-specific and already validated
/// against the mode's schema by the time a value of this type exists.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunOutput {
    pub clean_transcript: String,
    pub summary: String,
    pub actions: Vec<String>,
    pub tags: Vec<String>,
    pub data: Value,
}

#[derive(Serialize, Debug, Clone)]
pub struct Enriched {
    pub result: RunOutput,
    pub mode: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct Updated {
    pub result: RunOutput,
    pub mode: String,
    pub change_log: Vec<ChangeLogEntry>,
}

#[derive(Serialize, Debug)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    text: TextConstraint<'a>,
}

#[derive(Serialize, Debug)]
struct InputMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct TextConstraint<'a> {
    format: SchemaFormat<'a>,
}

#[derive(Serialize, Debug)]
struct SchemaFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    name: &'a str,
    strict: bool,
    schema: &'a Value,
}

/// Map a transcript into a mode-shaped structured record.
pub async fn enrich_transcript(
    settings: &AppSettings,
    transcript: &str,
    mode_id: &str,
) -> Result<Enriched> {
    let api_key = settings.require_api_key()?.to_string();
    let client = reqwest::Client::new();

    let chosen = if mode_id == AUTO_MODE {
        classify_mode(&client, &api_key, transcript).await
    } else {
        mode_id.to_string()
    };
    let mode = resolve_mode(&chosen);
    let schema = envelope_schema(&mode.data_schema);

    let system = format!("{}{}", STRICT_JSON_SYSTEM, mode.system);
    let user = build_enrich_user_prompt(transcript, mode.id, mode.user_hint);

    let response =
        request_structured(&client, &api_key, ENRICH_MODEL, &system, &user, "enriched_output", &schema)
            .await?;
    match parse_run_output(&response, &schema) {
        Ok(result) => {
            return Ok(Enriched {
                result,
                mode: mode.id.to_string(),
            })
        }
        Err(err) => debug!("Enrichment response failed validation: {}", err),
    }

    let retry_user = build_retry_prompt(&response)?;
    let retry = request_structured(
        &client,
        &api_key,
        ENRICH_MODEL,
        &system,
        &retry_user,
        "enriched_output",
        &schema,
    )
    .await?;
    match parse_run_output(&retry, &schema) {
        Ok(result) => Ok(Enriched {
            result,
            mode: mode.id.to_string(),
        }),
        Err(err) => {
            debug!("Enrichment retry failed validation: {}", err);
            Err(anyhow!("Enrichment JSON did not match schema."))
        }
    }
}

/// Merge a follow-up transcript into a previous structured result. The
/// model's own change log is discarded; the returned one is computed
/// locally from the before/after results.
pub async fn update_with_follow_up(
    settings: &AppSettings,
    transcript: &str,
    mode_id: &str,
    previous: &RunOutput,
) -> Result<Updated> {
    let api_key = settings.require_api_key()?.to_string();
    let client = reqwest::Client::new();

    let mode = if mode_id == AUTO_MODE {
        first_mode()
    } else {
        resolve_mode(mode_id)
    };
    let schema = update_schema(&mode.data_schema);

    let system = format!("{}{}", UPDATE_SYSTEM, mode.system);
    let user = build_update_user_prompt(transcript, mode.id, mode.user_hint, previous)?;

    let response =
        request_structured(&client, &api_key, ENRICH_MODEL, &system, &user, "updated_output", &schema)
            .await?;
    match parse_update_result(&response, &schema) {
        Ok(result) => {
            let change_log = build_change_log(previous, &result);
            return Ok(Updated {
                result,
                mode: mode.id.to_string(),
                change_log,
            });
        }
        Err(err) => debug!("Update response failed validation: {}", err),
    }

    let retry_user = build_retry_prompt(&response)?;
    let retry = request_structured(
        &client,
        &api_key,
        ENRICH_MODEL,
        &system,
        &retry_user,
        "updated_output",
        &schema,
    )
    .await?;
    match parse_update_result(&retry, &schema) {
        Ok(result) => {
            let change_log = build_change_log(previous, &result);
            Ok(Updated {
                result,
                mode: mode.id.to_string(),
                change_log,
            })
        }
        Err(err) => {
            debug!("Update retry failed validation: {}", err);
            Err(anyhow!("Update JSON did not match schema."))
        }
    }
}

fn build_enrich_user_prompt(transcript: &str, mode_id: &str, user_hint: &str) -> String {
    format!(
        "Transcript:\n{}\n\nMode: {}\nInstructions: {}",
        transcript,
        mode_id.to_uppercase(),
        user_hint
    )
}

fn build_update_user_prompt(
    transcript: &str,
    mode_id: &str,
    user_hint: &str,
    previous: &RunOutput,
) -> Result<String> {
    Ok(format!(
        "Previous structured result (JSON):\n{}\n\nNew follow-up transcript:\n{}\n\nMode: {}\nInstructions: {}\n\
         Provide change_log entries with path, before, and after. Use null for unknown values.",
        serde_json::to_string(previous)?,
        transcript,
        mode_id.to_uppercase(),
        user_hint
    ))
}

fn build_retry_prompt(response: &Value) -> Result<String> {
    Ok(format!(
        "Fix the JSON to match the schema exactly. Return only JSON.\n\n{}",
        serde_json::to_string(response)?
    ))
}

async fn request_structured(
    client: &reqwest::Client,
    api_key: &str,
    model: &str,
    system: &str,
    user: &str,
    schema_name: &str,
    schema: &Value,
) -> Result<Value> {
    let request = ResponsesRequest {
        model,
        input: vec![
            InputMessage {
                role: "system",
                content: system,
            },
            InputMessage {
                role: "user",
                content: user,
            },
        ],
        text: TextConstraint {
            format: SchemaFormat {
                kind: "json_schema",
                name: schema_name,
                strict: true,
                schema,
            },
        },
    };

    debug!("Requesting structured completion '{}' from {}", schema_name, model);
    let response = client
        .post(RESPONSES_URL)
        .header("Authorization", format!("Bearer {}", api_key))
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(anyhow!("OpenAI error {}: {}", status.as_u16(), error_text));
    }

    Ok(response.json().await?)
}

/// Pick the chosen mode id for an "auto" run. Any failure falls back to the
/// first registered mode.
async fn classify_mode(client: &reqwest::Client, api_key: &str, transcript: &str) -> String {
    let fallback = first_mode().id.to_string();
    let ids = mode_ids();
    let descriptions = list_modes()
        .iter()
        .map(|mode| format!("{}: {}", mode.id, mode.description))
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "Choose the best mode id for the transcript. Return JSON only.\nAvailable modes:\n{}",
        descriptions
    );
    let user = format!("Transcript:\n{}\n\nReturn the best mode id.", transcript);
    let schema = json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "mode": { "type": "string", "enum": ids.clone() }
        },
        "required": ["mode"]
    });

    let response =
        match request_structured(client, api_key, CLASSIFY_MODEL, &system, &user, "mode_select", &schema)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!("Mode classification failed: {}", err);
                return fallback;
            }
        };

    match extract_json_payload(&response) {
        Ok(payload) => match payload.get("mode").and_then(Value::as_str) {
            Some(mode) if ids.iter().any(|id| *id == mode) => mode.to_string(),
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Pull the JSON payload out of a Responses API envelope. The shape varies
/// across service versions; unknown shapes fall back to the raw response.
fn extract_json_payload(response: &Value) -> Result<Value> {
    if let Some(text) = response.get("output_text").and_then(Value::as_str) {
        return Ok(serde_json::from_str(text)?);
    }

    if let Some(content) = response.pointer("/output/0/content").and_then(Value::as_array) {
        for item in content {
            if item.get("type").and_then(Value::as_str) == Some("output_json") {
                if let Some(payload) = item.get("json") {
                    return Ok(payload.clone());
                }
            }
            if let Some(text) = item.get("text").and_then(Value::as_str) {
                return Ok(serde_json::from_str(text)?);
            }
        }
    }

    if let Some(text) = response.get("text").and_then(Value::as_str) {
        return Ok(serde_json::from_str(text)?);
    }

    Ok(response.clone())
}

fn parse_run_output(response: &Value, schema: &Value) -> Result<RunOutput> {
    let payload = extract_json_payload(response)?;
    validate(schema, &payload).map_err(|err| anyhow!(err))?;
    Ok(serde_json::from_value(payload)?)
}

fn parse_update_result(response: &Value, schema: &Value) -> Result<RunOutput> {
    let payload = extract_json_payload(response)?;
    validate(schema, &payload).map_err(|err| anyhow!(err))?;
    let result = payload
        .get("result")
        .cloned()
        .ok_or_else(|| anyhow!("update payload missing result"))?;
    Ok(serde_json::from_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note_envelope() -> Value {
        envelope_schema(&resolve_mode("note").data_schema)
    }

    fn valid_note_payload() -> Value {
        json!({
            "clean_transcript": "Buy milk tomorrow",
            "summary": "Groceries reminder",
            "actions": ["buy milk"],
            "tags": ["errand"],
            "data": {
                "title": "Groceries",
                "summary": "Buy milk tomorrow",
                "bullets": ["milk"],
                "action_items": ["buy milk"],
                "decisions": [],
                "questions": []
            }
        })
    }

    #[test]
    fn extracts_output_text_shape() {
        let response = json!({ "output_text": "{\"mode\":\"note\"}" });
        let payload = extract_json_payload(&response).unwrap();
        assert_eq!(payload, json!({ "mode": "note" }));
    }

    #[test]
    fn extracts_output_content_json_shape() {
        let response = json!({
            "output": [{
                "content": [
                    { "type": "output_json", "json": { "mode": "email" } }
                ]
            }]
        });
        let payload = extract_json_payload(&response).unwrap();
        assert_eq!(payload, json!({ "mode": "email" }));
    }

    #[test]
    fn extracts_output_content_text_shape() {
        let response = json!({
            "output": [{
                "content": [
                    { "type": "output_text", "text": "{\"mode\":\"ticket\"}" }
                ]
            }]
        });
        let payload = extract_json_payload(&response).unwrap();
        assert_eq!(payload, json!({ "mode": "ticket" }));
    }

    #[test]
    fn extracts_top_level_text_shape() {
        let response = json!({ "text": "{\"mode\":\"event\"}" });
        let payload = extract_json_payload(&response).unwrap();
        assert_eq!(payload, json!({ "mode": "event" }));
    }

    #[test]
    fn unknown_shape_falls_back_to_raw_response() {
        let response = valid_note_payload();
        let payload = extract_json_payload(&response).unwrap();
        assert_eq!(payload, response);
    }

    #[test]
    fn malformed_output_text_is_an_error() {
        let response = json!({ "output_text": "not json" });
        assert!(extract_json_payload(&response).is_err());
    }

    #[test]
    fn parse_run_output_accepts_valid_payload() {
        let result = parse_run_output(&valid_note_payload(), &note_envelope()).unwrap();
        assert_eq!(result.summary, "Groceries reminder");
        assert_eq!(result.data["title"], "Groceries");
    }

    #[test]
    fn parse_run_output_rejects_extra_keys() {
        let mut payload = valid_note_payload();
        payload["data"]["mood"] = json!("chipper");
        assert!(parse_run_output(&payload, &note_envelope()).is_err());
    }

    #[test]
    fn parse_run_output_rejects_missing_required() {
        let mut payload = valid_note_payload();
        payload["data"].as_object_mut().unwrap().remove("questions");
        assert!(parse_run_output(&payload, &note_envelope()).is_err());
    }

    #[test]
    fn parse_update_result_keeps_result_and_drops_model_change_log() {
        let schema = update_schema(&resolve_mode("note").data_schema);
        let payload = json!({
            "result": valid_note_payload(),
            "change_log": [
                { "path": "summary", "before": "old", "after": "made up by the model" }
            ]
        });
        let result = parse_update_result(&payload, &schema).unwrap();
        assert_eq!(result.summary, "Groceries reminder");
        // The differ on identical results reports nothing, regardless of
        // what the model claimed changed.
        assert!(build_change_log(&result, &result).is_empty());
    }

    #[test]
    fn enrich_prompt_carries_transcript_mode_and_hint() {
        let mode = resolve_mode("note");
        let prompt = build_enrich_user_prompt("Buy milk tomorrow", mode.id, mode.user_hint);
        assert!(prompt.contains("Transcript:\nBuy milk tomorrow"));
        assert!(prompt.contains("Mode: NOTE"));
        assert!(prompt.contains("Instructions:"));
    }

    #[test]
    fn update_prompt_embeds_previous_result_and_change_log_request() {
        let previous = RunOutput {
            clean_transcript: "first pass".to_string(),
            summary: "A".to_string(),
            actions: vec![],
            tags: vec![],
            data: json!({ "title": "X" }),
        };
        let prompt =
            build_update_user_prompt("second pass", "note", "hint", &previous).unwrap();
        assert!(prompt.contains("Previous structured result (JSON):"));
        assert!(prompt.contains("\"summary\":\"A\""));
        assert!(prompt.contains("New follow-up transcript:\nsecond pass"));
        assert!(prompt.contains("Use null for unknown values."));
    }

    #[test]
    fn retry_prompt_embeds_prior_response() {
        let response = json!({ "output_text": "{broken" });
        let prompt = build_retry_prompt(&response).unwrap();
        assert!(prompt.starts_with("Fix the JSON to match the schema exactly."));
        assert!(prompt.contains("{broken"));
    }

    #[test]
    fn structured_request_serializes_schema_constraint() {
        let schema = note_envelope();
        let request = ResponsesRequest {
            model: ENRICH_MODEL,
            input: vec![InputMessage {
                role: "system",
                content: "s",
            }],
            text: TextConstraint {
                format: SchemaFormat {
                    kind: "json_schema",
                    name: "enriched_output",
                    strict: true,
                    schema: &schema,
                },
            },
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["text"]["format"]["type"], "json_schema");
        assert_eq!(wire["text"]["format"]["strict"], true);
        assert_eq!(wire["text"]["format"]["schema"]["type"], "object");
    }
}
