use serde::{Deserialize, Serialize};

use crate::{
    config::ConfigurationFile,
    errors::{TutorError, TutorResult},
    modes::ToolDeclaration,
    video::PatientDetails,
};

// Who said a given turn, in the vocabulary of the remote chat API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}
impl TurnRole {
    fn as_api_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }
}

// One prior exchange that gets replayed to the stateless remote API.
#[derive(Clone, Debug, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

// Everything the chat call needs: the prompt preset, the prior turns and the new text.
#[derive(Clone, Debug)]
pub struct ChatRequest<'a> {
    pub system_prompt: &'a str,
    pub tools: Option<ToolDeclaration>,
    pub history: &'a [Turn],
    pub message: &'a str,
}

// A search source attached to a grounded reply.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub citations: Vec<Citation>,
}

// Opaque token for a long running remote job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationHandle(pub String);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperationStatus {
    pub done: bool,
    pub video_uri: Option<String>,
}

// The remote generative service as seen by the chat engine. The engine thread owns
// one of these; tests substitute a scripted fake.
pub trait GenerativeBackend: Send + Sync {
    fn send_chat(&self, request: &ChatRequest) -> TutorResult<ChatReply>;

    // pulls the patient's age, gender and chief complaint out of free text
    fn extract_patient_details(&self, description: &str) -> TutorResult<PatientDetails>;

    fn start_video_generation(&self, prompt: &str) -> TutorResult<OperationHandle>;

    fn poll_operation(&self, handle: &OperationHandle) -> TutorResult<OperationStatus>;

    // turns a result uri into something the user can open; some services need the
    // credential attached to the download link.
    fn playable_video_link(&self, uri: &str) -> String {
        uri.to_owned()
    }
}

pub struct GeminiClient {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    extraction_model: String,
    video_model: String,
}
impl GeminiClient {
    pub fn new(config: &ConfigurationFile, api_key: String) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.remote_timeout_s))
            .build()
            .context("Failed to create the blocking reqwest client for the Gemini API.")?;

        Ok(Self {
            client,
            api_key,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            chat_model: config.chat_model.clone(),
            extraction_model: config.extraction_model.clone(),
            video_model: config.video_model.clone(),
        })
    }

    fn generate_content(&self, model: &str, request: &GenerateContentRequest) -> TutorResult<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let body = serde_json::to_string(request)?;
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .body(body)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?;
        read_success_body(resp)
    }
}

impl GenerativeBackend for GeminiClient {
    fn send_chat(&self, request: &ChatRequest) -> TutorResult<ChatReply> {
        let mut contents: Vec<Content> = request
            .history
            .iter()
            .map(|turn| Content::new(turn.role.as_api_str(), &turn.text))
            .collect();
        contents.push(Content::new("user", request.message));

        let payload = GenerateContentRequest {
            system_instruction: Some(Content::system(request.system_prompt)),
            contents,
            tools: match request.tools {
                Some(ToolDeclaration::GoogleSearch) => vec![Tool::default()],
                None => Vec::new(),
            },
            generation_config: None,
        };

        let body = self.generate_content(&self.chat_model, &payload)?;
        parse_chat_reply(&body)
    }

    fn extract_patient_details(&self, description: &str) -> TutorResult<PatientDetails> {
        let instruction = format!(
            "Extract the patient's age, gender and chief complaint from this OSCE scenario description. \
             Use an empty string for anything that isn't mentioned.\n\nDescription: {description}"
        );
        let payload = GenerateContentRequest {
            system_instruction: None,
            contents: vec![Content::new("user", &instruction)],
            tools: Vec::new(),
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json".to_owned(),
                response_schema: serde_json::json!({
                    "type": "OBJECT",
                    "properties": {
                        "age": { "type": "STRING" },
                        "gender": { "type": "STRING" },
                        "chiefComplaint": { "type": "STRING" }
                    }
                }),
            }),
        };

        let body = self.generate_content(&self.extraction_model, &payload)?;
        let reply = parse_chat_reply(&body)?;
        parse_patient_details(&reply.text)
    }

    fn start_video_generation(&self, prompt: &str) -> TutorResult<OperationHandle> {
        let url = format!("{}/models/{}:predictLongRunning", self.base_url, self.video_model);
        let payload = serde_json::json!({
            "instances": [{ "prompt": prompt }],
            "parameters": { "sampleCount": 1 }
        });
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .body(payload.to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()?;
        let body = read_success_body(resp)?;

        let op: OperationBody = serde_json::from_str(&body)?;
        match op.name {
            Some(name) if !name.is_empty() => Ok(OperationHandle(name)),
            _ => Err(TutorError::Parse(
                "video generation response carried no operation name".to_owned(),
            )),
        }
    }

    fn poll_operation(&self, handle: &OperationHandle) -> TutorResult<OperationStatus> {
        let url = format!("{}/{}", self.base_url, handle.0.trim_start_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()?;
        let body = read_success_body(resp)?;
        parse_operation_status(&body)
    }

    fn playable_video_link(&self, uri: &str) -> String {
        let separator = if uri.contains('?') { '&' } else { '?' };
        format!("{uri}{separator}key={}", self.api_key)
    }
}

// returns the body text for 2xx responses, otherwise the API's error message
fn read_success_body(resp: reqwest::blocking::Response) -> TutorResult<String> {
    let status = resp.status();
    let body = resp.text()?;
    if !status.is_success() {
        log::debug!("Gemini API call failed. Status: {}", status);
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|json| {
                json.get("error")
                    .and_then(|err| err.get("message"))
                    .and_then(|msg| msg.as_str())
                    .map(|msg| msg.to_owned())
            })
            .unwrap_or(body);
        return Err(TutorError::RemoteCall(format!("{status}: {message}")));
    }
    Ok(body)
}

// parses a generateContent response body into the reply text and any grounding sources
pub fn parse_chat_reply(body: &str) -> TutorResult<ChatReply> {
    let resp: GenerateContentResponse = serde_json::from_str(body)?;
    let Some(candidate) = resp.candidates.into_iter().next() else {
        return Err(TutorError::RemoteCall(
            "the model returned no candidates".to_owned(),
        ));
    };

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<String>>()
                .join("")
        })
        .unwrap_or_default();

    let citations = candidate
        .grounding_metadata
        .map(|gm| {
            gm.grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .filter_map(|web| {
                    let uri = web.uri?;
                    let title = web.title.unwrap_or_else(|| uri.clone());
                    Some(Citation { title, uri })
                })
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(TutorError::RemoteCall(
            "the model returned an empty reply".to_owned(),
        ));
    }

    Ok(ChatReply { text, citations })
}

pub fn parse_patient_details(json_text: &str) -> TutorResult<PatientDetails> {
    let details: PatientDetails = serde_json::from_str(json_text.trim())?;
    Ok(details)
}

pub fn parse_operation_status(body: &str) -> TutorResult<OperationStatus> {
    let op: OperationBody = serde_json::from_str(body)?;
    if let Some(err) = op.error {
        return Err(TutorError::RemoteCall(
            err.message.unwrap_or_else(|| "video operation failed".to_owned()),
        ));
    }

    let video_uri = op
        .response
        .and_then(|r| r.generate_video_response)
        .and_then(|gvr| gvr.generated_samples.into_iter().next())
        .and_then(|sample| sample.video)
        .and_then(|video| video.uri)
        .filter(|uri| !uri.is_empty());

    Ok(OperationStatus {
        done: op.done,
        video_uri,
    })
}

#[derive(Serialize, Debug)]
struct GenerateContentRequest {
    #[serde(rename = "system_instruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Debug)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}
impl Content {
    fn new(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_owned()),
            parts: vec![Part {
                text: text.to_owned(),
            }],
        }
    }

    // system instructions are sent without a role
    fn system(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part {
                text: text.to_owned(),
            }],
        }
    }
}

#[derive(Serialize, Debug)]
struct Part {
    text: String,
}

#[derive(Serialize, Debug, Default)]
struct Tool {
    google_search: GoogleSearchConfig,
}

#[derive(Serialize, Debug, Default)]
struct GoogleSearchConfig {}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize, Debug)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Deserialize, Debug)]
struct WebSource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OperationBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<OperationResponse>,
}

#[derive(Deserialize, Debug)]
struct OperationError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Deserialize, Debug)]
struct GeneratedSample {
    #[serde(default)]
    video: Option<VideoRef>,
}

#[derive(Deserialize, Debug)]
struct VideoRef {
    #[serde(default)]
    uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reply_with_grounding_sources() {
        let body = r#"{
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Two openings found." }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://a", "title": "SiteA" } },
                        { "web": { "uri": "https://b", "title": "SiteB" } },
                        { "retrievedContext": {} }
                    ]
                }
            }]
        }"#;

        let reply = parse_chat_reply(body).unwrap();
        assert_eq!(reply.text, "Two openings found.");
        assert_eq!(
            reply.citations,
            vec![
                Citation { title: "SiteA".into(), uri: "https://a".into() },
                Citation { title: "SiteB".into(), uri: "https://b".into() },
            ]
        );
    }

    #[test]
    fn joins_multiple_text_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hello, "},{"text":"nurse."}]}}]}"#;
        assert_eq!(parse_chat_reply(body).unwrap().text, "Hello, nurse.");
    }

    #[test]
    fn empty_or_missing_candidates_are_remote_errors() {
        assert!(matches!(
            parse_chat_reply(r#"{"candidates":[]}"#),
            Err(TutorError::RemoteCall(_))
        ));
        assert!(matches!(
            parse_chat_reply(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#),
            Err(TutorError::RemoteCall(_))
        ));
        assert!(matches!(parse_chat_reply("not json"), Err(TutorError::Parse(_))));
    }

    #[test]
    fn patient_details_tolerate_missing_fields() {
        let details = parse_patient_details(r#"{"age":"65","chiefComplaint":"chest pain"}"#).unwrap();
        assert_eq!(details.age, "65");
        assert_eq!(details.gender, "");
        assert_eq!(details.chief_complaint, "chest pain");
        assert!(parse_patient_details("{age: 65").is_err());
    }

    #[test]
    fn operation_status_reads_the_video_uri() {
        let pending = parse_operation_status(r#"{"name":"operations/123"}"#).unwrap();
        assert_eq!(pending, OperationStatus { done: false, video_uri: None });

        let finished = parse_operation_status(
            r#"{"name":"operations/123","done":true,"response":{"generateVideoResponse":
                {"generatedSamples":[{"video":{"uri":"https://files/v1?alt=media"}}]}}}"#,
        )
        .unwrap();
        assert!(finished.done);
        assert_eq!(finished.video_uri.as_deref(), Some("https://files/v1?alt=media"));

        let no_result = parse_operation_status(r#"{"done":true,"response":{}}"#).unwrap();
        assert!(no_result.done);
        assert_eq!(no_result.video_uri, None);

        let failed = parse_operation_status(r#"{"done":true,"error":{"message":"quota"}}"#);
        assert_eq!(failed, Err(TutorError::RemoteCall("quota".into())));
    }

    #[test]
    fn chat_request_serializes_search_tool_and_system_instruction() {
        let payload = GenerateContentRequest {
            system_instruction: Some(Content::system("be helpful")),
            contents: vec![Content::new("user", "hi")],
            tools: vec![Tool::default()],
            generation_config: None,
        };
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["system_instruction"]["parts"][0]["text"], "be helpful");
        assert!(json["system_instruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["tools"][0]["google_search"], serde_json::json!({}));
        assert!(json.get("generationConfig").is_none());
    }
}
