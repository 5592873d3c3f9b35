use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{CompanyResearch, JobPosting, ProjectIdea, Settings, SourceRef};
use crate::parse::{self, ParseError};

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const MODELS_URL: &str = "https://api.openai.com/v1/models";

/// Upper bound on follow-up requests for a single truncated generation.
const MAX_CONTINUATIONS: usize = 3;
const MAX_OUTPUT_TOKENS: u32 = 2048;
const CONTINUE_INPUT: &str =
    "Continue exactly where you left off. Do not repeat anything already written.";

/// USD per million input/output tokens. Observability only; an unknown
/// model simply logs raw token counts.
const MODEL_PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4.1", 2.00, 8.00),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("o4-mini", 1.10, 4.40),
];

#[derive(Debug, Error)]
pub enum AiError {
    #[error("No API key configured. Run 'scout config set --api-key <key>' first.")]
    MissingApiKey,

    #[error("Request failed: {0}")]
    Http(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request blocked by content policy. Try a different posting.")]
    ContentFiltered,

    #[error("The model declined the request: {0}")]
    Refused(String),

    #[error("Generation failed: {0}")]
    Failed(String),

    #[error("Response contained no text output")]
    EmptyOutput,

    #[error(transparent)]
    Parse(#[from] ParseError),
}

// --- Request/response wire types ---

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub input: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextOptions>,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Tool {
    fn web_search() -> Self {
        Self {
            kind: "web_search".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextOptions {
    pub format: TextFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

fn json_output() -> TextOptions {
    TextOptions {
        format: TextFormat {
            kind: "json_object".to_string(),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningOptions {
    pub effort: String,
}

/// Reasoning models take an effort knob; chat models reject it.
fn reasoning_for(model: &str) -> Option<ReasoningOptions> {
    let mut chars = model.chars();
    match (chars.next(), chars.next()) {
        (Some('o'), Some(c)) if c.is_ascii_digit() => Some(ReasoningOptions {
            effort: "medium".to_string(),
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesReply {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    pub output: Option<Vec<OutputItem>>,
    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<ProviderErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncompleteDetails {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Option<Vec<ContentPart>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub refusal: Option<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub output_tokens_details: Option<OutputTokensDetails>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OutputTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorEnvelope {
    error: ProviderErrorBody,
}

// --- Transport ---

pub trait ResponsesTransport {
    fn send(&self, request: &ResponsesRequest) -> Result<ResponsesReply, AiError>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
    api_key: String,
}

impl HttpTransport {
    pub fn new(api_key: String) -> Result<Self, AiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| AiError::Http(e.to_string()))?;
        Ok(Self { client, api_key })
    }
}

impl ResponsesTransport for HttpTransport {
    fn send(&self, request: &ResponsesRequest) -> Result<ResponsesReply, AiError> {
        let response = self
            .client
            .post(RESPONSES_URL)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .map_err(|e| AiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ProviderErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response.json().map_err(|e| AiError::Http(e.to_string()))
    }
}

/// Cheap authenticated call used before credentials are saved.
pub fn validate_api_key(api_key: &str) -> Result<(), AiError> {
    if api_key.trim().is_empty() {
        return Err(AiError::MissingApiKey);
    }
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| AiError::Http(e.to_string()))?;
    let response = client
        .get(MODELS_URL)
        .bearer_auth(api_key)
        .send()
        .map_err(|e| AiError::Http(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().unwrap_or_default();
        let message = serde_json::from_str::<ProviderErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.error.message)
            .unwrap_or_else(|| "invalid API key".to_string());
        Err(AiError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

// --- Generation driver ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationState {
    Pending,
    Continuing,
    Completed,
    Failed,
    Refused,
}

enum Disposition {
    Completed,
    Truncated,
    Filtered,
    Failed(String),
}

fn classify(reply: &ResponsesReply) -> Disposition {
    match reply.status.as_deref() {
        Some("completed") => Disposition::Completed,
        Some("incomplete") => {
            let reason = reply
                .incomplete_details
                .as_ref()
                .and_then(|d| d.reason.as_deref());
            match reason {
                Some("max_output_tokens") => Disposition::Truncated,
                Some("content_filter") => Disposition::Filtered,
                other => Disposition::Failed(format!(
                    "incomplete response ({})",
                    other.unwrap_or("no reason given")
                )),
            }
        }
        other => {
            let message = reply
                .error
                .as_ref()
                .and_then(|e| e.message.clone())
                .unwrap_or_else(|| {
                    format!("provider returned status {}", other.unwrap_or("<none>"))
                });
            Disposition::Failed(message)
        }
    }
}

/// First non-empty text in a reply. A refusal part anywhere short-circuits
/// into an error; the legacy `choices` shape is the fallback.
fn extract_output_text(reply: &ResponsesReply) -> Result<Option<String>, AiError> {
    if let Some(output) = &reply.output {
        for item in output {
            for part in item.content.iter().flatten() {
                if part.kind.as_deref() == Some("refusal") {
                    let reason = part
                        .refusal
                        .clone()
                        .or_else(|| part.text.clone())
                        .unwrap_or_else(|| "no reason given".to_string());
                    return Err(AiError::Refused(reason));
                }
            }
        }
        for item in output {
            for part in item.content.iter().flatten() {
                if let Some(text) = &part.text {
                    if !text.trim().is_empty() {
                        return Ok(Some(text.clone()));
                    }
                }
            }
        }
    }

    if let Some(choices) = &reply.choices {
        for choice in choices {
            if let Some(content) = choice.message.as_ref().and_then(|m| m.content.as_ref()) {
                if !content.trim().is_empty() {
                    return Ok(Some(content.clone()));
                }
            }
        }
    }

    Ok(None)
}

fn collect_sources(reply: &ResponsesReply) -> Vec<SourceRef> {
    let mut sources = Vec::new();
    for item in reply.output.iter().flatten() {
        for part in item.content.iter().flatten() {
            for annotation in &part.annotations {
                if annotation.kind.as_deref() != Some("url_citation") {
                    continue;
                }
                if let Some(url) = &annotation.url {
                    sources.push(SourceRef {
                        title: annotation.title.clone().unwrap_or_else(|| url.clone()),
                        url: url.clone(),
                    });
                }
            }
        }
    }
    sources
}

fn merge_sources(into: &mut Vec<SourceRef>, fresh: Vec<SourceRef>) {
    for source in fresh {
        if !into.iter().any(|s| s.url == source.url) {
            into.push(source);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
}

impl UsageTotals {
    fn absorb(&mut self, usage: Option<&Usage>) {
        if let Some(usage) = usage {
            self.input_tokens += usage.input_tokens;
            self.output_tokens += usage.output_tokens;
            self.reasoning_tokens += usage
                .output_tokens_details
                .map(|d| d.reasoning_tokens)
                .unwrap_or(0);
        }
    }
}

pub fn estimate_cost(model: &str, usage: &UsageTotals) -> Option<f64> {
    let (_, input_price, output_price) = MODEL_PRICES.iter().find(|(m, _, _)| *m == model)?;
    Some(
        usage.input_tokens as f64 / 1_000_000.0 * input_price
            + usage.output_tokens as f64 / 1_000_000.0 * output_price,
    )
}

#[derive(Debug)]
pub struct Generation {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub usage: UsageTotals,
    pub truncated: bool,
}

pub struct Orchestrator {
    transport: Box<dyn ResponsesTransport>,
    model: String,
}

impl Orchestrator {
    pub fn new(settings: &Settings) -> Result<Self, AiError> {
        if settings.api_key.trim().is_empty() {
            return Err(AiError::MissingApiKey);
        }
        let transport = HttpTransport::new(settings.api_key.clone())?;
        Ok(Self {
            transport: Box::new(transport),
            model: settings.model.clone(),
        })
    }

    pub fn with_transport(transport: Box<dyn ResponsesTransport>, model: &str) -> Self {
        Self {
            transport,
            model: model.to_string(),
        }
    }

    /// Drive one generation to a terminal state, following truncated
    /// responses through bounded continuation.
    fn run(&self, mut request: ResponsesRequest) -> Result<Generation, AiError> {
        let mut state = GenerationState::Pending;
        let mut text = String::new();
        let mut sources: Vec<SourceRef> = Vec::new();
        let mut usage = UsageTotals::default();
        let mut continuations = 0usize;
        let mut truncated = false;

        loop {
            let reply = self.transport.send(&request)?;
            usage.absorb(reply.usage.as_ref());
            merge_sources(&mut sources, collect_sources(&reply));

            match classify(&reply) {
                Disposition::Filtered => {
                    transition(&mut state, GenerationState::Refused);
                    return Err(AiError::ContentFiltered);
                }
                Disposition::Failed(message) => {
                    transition(&mut state, GenerationState::Failed);
                    return Err(AiError::Failed(message));
                }
                Disposition::Completed => {
                    if let Some(chunk) = extract_output_text(&reply).inspect_err(|_| {
                        transition(&mut state, GenerationState::Refused);
                    })? {
                        text.push_str(&chunk);
                    }
                    transition(&mut state, GenerationState::Completed);
                    break;
                }
                Disposition::Truncated => {
                    if let Some(chunk) = extract_output_text(&reply).inspect_err(|_| {
                        transition(&mut state, GenerationState::Refused);
                    })? {
                        text.push_str(&chunk);
                    }
                    if continuations >= MAX_CONTINUATIONS {
                        // Bound reached: keep whatever partial text we have.
                        truncated = true;
                        transition(&mut state, GenerationState::Completed);
                        break;
                    }
                    continuations += 1;
                    transition(&mut state, GenerationState::Continuing);
                    request.previous_response_id = reply.id.clone();
                    request.input = CONTINUE_INPUT.to_string();
                }
            }
        }

        if text.trim().is_empty() {
            return Err(AiError::EmptyOutput);
        }

        match estimate_cost(&self.model, &usage) {
            Some(cost) => info!(
                model = %self.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                reasoning_tokens = usage.reasoning_tokens,
                cost_usd = %format!("{cost:.4}"),
                "generation finished"
            ),
            None => info!(
                model = %self.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                reasoning_tokens = usage.reasoning_tokens,
                "generation finished (no price entry for model)"
            ),
        }

        Ok(Generation {
            text,
            sources,
            usage,
            truncated,
        })
    }

    /// Research the hiring company behind a posting, with web search
    /// enabled so citations can be shown next to the findings.
    pub fn research_company(&self, job: &JobPosting) -> Result<CompanyResearch, AiError> {
        let company = job
            .company
            .clone()
            .unwrap_or_else(|| "the hiring company".to_string());

        let request = ResponsesRequest {
            model: self.model.clone(),
            instructions: Some(RESEARCH_INSTRUCTIONS.to_string()),
            input: research_input(job, &company),
            tools: vec![Tool::web_search()],
            text: Some(json_output()),
            max_output_tokens: MAX_OUTPUT_TOKENS,
            reasoning: reasoning_for(&self.model),
            previous_response_id: None,
        };

        let generation = self.run(request)?;
        let value = parse::parse_ai_json(&generation.text)?;
        let mut research = parse::company_research_from_value(&company, &value);
        research.sources = generation.sources;
        Ok(research)
    }

    /// Generate portfolio project ideas tuned to the posting, the company
    /// research, and the player's current skill levels.
    pub fn generate_ideas(
        &self,
        job: &JobPosting,
        research: Option<&CompanyResearch>,
        skills: &BTreeMap<String, u32>,
    ) -> Result<Vec<ProjectIdea>, AiError> {
        let request = ResponsesRequest {
            model: self.model.clone(),
            instructions: Some(IDEAS_INSTRUCTIONS.to_string()),
            input: ideas_input(job, research, skills),
            tools: Vec::new(),
            text: Some(json_output()),
            max_output_tokens: MAX_OUTPUT_TOKENS,
            reasoning: reasoning_for(&self.model),
            previous_response_id: None,
        };

        let generation = self.run(request)?;
        if generation.truncated {
            debug!("idea generation hit the continuation bound; parsing partial output");
        }
        let value = parse::parse_ai_json(&generation.text)?;
        let records = parse::idea_records(&value)?;
        let (ideas, _dropped) = parse::filter_ideas(records);
        Ok(ideas)
    }
}

fn transition(state: &mut GenerationState, next: GenerationState) {
    debug!(from = ?state, to = ?next, "generation state");
    *state = next;
}

// --- Prompts ---

const RESEARCH_INSTRUCTIONS: &str = "You are a company research assistant helping a job seeker \
understand a hiring company's engineering culture. Use web search when it helps. Respond with a \
single JSON object shaped exactly like this:\n\
{\n\
  \"company\": \"Company Name\",\n\
  \"website\": \"https://... or null\",\n\
  \"engineeringBlog\": \"https://... or null\",\n\
  \"githubOrg\": \"https://github.com/... or null\",\n\
  \"techStack\": [\"Tech1\", \"Tech2\"],\n\
  \"recentProjects\": [{\"name\": \"...\", \"description\": \"...\", \"relevance\": \"...\"}],\n\
  \"insights\": [\"short, concrete observation\"]\n\
}\n\
Only include facts you are reasonably confident about; use null for links you cannot verify.";

fn research_input(job: &JobPosting, company: &str) -> String {
    let mut input = format!(
        "Research {company}, which is hiring for the role below.\n\n\
        Job Title: {}\n",
        job.title
    );
    if let Some(location) = &job.location {
        input.push_str(&format!("Location: {location}\n"));
    }
    input.push_str(&format!(
        "\nJob Description (excerpt):\n{}\n",
        clip(&job.description, 1500)
    ));
    if !job.technologies.is_empty() {
        input.push_str(&format!(
            "\nTechnologies mentioned in the posting: {}\n",
            job.technologies.join(", ")
        ));
    }
    input
}

const IDEAS_INSTRUCTIONS: &str = "You are a career advisor helping job seekers stand out by \
suggesting impressive portfolio projects. Generate creative, practical project ideas that \
directly relate to the job requirements, demonstrate relevant technical skills, align with the \
company's interests, are achievable in 1-2 weeks, and stand out from typical portfolio \
projects. Always respond with valid JSON.";

fn ideas_input(
    job: &JobPosting,
    research: Option<&CompanyResearch>,
    skills: &BTreeMap<String, u32>,
) -> String {
    let mut input = format!(
        "Generate 3 unique portfolio project ideas for this job opportunity:\n\n\
        **Job Details:**\n\
        - Title: {}\n\
        - Company: {}\n\
        - Location: {}\n\n\
        **Job Requirements:**\n{}\n\n\
        **Technologies Mentioned in Job:**\n{}\n\n\
        **Experience Required:**\n{}\n",
        job.title,
        job.company.as_deref().unwrap_or("Tech Company"),
        job.location.as_deref().unwrap_or("Remote"),
        clip(&job.description, 1500),
        if job.technologies.is_empty() {
            "Not specified".to_string()
        } else {
            job.technologies.join(", ")
        },
        match job.experience_years {
            Some(years) => format!("{years}+ years"),
            None => "Not specified".to_string(),
        },
    );

    if let Some(research) = research {
        input.push_str(&format!("\n**Company Intelligence:**\n- Company: {}\n", research.company));
        if !research.tech_stack.is_empty() {
            input.push_str(&format!("- Their Stack: {}\n", research.tech_stack.join(", ")));
        }
        if !research.recent_projects.is_empty() {
            let names: Vec<&str> = research
                .recent_projects
                .iter()
                .map(|p| p.name.as_str())
                .collect();
            input.push_str(&format!("- Recent Initiatives: {}\n", names.join(", ")));
        }
        for insight in &research.insights {
            input.push_str(&format!("- {insight}\n"));
        }
    }

    let rated: Vec<String> = skills
        .iter()
        .filter(|(_, level)| **level > 0)
        .map(|(key, level)| format!("{key}={level}"))
        .collect();
    if !rated.is_empty() {
        input.push_str(&format!(
            "\n**Candidate Skill Levels (0-10):**\n{}\n\
            Prefer projects that build on the stronger skills while stretching one weaker one.\n",
            rated.join(", ")
        ));
    }

    input.push_str(
        "\n**Output Format (JSON):**\n\
        {\n\
          \"projects\": [\n\
            {\n\
              \"title\": \"Project Name\",\n\
              \"description\": \"2-3 sentence description of what the project does and why it's impressive\",\n\
              \"technologies\": [\"Tech1\", \"Tech2\", \"Tech3\"],\n\
              \"difficulty\": \"beginner|intermediate|advanced\",\n\
              \"timeEstimate\": \"X days/weeks\",\n\
              \"standoutFactor\": \"What makes this project unique\",\n\
              \"companyAlignment\": \"Why this company would care\"\n\
            }\n\
          ]\n\
        }\n\
        Make sure the projects are specific to this role and company, use technologies from the \
        posting, and are practical and achievable.",
    );

    input
}

fn clip(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct ScriptedTransport {
        replies: RefCell<VecDeque<ResponsesReply>>,
        calls: Rc<Cell<usize>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<serde_json::Value>) -> Self {
            let parsed = replies
                .into_iter()
                .map(|v| serde_json::from_value(v).expect("test reply must deserialize"))
                .collect();
            Self {
                replies: RefCell::new(parsed),
                calls: Rc::new(Cell::new(0)),
            }
        }
    }

    impl ResponsesTransport for ScriptedTransport {
        fn send(&self, _request: &ResponsesRequest) -> Result<ResponsesReply, AiError> {
            self.calls.set(self.calls.get() + 1);
            self.replies
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| AiError::Failed("scripted transport exhausted".to_string()))
        }
    }

    fn completed_reply(text: &str) -> serde_json::Value {
        json!({
            "id": "resp_1",
            "status": "completed",
            "output": [{
                "type": "message",
                "content": [{"type": "output_text", "text": text}]
            }],
            "usage": {"input_tokens": 100, "output_tokens": 50}
        })
    }

    fn truncated_reply(id: &str, text: &str) -> serde_json::Value {
        json!({
            "id": id,
            "status": "incomplete",
            "incomplete_details": {"reason": "max_output_tokens"},
            "output": [{
                "type": "message",
                "content": [{"type": "output_text", "text": text}]
            }],
            "usage": {"input_tokens": 10, "output_tokens": 20}
        })
    }

    fn plain_request() -> ResponsesRequest {
        ResponsesRequest {
            model: "gpt-4o".to_string(),
            instructions: None,
            input: "hello".to_string(),
            tools: Vec::new(),
            text: None,
            max_output_tokens: MAX_OUTPUT_TOKENS,
            reasoning: None,
            previous_response_id: None,
        }
    }

    fn orchestrator(replies: Vec<serde_json::Value>) -> Orchestrator {
        Orchestrator::with_transport(Box::new(ScriptedTransport::new(replies)), "gpt-4o")
    }

    fn sample_job() -> JobPosting {
        JobPosting {
            site: crate::models::Site::Linkedin,
            url: "https://www.linkedin.com/jobs/view/1".to_string(),
            title: "Backend Engineer".to_string(),
            company: Some("Acme".to_string()),
            location: None,
            description: "Build services in Rust".to_string(),
            requirements: vec![],
            technologies: vec!["Rust".to_string()],
            experience_years: Some(3),
            extracted_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_completed_output_items() {
        let orch = orchestrator(vec![completed_reply("hello world")]);
        let generation = orch.run(plain_request()).unwrap();
        assert_eq!(generation.text, "hello world");
        assert!(!generation.truncated);
    }

    #[test]
    fn test_legacy_choices_shape() {
        let orch = orchestrator(vec![json!({
            "status": "completed",
            "choices": [{"message": {"content": "from choices"}}]
        })]);
        let generation = orch.run(plain_request()).unwrap();
        assert_eq!(generation.text, "from choices");
    }

    #[test]
    fn test_refusal_short_circuits() {
        let orch = orchestrator(vec![json!({
            "status": "completed",
            "output": [{
                "type": "message",
                "content": [
                    {"type": "refusal", "refusal": "cannot help with that"},
                    {"type": "output_text", "text": "ignored"}
                ]
            }]
        })]);
        let err = orch.run(plain_request()).unwrap_err();
        assert!(matches!(err, AiError::Refused(ref r) if r.contains("cannot help")));
    }

    #[test]
    fn test_content_filter_is_terminal() {
        let transport = ScriptedTransport::new(vec![
            json!({
                "status": "incomplete",
                "incomplete_details": {"reason": "content_filter"}
            }),
            // Would be consumed only by an (incorrect) retry.
            completed_reply("should never be requested"),
        ]);
        let calls = Rc::clone(&transport.calls);
        let orch = Orchestrator::with_transport(Box::new(transport), "gpt-4o");
        let err = orch.run(plain_request()).unwrap_err();
        assert!(matches!(err, AiError::ContentFiltered));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_continuation_is_bounded() {
        // Always-truncated: 1 initial + 3 continuations, then give up with
        // whatever text accumulated.
        let orch = orchestrator(vec![
            truncated_reply("r1", "part1 "),
            truncated_reply("r2", "part2 "),
            truncated_reply("r3", "part3 "),
            truncated_reply("r4", "part4"),
        ]);
        let generation = orch.run(plain_request()).unwrap();
        assert!(generation.truncated);
        assert_eq!(generation.text, "part1 part2 part3 part4");
        assert_eq!(generation.usage.input_tokens, 40);
        assert_eq!(generation.usage.output_tokens, 80);
    }

    #[test]
    fn test_continuation_then_completed() {
        let orch = orchestrator(vec![
            truncated_reply("r1", "first half, "),
            completed_reply("second half"),
        ]);
        let generation = orch.run(plain_request()).unwrap();
        assert!(!generation.truncated);
        assert_eq!(generation.text, "first half, second half");
    }

    #[test]
    fn test_failed_status_carries_provider_message() {
        let orch = orchestrator(vec![json!({
            "status": "failed",
            "error": {"message": "model overloaded"}
        })]);
        let err = orch.run(plain_request()).unwrap_err();
        assert!(matches!(err, AiError::Failed(ref m) if m == "model overloaded"));
    }

    #[test]
    fn test_empty_output_is_error() {
        let orch = orchestrator(vec![json!({"status": "completed", "output": []})]);
        let err = orch.run(plain_request()).unwrap_err();
        assert!(matches!(err, AiError::EmptyOutput));
    }

    #[test]
    fn test_sources_merged_across_continuations() {
        let with_citation = |id: &str, url: &str, text: &str| {
            let status = if id == "done" { "completed" } else { "incomplete" };
            json!({
                "id": id,
                "status": status,
                "incomplete_details": {"reason": "max_output_tokens"},
                "output": [{
                    "type": "message",
                    "content": [{
                        "type": "output_text",
                        "text": text,
                        "annotations": [
                            {"type": "url_citation", "title": "Blog", "url": url}
                        ]
                    }]
                }]
            })
        };
        let orch = orchestrator(vec![
            with_citation("r1", "https://a.example", "x"),
            with_citation("done", "https://a.example", "y"),
        ]);
        let generation = orch.run(plain_request()).unwrap();
        assert_eq!(generation.sources.len(), 1);
        assert_eq!(generation.sources[0].url, "https://a.example");
    }

    #[test]
    fn test_research_company_parses_fenced_json() {
        let research_json = "```json\n{\"company\": \"Acme\", \"website\": \"https://acme.example\", \
            \"techStack\": [\"Rust\"], \"insights\": [\"ships weekly\"]}\n```";
        let orch = orchestrator(vec![completed_reply(research_json)]);
        let research = orch.research_company(&sample_job()).unwrap();
        assert_eq!(research.company, "Acme");
        assert_eq!(research.website.as_deref(), Some("https://acme.example"));
        assert_eq!(research.tech_stack, vec!["Rust"]);
        assert_eq!(research.insights, vec!["ships weekly"]);
    }

    #[test]
    fn test_generate_ideas_filters_invalid() {
        let ideas_json = r#"{"projects": [
            {"title": "Good", "description": "Valid idea", "difficulty": "advanced"},
            {"name": "No description, dropped"}
        ]}"#;
        let orch = orchestrator(vec![completed_reply(ideas_json)]);
        let ideas = orch
            .generate_ideas(&sample_job(), None, &BTreeMap::new())
            .unwrap();
        assert_eq!(ideas.len(), 1);
        assert_eq!(ideas[0].title, "Good");
    }

    #[test]
    fn test_generate_ideas_requires_array() {
        let orch = orchestrator(vec![completed_reply(r#"{"projects": "nope"}"#)]);
        let err = orch
            .generate_ideas(&sample_job(), None, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, AiError::Parse(ParseError::MissingIdeaArray)));
    }

    #[test]
    fn test_generate_ideas_unparseable_text() {
        let orch = orchestrator(vec![completed_reply("sorry, no JSON from me")]);
        let err = orch
            .generate_ideas(&sample_job(), None, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, AiError::Parse(ParseError::Unparseable { .. })));
    }

    #[test]
    fn test_request_serialization_skips_empty_fields() {
        let request = plain_request();
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("previous_response_id").is_none());
        assert!(value.get("tools").is_none());
        assert!(value.get("reasoning").is_none());
        assert_eq!(value["model"], "gpt-4o");
    }

    #[test]
    fn test_request_serialization_with_tools() {
        let mut request = plain_request();
        request.tools = vec![Tool::web_search()];
        request.previous_response_id = Some("resp_9".to_string());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["tools"][0]["type"], "web_search");
        assert_eq!(value["previous_response_id"], "resp_9");
    }

    #[test]
    fn test_reasoning_only_for_reasoning_models() {
        assert!(reasoning_for("o4-mini").is_some());
        assert!(reasoning_for("o3").is_some());
        assert!(reasoning_for("gpt-4o").is_none());
        assert!(reasoning_for("open-model").is_none());
    }

    #[test]
    fn test_estimate_cost_known_model() {
        let usage = UsageTotals {
            input_tokens: 1_000_000,
            output_tokens: 500_000,
            reasoning_tokens: 0,
        };
        let cost = estimate_cost("gpt-4o", &usage).unwrap();
        assert!((cost - 7.50).abs() < 1e-9);
        assert!(estimate_cost("unknown-model", &usage).is_none());
    }
}
