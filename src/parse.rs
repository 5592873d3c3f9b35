use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::models::{CompanyResearch, Difficulty, ProjectIdea, RecentProject};

/// How much of a bad response to quote back in the error message.
const EXCERPT_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unparseable AI response: {excerpt}")]
    Unparseable { excerpt: String },

    #[error("AI response contained no project array")]
    MissingIdeaArray,
}

/// Parse model output that should be JSON but may arrive wrapped in a
/// markdown code fence (with or without a language tag).
pub fn parse_ai_json(raw: &str) -> Result<Value, ParseError> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(block) = extract_fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(&block) {
            return Ok(value);
        }
    }

    Err(ParseError::Unparseable {
        excerpt: excerpt(trimmed),
    })
}

/// The body of the first fenced code block, skipping any language tag on
/// the opening fence line.
fn extract_fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n')?;
    let body = &after_fence[body_start + 1..];
    let end = body.find("```")?;
    Some(body[..end].trim().to_string())
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_LEN {
        text.to_string()
    } else {
        let cut: String = text.chars().take(EXCERPT_LEN).collect();
        format!("{cut}...")
    }
}

/// Pull the idea array out of parsed output. `projects` wins over the
/// legacy `ideas` field when both are present; neither being an array is
/// an error, not an empty batch.
pub fn idea_records(value: &Value) -> Result<&Vec<Value>, ParseError> {
    if let Some(projects) = value.get("projects").and_then(Value::as_array) {
        return Ok(projects);
    }
    if let Some(ideas) = value.get("ideas").and_then(Value::as_array) {
        return Ok(ideas);
    }
    Err(ParseError::MissingIdeaArray)
}

/// Keep only well-formed idea records. A record needs a non-empty
/// title-or-name and description-or-desc; anything else is dropped and
/// counted, never repaired and never fatal to the batch.
pub fn filter_ideas(records: &[Value]) -> (Vec<ProjectIdea>, usize) {
    let mut ideas = Vec::new();
    let mut dropped = 0;

    for record in records {
        match idea_from_value(record) {
            Some(idea) => ideas.push(idea),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(dropped, kept = ideas.len(), "dropped malformed idea records");
    }
    (ideas, dropped)
}

fn idea_from_value(value: &Value) -> Option<ProjectIdea> {
    if !value.is_object() {
        return None;
    }
    let title = str_field(value, &["title", "name"])?;
    let description = str_field(value, &["description", "desc"])?;

    Some(ProjectIdea {
        title,
        description,
        technologies: str_list(value, "technologies"),
        difficulty: str_field(value, &["difficulty"])
            .and_then(|s| Difficulty::parse(&s))
            .unwrap_or(Difficulty::Intermediate),
        time_estimate: str_field(value, &["timeEstimate", "time_estimate"]),
        standout_factor: str_field(value, &["standoutFactor", "standout_factor"]),
        company_alignment: str_field(value, &["companyAlignment", "company_alignment"]),
    })
}

/// Build company research from parsed output, defaulting every field the
/// model omitted or mistyped. Sources come from the web-search side
/// channel, not the JSON body, so they start empty here.
pub fn company_research_from_value(fallback_company: &str, value: &Value) -> CompanyResearch {
    let recent_projects = value
        .get("recentProjects")
        .or_else(|| value.get("recent_projects"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = str_field(item, &["name", "title"])?;
                    Some(RecentProject {
                        name,
                        description: str_field(item, &["description", "desc"])
                            .unwrap_or_default(),
                        relevance: str_field(item, &["relevance"]),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    CompanyResearch {
        company: str_field(value, &["company", "name"])
            .unwrap_or_else(|| fallback_company.to_string()),
        website: url_field(value, "website"),
        engineering_blog: url_field(value, "engineeringBlog")
            .or_else(|| url_field(value, "engineering_blog")),
        github_org: url_field(value, "githubOrg").or_else(|| url_field(value, "github_org")),
        tech_stack: str_list(value, "techStack")
            .into_iter()
            .chain(str_list(value, "tech_stack"))
            .collect(),
        recent_projects,
        insights: str_list(value, "insights"),
        sources: Vec::new(),
    }
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = value.get(key).and_then(Value::as_str) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn url_field(value: &Value, key: &str) -> Option<String> {
    // Models frequently hand back `null` or "unknown" for links they
    // could not find.
    let s = str_field(value, &[key])?;
    let lower = s.to_lowercase();
    if lower == "null" || lower == "none" || lower == "unknown" || lower == "n/a" {
        None
    } else {
        Some(s)
    }
}

fn str_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
