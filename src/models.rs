use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Linkedin,
    Indeed,
    Glassdoor,
}

impl Site {
    pub fn label(&self) -> &'static str {
        match self {
            Site::Linkedin => "LinkedIn",
            Site::Indeed => "Indeed",
            Site::Glassdoor => "Glassdoor",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub site: Site,
    pub url: String,
    pub title: String,
    pub company: Option<String>, // best-effort
    pub location: Option<String>,
    pub description: String,
    pub requirements: Vec<String>,
    pub technologies: Vec<String>, // deduplicated, sorted
    pub experience_years: Option<u32>,
    pub extracted_at: DateTime<Utc>,
}

impl JobPosting {
    /// A posting is usable only if it carries a title.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyResearch {
    pub company: String,
    pub website: Option<String>,
    pub engineering_blog: Option<String>,
    pub github_org: Option<String>,
    pub tech_stack: Vec<String>,
    pub recent_projects: Vec<RecentProject>,
    pub insights: Vec<String>,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentProject {
    pub name: String,
    pub description: String,
    pub relevance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// Skill points awarded when a saved idea of this tier is completed.
    pub fn points(&self) -> u32 {
        match self {
            Difficulty::Beginner => 1,
            Difficulty::Intermediate => 2,
            Difficulty::Advanced => 3,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Some(Difficulty::Beginner),
            "intermediate" => Some(Difficulty::Intermediate),
            "advanced" => Some(Difficulty::Advanced),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectIdea {
    pub title: String,
    pub description: String,
    pub technologies: Vec<String>,
    pub difficulty: Difficulty,
    pub time_estimate: Option<String>,
    pub standout_factor: Option<String>,
    pub company_alignment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedIdea {
    pub idea: ProjectIdea,
    pub company: String,
    pub job_title: String,
    pub saved_at: DateTime<Utc>,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProgress {
    pub name: String,
    pub skills: BTreeMap<String, u32>,
    pub available_points: u32,
    pub saved_ideas: Vec<SavedIdea>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub enable_cache: bool,
    pub auto_research: bool,
    pub cache_expiry_hours: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            enable_cache: true,
            auto_research: false,
            cache_expiry_hours: 24,
        }
    }
}

/// Result of the most recent idea generation, kept so `scout ideas collect`
/// can reference ideas by number in a later invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastRun {
    pub job: JobPosting,
    pub ideas: Vec<ProjectIdea>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_points() {
        assert_eq!(Difficulty::Beginner.points(), 1);
        assert_eq!(Difficulty::Intermediate.points(), 2);
        assert_eq!(Difficulty::Advanced.points(), 3);
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!(Difficulty::parse("Advanced"), Some(Difficulty::Advanced));
        assert_eq!(Difficulty::parse(" beginner "), Some(Difficulty::Beginner));
        assert_eq!(Difficulty::parse("expert"), None);
    }

    #[test]
    fn test_site_serde_lowercase() {
        let json = serde_json::to_string(&Site::Linkedin).unwrap();
        assert_eq!(json, "\"linkedin\"");
        let site: Site = serde_json::from_str("\"glassdoor\"").unwrap();
        assert_eq!(site, Site::Glassdoor);
    }
}
