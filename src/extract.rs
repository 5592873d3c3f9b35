use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::models::JobPosting;
use crate::sites::{self, SiteAdapter};

/// How long to keep re-fetching a page whose dynamic content has not
/// rendered yet, and how often to retry.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const WAIT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported site: {0} (supported: LinkedIn, Indeed, and Glassdoor job pages)")]
    UnsupportedSite(String),

    #[error("Page content did not load within {}s", .0.as_secs())]
    ContentNotLoaded(Duration),

    #[error("No job title found on the page")]
    MissingRequiredFields { partial: Box<JobPosting> },

    #[error("Failed to fetch page: {0}")]
    Fetch(String),
}

/// Extract a job posting from already-loaded page HTML.
pub fn extract_job(html: &str, url: &str) -> Result<JobPosting, ExtractError> {
    let adapter =
        sites::detect(url).ok_or_else(|| ExtractError::UnsupportedSite(url.to_string()))?;
    extract_with(adapter, html, url)
}

fn extract_with(
    adapter: &dyn SiteAdapter,
    html: &str,
    url: &str,
) -> Result<JobPosting, ExtractError> {
    let doc = Html::parse_document(html);
    let selectors = adapter.selectors();

    let title = first_text(&doc, selectors.title);
    let company = first_text(&doc, selectors.company);
    let location = first_text(&doc, selectors.location);
    let description = first_text(&doc, selectors.description).unwrap_or_default();
    let requirements = all_texts(&doc, selectors.requirements);

    let tech_source = format!("{} {}", description, requirements.join(" "));
    let technologies = extract_technologies(&tech_source);
    let experience_years = extract_experience(&description);

    let posting = JobPosting {
        site: adapter.site(),
        url: url.to_string(),
        title: title.unwrap_or_default(),
        company,
        location,
        description,
        requirements,
        technologies,
        experience_years,
        extracted_at: chrono::Utc::now(),
    };

    if posting.is_valid() {
        Ok(posting)
    } else {
        Err(ExtractError::MissingRequiredFields {
            partial: Box::new(posting),
        })
    }
}

/// First non-empty text among the selector candidates, in table order.
fn first_text(doc: &Html, candidates: &[&str]) -> Option<String> {
    for candidate in candidates {
        // Selectors track live site markup and may go stale; a candidate
        // that no longer parses is skipped, never fatal.
        let Ok(selector) = Selector::parse(candidate) else {
            continue;
        };
        for element in doc.select(&selector) {
            let text = collapse_whitespace(&element.text().collect::<String>());
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// All non-empty texts across every candidate, preserving document order.
fn all_texts(doc: &Html, candidates: &[&str]) -> Vec<String> {
    let mut texts = Vec::new();
    for candidate in candidates {
        let Ok(selector) = Selector::parse(candidate) else {
            continue;
        };
        for element in doc.select(&selector) {
            let text = collapse_whitespace(&element.text().collect::<String>());
            if !text.is_empty() {
                texts.push(text);
            }
        }
    }
    texts
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Fixed technology vocabulary, by category: languages, frameworks,
// databases, cloud/tooling, architecture terms.
const TECH_NAMES: &[&str] = &[
    "JavaScript",
    "TypeScript",
    "Python",
    "Java",
    "C++",
    "C#",
    "Go",
    "Rust",
    "Ruby",
    "PHP",
    "Swift",
    "Kotlin",
    "Scala",
    "React",
    "Angular",
    "Vue",
    "Next.js",
    "Node.js",
    "Django",
    "Flask",
    "Spring",
    "Rails",
    "Express",
    "FastAPI",
    "PostgreSQL",
    "MySQL",
    "MongoDB",
    "Redis",
    "Elasticsearch",
    "DynamoDB",
    "Cassandra",
    "AWS",
    "Azure",
    "GCP",
    "Docker",
    "Kubernetes",
    "Terraform",
    "Jenkins",
    "CircleCI",
    "GraphQL",
    "REST",
    "Microservices",
    "Machine Learning",
    "Data Science",
];

fn tech_matchers() -> &'static Vec<(&'static str, Regex)> {
    static MATCHERS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        TECH_NAMES
            .iter()
            .filter_map(|name| {
                // Word boundaries only make sense next to word characters;
                // names like "C++" and "C#" end mid-symbol.
                let prefix = if name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
                    r"\b"
                } else {
                    ""
                };
                let suffix = if name.ends_with(|c: char| c.is_ascii_alphanumeric()) {
                    r"\b"
                } else {
                    ""
                };
                let pattern = format!("(?i){}{}{}", prefix, regex::escape(name), suffix);
                Regex::new(&pattern).ok().map(|re| (*name, re))
            })
            .collect()
    })
}

/// Match the fixed technology vocabulary against free text, returning a
/// deduplicated, canonically-cased set. Idempotent by construction.
pub fn extract_technologies(text: &str) -> Vec<String> {
    let mut found = BTreeSet::new();
    for (canonical, re) in tech_matchers() {
        if re.is_match(text) {
            found.insert((*canonical).to_string());
        }
    }
    found.into_iter().collect()
}

fn experience_matchers() -> &'static Vec<Regex> {
    static MATCHERS: OnceLock<Vec<Regex>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        [
            // "5+ years of React and Node.js experience" -- the gap must
            // admit dotted names like Node.js, so only clause breaks stop it
            r"(?i)\b(\d{1,2})\s*\+?\s*(?:years?|yrs?)\b[^;\n]{0,80}?\b(?:experience|exp)\b",
            // "experience: 5+ years"
            r"(?i)\bexperience\b[^;\n]{0,40}?\b(\d{1,2})\s*\+?\s*(?:years?|yrs?)\b",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Largest years-of-experience figure mentioned in the text, if any.
pub fn extract_experience(text: &str) -> Option<u32> {
    let mut max_years: Option<u32> = None;
    for re in experience_matchers() {
        for caps in re.captures_iter(text) {
            if let Some(years) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                max_years = Some(max_years.map_or(years, |m| m.max(years)));
            }
        }
    }
    max_years
}

/// Poll a predicate until it produces a value or the window closes.
pub fn wait_for<T>(
    timeout: Duration,
    interval: Duration,
    mut probe: impl FnMut() -> Option<T>,
) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe() {
            return Some(value);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(interval);
    }
}

pub struct PageFetcher {
    client: reqwest::blocking::Client,
}

impl PageFetcher {
    pub fn new() -> Result<Self, ExtractError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(
                "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
            )
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ExtractError::Fetch(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn fetch(&self, url: &str) -> Result<String, ExtractError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| ExtractError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExtractError::Fetch(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }
        response
            .text()
            .map_err(|e| ExtractError::Fetch(e.to_string()))
    }

    /// Fetch a job page and extract it, tolerating slow-rendering content:
    /// while the title is missing the page is re-fetched until the wait
    /// window closes, then the best partial result is reported.
    pub fn fetch_posting(&self, url: &str) -> Result<JobPosting, ExtractError> {
        if sites::detect(url).is_none() {
            return Err(ExtractError::UnsupportedSite(url.to_string()));
        }

        let mut last_error: Option<ExtractError> = None;
        let posting = wait_for(WAIT_TIMEOUT, WAIT_INTERVAL, || {
            match self.fetch(url).and_then(|html| extract_job(&html, url)) {
                Ok(posting) => Some(posting),
                Err(e) => {
                    debug!(error = %e, "extraction not ready, retrying");
                    last_error = Some(e);
                    None
                }
            }
        });

        match posting {
            Some(posting) => Ok(posting),
            None => match last_error {
                Some(ExtractError::MissingRequiredFields { partial }) => {
                    if is_empty_partial(&partial) {
                        Err(ExtractError::ContentNotLoaded(WAIT_TIMEOUT))
                    } else {
                        Err(ExtractError::MissingRequiredFields { partial })
                    }
                }
                Some(e) => Err(e),
                None => Err(ExtractError::ContentNotLoaded(WAIT_TIMEOUT)),
            },
        }
    }
}

fn is_empty_partial(posting: &JobPosting) -> bool {
    posting.company.is_none()
        && posting.description.is_empty()
        && posting.requirements.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINKEDIN_URL: &str = "https://www.linkedin.com/jobs/view/123456";

    const LINKEDIN_HTML: &str = r#"<html><body>
        <h1 class="t-24 t-bold">Senior Backend Engineer</h1>
        <div class="job-details-jobs-unified-top-card__company-name">Acme Corp</div>
        <div class="jobs-description__content">
            <p>We build services in Go with PostgreSQL and Redis.
               5+ years of experience with distributed systems required.</p>
            <ul>
                <li>Experience with Docker</li>
                <li>Knowledge of Kubernetes</li>
            </ul>
        </div>
    </body></html>"#;

    const NO_TITLE_HTML: &str = r#"<html><body>
        <div class="job-details-jobs-unified-top-card__company-name">Acme Corp</div>
        <div class="jobs-description__content"><p>Some description text.</p></div>
    </body></html>"#;

    #[test]
    fn test_extract_linkedin_posting() {
        let posting = extract_job(LINKEDIN_HTML, LINKEDIN_URL).unwrap();
        assert_eq!(posting.title, "Senior Backend Engineer");
        assert_eq!(posting.company.as_deref(), Some("Acme Corp"));
        assert_eq!(posting.site, crate::models::Site::Linkedin);
        assert_eq!(
            posting.requirements,
            vec!["Experience with Docker", "Knowledge of Kubernetes"]
        );
        assert!(posting.technologies.contains(&"Go".to_string()));
        assert!(posting.technologies.contains(&"PostgreSQL".to_string()));
        assert!(posting.technologies.contains(&"Docker".to_string()));
        assert!(posting.technologies.contains(&"Kubernetes".to_string()));
        assert_eq!(posting.experience_years, Some(5));
    }

    #[test]
    fn test_missing_title_returns_partial() {
        let err = extract_job(NO_TITLE_HTML, LINKEDIN_URL).unwrap_err();
        match err {
            ExtractError::MissingRequiredFields { partial } => {
                assert_eq!(partial.company.as_deref(), Some("Acme Corp"));
                assert!(!partial.is_valid());
            }
            other => panic!("expected MissingRequiredFields, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_site() {
        let err = extract_job("<html></html>", "https://example.com/jobs/1").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedSite(_)));
    }

    #[test]
    fn test_extract_technologies_spec_example() {
        let techs =
            extract_technologies("5+ years of React and Node.js experience with PostgreSQL");
        assert_eq!(techs, vec!["Node.js", "PostgreSQL", "React"]);
    }

    #[test]
    fn test_extract_technologies_idempotent() {
        let text = "Rust, Go, Docker, Kubernetes, rust again, DOCKER";
        let first = extract_technologies(text);
        let second = extract_technologies(text);
        assert_eq!(first, second);
        assert_eq!(first, vec!["Docker", "Go", "Kubernetes", "Rust"]);
    }

    #[test]
    fn test_extract_technologies_symbol_names() {
        let techs = extract_technologies("We use C++ and C# daily");
        assert!(techs.contains(&"C++".to_string()));
        assert!(techs.contains(&"C#".to_string()));
    }

    #[test]
    fn test_extract_experience_spec_example() {
        let years =
            extract_experience("5+ years of React and Node.js experience with PostgreSQL");
        assert_eq!(years, Some(5));
    }

    #[test]
    fn test_extract_experience_keeps_maximum() {
        let years = extract_experience(
            "2 years of experience with Python, plus 7+ years of backend experience",
        );
        assert_eq!(years, Some(7));
    }

    #[test]
    fn test_extract_experience_none() {
        assert_eq!(extract_experience("No numbers here"), None);
    }

    #[test]
    fn test_wait_for_times_out() {
        let result: Option<()> = wait_for(
            Duration::from_millis(30),
            Duration::from_millis(10),
            || None,
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_wait_for_returns_value() {
        let mut calls = 0;
        let result = wait_for(Duration::from_millis(200), Duration::from_millis(5), || {
            calls += 1;
            (calls >= 3).then_some(calls)
        });
        assert_eq!(result, Some(3));
    }
}
