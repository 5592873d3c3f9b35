mod ai;
mod cache;
mod db;
mod extract;
mod models;
mod parse;
mod progress;
mod sites;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::time::Duration;

use ai::Orchestrator;
use cache::CacheManager;
use db::Store;
use extract::{ExtractError, PageFetcher};
use models::{CompanyResearch, JobPosting, LastRun, PlayerProgress, ProjectIdea, Settings};

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Job posting research - extract postings, research companies, and generate portfolio project ideas")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the local store and player profile
    Init {
        /// Player name for the profile
        #[arg(short, long, default_value = "HERO_DEV")]
        name: String,
    },

    /// Extract a job posting from a URL or a saved HTML file
    Analyze {
        /// Job page URL, or path to a saved HTML file
        source: String,

        /// Original page URL (required when SOURCE is a file)
        #[arg(long)]
        url: Option<String>,

        /// Skip the extraction cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Research the hiring company behind a posting
    Research {
        /// Job page URL, or path to a saved HTML file
        source: String,

        /// Original page URL (required when SOURCE is a file)
        #[arg(long)]
        url: Option<String>,

        /// Skip caches and hit the provider directly
        #[arg(long)]
        no_cache: bool,
    },

    /// Generate and manage portfolio project ideas
    Ideas {
        #[command(subcommand)]
        command: IdeaCommands,
    },

    /// View and spend skill points
    Skills {
        #[command(subcommand)]
        command: SkillCommands,
    },

    /// Show the character sheet
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum IdeaCommands {
    /// Generate project ideas for a posting
    Generate {
        /// Job page URL, or path to a saved HTML file
        source: String,

        /// Original page URL (required when SOURCE is a file)
        #[arg(long)]
        url: Option<String>,

        /// Skip caches and hit the provider directly
        #[arg(long)]
        no_cache: bool,
    },

    /// Save a generated idea (by number) to the inventory
    Collect {
        /// Idea number from the last 'ideas generate' run
        number: usize,
    },

    /// List saved ideas
    List,

    /// Mark a saved idea completed and collect its skill points
    Complete {
        /// Saved idea number
        number: usize,
    },

    /// Remove a saved idea
    Drop {
        /// Saved idea number
        number: Option<usize>,

        /// Remove every saved idea
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum SkillCommands {
    /// List skills and levels
    List,

    /// Raise a skill one level (costs one point)
    Raise {
        /// Skill key, e.g. 'backend'
        skill: String,
    },

    /// Lower a skill one level (refunds one point)
    Lower {
        /// Skill key, e.g. 'backend'
        skill: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Update configuration values
    Set {
        /// Provider API key (validated before saving)
        #[arg(long)]
        api_key: Option<String>,

        /// Model used for research and idea generation
        #[arg(long)]
        model: Option<String>,

        /// Enable or disable response caching
        #[arg(long)]
        cache: Option<bool>,

        /// Run company research automatically after 'analyze'
        #[arg(long)]
        auto_research: Option<bool>,

        /// Research cache expiry, in hours
        #[arg(long)]
        cache_expiry: Option<u32>,

        /// Rename the player profile
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache entry counts and size
    Stats,

    /// Remove all cache entries
    Clear,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scout=warn")),
        )
        .init();

    let cli = Cli::parse();
    let store = Store::open()?;

    match cli.command {
        Commands::Init { name } => {
            store.init()?;
            if store.load_progress()?.is_none() {
                store.save_progress(&PlayerProgress::new(&name))?;
                println!("Store initialized at {}", store.path().display());
                println!("Player profile created: {}", name);
            } else {
                println!("Store at {} (player profile already exists)", store.path().display());
            }
        }

        Commands::Analyze { source, url, no_cache } => {
            store.ensure_initialized()?;
            let settings = store.load_settings()?;
            let job = load_posting(&store, &settings, &source, url.as_deref(), no_cache)?;
            display_job(&job);

            if settings.auto_research {
                println!();
                let research = run_research(&store, &settings, &job, no_cache)?;
                display_research(&research);
            }
        }

        Commands::Research { source, url, no_cache } => {
            store.ensure_initialized()?;
            let settings = store.load_settings()?;
            let job = load_posting(&store, &settings, &source, url.as_deref(), no_cache)?;
            display_job(&job);
            println!();
            let research = run_research(&store, &settings, &job, no_cache)?;
            display_research(&research);
        }

        Commands::Ideas { command } => {
            store.ensure_initialized()?;
            match command {
                IdeaCommands::Generate { source, url, no_cache } => {
                    let settings = store.load_settings()?;
                    let progress = require_progress(&store)?;
                    let job = load_posting(&store, &settings, &source, url.as_deref(), no_cache)?;

                    // Research feeds the prompt but is not required for it;
                    // a failed lookup degrades to generation without it.
                    let research = match run_research(&store, &settings, &job, no_cache) {
                        Ok(research) => Some(research),
                        Err(e) => {
                            println!("Company research unavailable ({e}), generating anyway.");
                            None
                        }
                    };

                    let orchestrator = Orchestrator::new(&settings)?;
                    let ideas =
                        orchestrator.generate_ideas(&job, research.as_ref(), &progress.skills)?;
                    if ideas.is_empty() {
                        println!("The model returned no usable project ideas. Try again.");
                    } else {
                        display_ideas(&ideas);
                        println!(
                            "Run 'scout ideas collect <n>' to save an idea to your inventory."
                        );
                        store.save_last_run(&LastRun { job, ideas })?;
                    }
                }

                IdeaCommands::Collect { number } => {
                    let last_run = store
                        .load_last_run()?
                        .ok_or_else(|| anyhow!("No generated ideas yet. Run 'scout ideas generate' first."))?;
                    let idea = last_run
                        .ideas
                        .get(number.wrapping_sub(1))
                        .ok_or_else(|| {
                            anyhow!(
                                "No idea #{} in the last run ({} available)",
                                number,
                                last_run.ideas.len()
                            )
                        })?
                        .clone();

                    let mut progress = require_progress(&store)?;
                    let company = last_run.job.company.clone().unwrap_or_default();
                    progress.save_idea(idea.clone(), &company, &last_run.job.title);
                    store.save_progress(&progress)?;
                    println!(
                        "Collected '{}' ({} point{} on completion)",
                        idea.title,
                        idea.difficulty.points(),
                        if idea.difficulty.points() == 1 { "" } else { "s" }
                    );
                }

                IdeaCommands::List => {
                    let progress = require_progress(&store)?;
                    if progress.saved_ideas.is_empty() {
                        println!("Inventory is empty. Generate and collect ideas first.");
                    } else {
                        for (i, saved) in progress.saved_ideas.iter().enumerate() {
                            let marker = if saved.completed { "x" } else { " " };
                            println!(
                                "[{}] #{} {} ({}, {} - {})",
                                marker,
                                i + 1,
                                saved.idea.title,
                                saved.idea.difficulty,
                                saved.company,
                                saved.job_title
                            );
                            for line in textwrap::wrap(&saved.idea.description, 72) {
                                println!("        {}", line);
                            }
                        }
                    }
                }

                IdeaCommands::Complete { number } => {
                    let mut progress = require_progress(&store)?;
                    let awarded = progress.complete_idea(number)?;
                    store.save_progress(&progress)?;
                    if awarded == 0 {
                        println!("Idea #{} was already completed. No points awarded.", number);
                    } else {
                        println!(
                            "Completed idea #{}. +{} skill point{} (available: {})",
                            number,
                            awarded,
                            if awarded == 1 { "" } else { "s" },
                            progress.available_points
                        );
                    }
                }

                IdeaCommands::Drop { number, all } => {
                    let mut progress = require_progress(&store)?;
                    if all {
                        let count = progress.saved_ideas.len();
                        progress.saved_ideas.clear();
                        store.save_progress(&progress)?;
                        println!("Dropped {} saved idea(s).", count);
                    } else if let Some(number) = number {
                        let removed = progress.remove_idea(number)?;
                        store.save_progress(&progress)?;
                        println!("Dropped '{}'.", removed.idea.title);
                    } else {
                        println!("Pass an idea number or --all.");
                    }
                }
            }
        }

        Commands::Skills { command } => {
            store.ensure_initialized()?;
            match command {
                SkillCommands::List => {
                    let progress = require_progress(&store)?;
                    println!("Available points: {}\n", progress.available_points);
                    println!("{:<16} {:<20} {:<12} DESCRIPTION", "KEY", "NAME", "LEVEL");
                    println!("{}", "-".repeat(78));
                    for skill in progress::SKILLS {
                        let level = progress.skill_level(skill.key);
                        println!(
                            "{:<16} {:<20} {:<12} {}",
                            skill.key,
                            skill.name,
                            level_bar(level),
                            skill.description
                        );
                    }
                }

                SkillCommands::Raise { skill } => {
                    let mut progress = require_progress(&store)?;
                    if progress.raise_skill(&skill)? {
                        store.save_progress(&progress)?;
                        println!(
                            "{} is now level {} (available points: {})",
                            skill,
                            progress.skill_level(&skill),
                            progress.available_points
                        );
                    } else {
                        println!("{} is already at the maximum level.", skill);
                    }
                }

                SkillCommands::Lower { skill } => {
                    let mut progress = require_progress(&store)?;
                    if progress.lower_skill(&skill)? {
                        store.save_progress(&progress)?;
                        println!(
                            "{} is now level {} (available points: {})",
                            skill,
                            progress.skill_level(&skill),
                            progress.available_points
                        );
                    } else {
                        println!("{} is already at level 0.", skill);
                    }
                }
            }
        }

        Commands::Status => {
            store.ensure_initialized()?;
            let progress = require_progress(&store)?;
            let completed = progress.saved_ideas.iter().filter(|i| i.completed).count();
            println!("{} - {}", progress.name, progress.character_class());
            println!("Level {} ({} XP)", progress.player_level(), progress.total_xp());
            println!("Power level:      {}", progress.power_level());
            println!("Available points: {}", progress.available_points);
            println!(
                "Strongest skill:  {}",
                progress.strongest_skill().unwrap_or("---")
            );
            println!(
                "Saved ideas:      {} ({} completed)",
                progress.saved_ideas.len(),
                completed
            );
        }

        Commands::Config { command } => {
            store.ensure_initialized()?;
            match command {
                ConfigCommands::Show => {
                    let settings = store.load_settings()?;
                    println!("api_key:       {}", mask_key(&settings.api_key));
                    println!("model:         {}", settings.model);
                    println!("cache:         {}", settings.enable_cache);
                    println!("auto_research: {}", settings.auto_research);
                    println!("cache_expiry:  {}h", settings.cache_expiry_hours);
                }

                ConfigCommands::Set {
                    api_key,
                    model,
                    cache,
                    auto_research,
                    cache_expiry,
                    name,
                } => {
                    let mut settings = store.load_settings()?;

                    if let Some(api_key) = api_key {
                        println!("Validating API key...");
                        ai::validate_api_key(&api_key)
                            .context("API key validation failed; nothing saved")?;
                        println!("API key valid.");
                        settings.api_key = api_key;
                    }
                    if let Some(model) = model {
                        settings.model = model;
                    }
                    if let Some(cache) = cache {
                        settings.enable_cache = cache;
                    }
                    if let Some(auto_research) = auto_research {
                        settings.auto_research = auto_research;
                    }
                    if let Some(cache_expiry) = cache_expiry {
                        settings.cache_expiry_hours = cache_expiry;
                    }
                    store.save_settings(&settings)?;

                    if let Some(name) = name {
                        let mut progress = require_progress(&store)?;
                        progress.name = name.trim().to_uppercase();
                        store.save_progress(&progress)?;
                    }
                    println!("Configuration saved.");
                }
            }
        }

        Commands::Cache { command } => {
            store.ensure_initialized()?;
            let settings = store.load_settings()?;
            let cache = CacheManager::new(&store, research_ttl(&settings));
            match command {
                CacheCommands::Stats => {
                    let stats = cache.stats()?;
                    println!("Entries: {} total", stats.total_entries);
                    println!("  valid:   {}", stats.valid_entries);
                    println!("  expired: {}", stats.expired_entries);
                    println!("Size: {:.2} KB", stats.total_bytes as f64 / 1024.0);
                }
                CacheCommands::Clear => {
                    let removed = cache.clear_all()?;
                    println!("Removed {} cache entr{}.", removed, if removed == 1 { "y" } else { "ies" });
                }
            }
        }
    }

    Ok(())
}

fn research_ttl(settings: &Settings) -> Duration {
    Duration::from_secs(u64::from(settings.cache_expiry_hours) * 3600)
}

fn require_progress(store: &Store) -> Result<PlayerProgress> {
    store
        .load_progress()?
        .ok_or_else(|| anyhow!("No player profile. Run 'scout init' first."))
}

/// Get a posting from the extraction cache, a live page, or a saved HTML
/// file. Partial extractions are shown before the error is reported.
fn load_posting(
    store: &Store,
    settings: &Settings,
    source: &str,
    url_override: Option<&str>,
    no_cache: bool,
) -> Result<JobPosting> {
    let cache = CacheManager::new(store, cache::JOB_TTL);
    let use_cache = settings.enable_cache && !no_cache;

    let result = if Path::new(source).is_file() {
        let url = url_override.ok_or_else(|| {
            anyhow!("Pass --url with the original posting URL when SOURCE is a saved HTML file.")
        })?;
        let html = std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read {}", source))?;
        extract::extract_job(&html, url)
    } else {
        let key = CacheManager::generate_key("job", &[source]);
        if use_cache {
            if let Some(job) = cache.get::<JobPosting>(&key) {
                return Ok(job);
            }
        }
        let fetched = PageFetcher::new()?.fetch_posting(source);
        if let Ok(job) = &fetched {
            if use_cache {
                cache.set(&key, job, Some(cache::JOB_TTL))?;
            }
        }
        fetched
    };

    match result {
        Ok(job) => Ok(job),
        Err(ExtractError::MissingRequiredFields { partial }) => {
            println!("Partial extraction only:");
            display_job(&partial);
            Err(anyhow!("No job title found on the page; cannot continue."))
        }
        Err(e) => Err(e.into()),
    }
}

fn run_research(
    store: &Store,
    settings: &Settings,
    job: &JobPosting,
    no_cache: bool,
) -> Result<CompanyResearch> {
    let cache = CacheManager::new(store, research_ttl(settings));
    let use_cache = settings.enable_cache && !no_cache;
    let company = job.company.as_deref().unwrap_or_default();
    let key = CacheManager::generate_key("research", &[company, &job.title]);

    if use_cache {
        if let Some(research) = cache.get::<CompanyResearch>(&key) {
            return Ok(research);
        }
    }

    println!("Researching {}...", if company.is_empty() { "the hiring company" } else { company });
    let orchestrator = Orchestrator::new(settings)?;
    let research = orchestrator.research_company(job)?;
    if use_cache {
        cache.set(&key, &research, None)?;
    }
    Ok(research)
}

// --- Display helpers ---

fn display_job(job: &JobPosting) {
    if job.title.is_empty() {
        println!("Title: (not found)");
    } else {
        println!("Title: {}", job.title);
    }
    println!("Site: {}", job.site);
    if let Some(company) = &job.company {
        println!("Company: {}", company);
    }
    if let Some(location) = &job.location {
        println!("Location: {}", location);
    }
    if let Some(years) = job.experience_years {
        println!("Experience: {}+ years", years);
    }
    if !job.technologies.is_empty() {
        println!("Technologies: {}", job.technologies.join(", "));
    }
    if !job.requirements.is_empty() {
        println!("Requirements:");
        for requirement in job.requirements.iter().take(8) {
            println!("  - {}", truncate(requirement, 74));
        }
    }
}

fn display_research(research: &CompanyResearch) {
    println!("=== {} ===", research.company);
    if let Some(website) = &research.website {
        println!("Website: {}", website);
    }
    if let Some(blog) = &research.engineering_blog {
        println!("Engineering blog: {}", blog);
    }
    if let Some(github) = &research.github_org {
        println!("GitHub: {}", github);
    }
    if !research.tech_stack.is_empty() {
        println!("Tech stack: {}", research.tech_stack.join(", "));
    }
    if !research.recent_projects.is_empty() {
        println!("Recent initiatives:");
        for project in &research.recent_projects {
            println!("  {} - {}", project.name, truncate(&project.description, 60));
        }
    }
    if !research.insights.is_empty() {
        println!("Insights:");
        for insight in &research.insights {
            for line in textwrap::wrap(insight, 72) {
                println!("  {}", line);
            }
        }
    }
    if !research.sources.is_empty() {
        println!("Sources:");
        for source in &research.sources {
            println!("  {} <{}>", source.title, source.url);
        }
    }
}

fn display_ideas(ideas: &[ProjectIdea]) {
    for (i, idea) in ideas.iter().enumerate() {
        println!("#{} {} [{}]", i + 1, idea.title, idea.difficulty);
        for line in textwrap::wrap(&idea.description, 74) {
            println!("    {}", line);
        }
        if !idea.technologies.is_empty() {
            println!("    Tech: {}", idea.technologies.join(", "));
        }
        if let Some(estimate) = &idea.time_estimate {
            println!("    Time: {}", estimate);
        }
        if let Some(standout) = &idea.standout_factor {
            println!("    Standout: {}", truncate(standout, 70));
        }
        if let Some(alignment) = &idea.company_alignment {
            println!("    Fit: {}", truncate(alignment, 70));
        }
        println!();
    }
}

fn level_bar(level: u32) -> String {
    let level = level.min(progress::MAX_SKILL_LEVEL) as usize;
    format!(
        "{}{} {:>2}",
        "#".repeat(level),
        ".".repeat(progress::MAX_SKILL_LEVEL as usize - level),
        level
    )
}

fn mask_key(key: &str) -> String {
    if key.is_empty() {
        "(not set)".to_string()
    } else if key.len() <= 8 {
        "*".repeat(key.len())
    } else {
        format!("{}...{}", &key[..4], &key[key.len() - 4..])
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
