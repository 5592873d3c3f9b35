use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{PlayerProgress, ProjectIdea, SavedIdea};

pub const MAX_SKILL_LEVEL: u32 = 10;

pub struct SkillInfo {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const SKILLS: &[SkillInfo] = &[
    SkillInfo {
        key: "data-structures",
        name: "Data Structures",
        description: "Arrays, trees, graphs, hash tables",
    },
    SkillInfo {
        key: "algorithms",
        name: "Algorithms",
        description: "Sorting, searching, dynamic programming",
    },
    SkillInfo {
        key: "systems",
        name: "Systems / OS",
        description: "Operating systems, memory, processes",
    },
    SkillInfo {
        key: "databases",
        name: "Databases",
        description: "SQL, NoSQL, query optimization",
    },
    SkillInfo {
        key: "networking",
        name: "Networking",
        description: "TCP/IP, HTTP, APIs, security",
    },
    SkillInfo {
        key: "frontend",
        name: "Frontend",
        description: "HTML, CSS, JavaScript, React",
    },
    SkillInfo {
        key: "backend",
        name: "Backend",
        description: "Servers, APIs, microservices",
    },
    SkillInfo {
        key: "ai-ml",
        name: "AI / ML",
        description: "Machine learning, neural networks",
    },
    SkillInfo {
        key: "math",
        name: "Math / Probability",
        description: "Statistics, linear algebra, calculus",
    },
];

pub struct CharacterClass {
    pub min_power: u32,
    pub name: &'static str,
}

const CHARACTER_CLASSES: &[CharacterClass] = &[
    CharacterClass { min_power: 0, name: "Apprentice Dev" },
    CharacterClass { min_power: 10, name: "Junior Coder" },
    CharacterClass { min_power: 25, name: "Code Warrior" },
    CharacterClass { min_power: 40, name: "Senior Wizard" },
    CharacterClass { min_power: 60, name: "Tech Knight" },
    CharacterClass { min_power: 80, name: "Master Architect" },
    CharacterClass { min_power: 90, name: "Legendary Dev" },
];

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Unknown skill '{0}'. Run 'scout skills list' to see skill keys.")]
    UnknownSkill(String),

    #[error("No skill points available. Complete saved project ideas to earn points.")]
    NoPointsAvailable,

    #[error("No saved idea #{0}. Run 'scout ideas list' to see the inventory.")]
    NoSuchIdea(usize),
}

pub fn skill_info(key: &str) -> Option<&'static SkillInfo> {
    SKILLS.iter().find(|s| s.key == key)
}

impl PlayerProgress {
    pub fn new(name: &str) -> Self {
        let mut skills = BTreeMap::new();
        for skill in SKILLS {
            skills.insert(skill.key.to_string(), 0);
        }
        Self {
            name: name.to_string(),
            skills,
            available_points: 0,
            saved_ideas: Vec::new(),
        }
    }

    pub fn skill_level(&self, key: &str) -> u32 {
        self.skills.get(key).copied().unwrap_or(0)
    }

    /// Raise a skill one level. Costs one available point; at the level cap
    /// nothing changes and no point is spent. Returns whether the level
    /// moved.
    pub fn raise_skill(&mut self, key: &str) -> Result<bool, ProgressError> {
        let info = skill_info(key).ok_or_else(|| ProgressError::UnknownSkill(key.to_string()))?;
        let level = self.skill_level(info.key);
        if level >= MAX_SKILL_LEVEL {
            return Ok(false);
        }
        if self.available_points == 0 {
            return Err(ProgressError::NoPointsAvailable);
        }
        self.available_points -= 1;
        self.skills.insert(info.key.to_string(), level + 1);
        Ok(true)
    }

    /// Lower a skill one level, refunding the point. At zero nothing
    /// changes and nothing is refunded.
    pub fn lower_skill(&mut self, key: &str) -> Result<bool, ProgressError> {
        let info = skill_info(key).ok_or_else(|| ProgressError::UnknownSkill(key.to_string()))?;
        let level = self.skill_level(info.key);
        if level == 0 {
            return Ok(false);
        }
        self.skills.insert(info.key.to_string(), level - 1);
        self.available_points += 1;
        Ok(true)
    }

    pub fn save_idea(&mut self, idea: ProjectIdea, company: &str, job_title: &str) {
        self.saved_ideas.push(SavedIdea {
            idea,
            company: company.to_string(),
            job_title: job_title.to_string(),
            saved_at: chrono::Utc::now(),
            completed: false,
        });
    }

    /// Mark a saved idea (1-based, as listed) completed and award points by
    /// difficulty tier. Completing an already-completed idea awards
    /// nothing.
    pub fn complete_idea(&mut self, number: usize) -> Result<u32, ProgressError> {
        let idea = self
            .saved_ideas
            .get_mut(number.wrapping_sub(1))
            .ok_or(ProgressError::NoSuchIdea(number))?;
        if idea.completed {
            return Ok(0);
        }
        idea.completed = true;
        let awarded = idea.idea.difficulty.points();
        self.available_points += awarded;
        Ok(awarded)
    }

    pub fn remove_idea(&mut self, number: usize) -> Result<SavedIdea, ProgressError> {
        if number == 0 || number > self.saved_ideas.len() {
            return Err(ProgressError::NoSuchIdea(number));
        }
        Ok(self.saved_ideas.remove(number - 1))
    }

    // --- Character sheet derivations ---

    pub fn power_level(&self) -> u32 {
        self.skills.values().sum()
    }

    pub fn total_xp(&self) -> u32 {
        self.power_level() * 10
    }

    pub fn player_level(&self) -> u32 {
        (self.total_xp() as f64 / 10.0).sqrt() as u32 + 1
    }

    pub fn character_class(&self) -> &'static str {
        let power = self.power_level();
        let mut current = CHARACTER_CLASSES[0].name;
        for class in CHARACTER_CLASSES {
            if power >= class.min_power {
                current = class.name;
            }
        }
        current
    }

    pub fn strongest_skill(&self) -> Option<&'static str> {
        let (key, level) = self.skills.iter().max_by_key(|(_, level)| **level)?;
        if *level == 0 {
            return None;
        }
        skill_info(key).map(|s| s.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;

    fn idea(difficulty: Difficulty) -> ProjectIdea {
        ProjectIdea {
            title: "Test project".to_string(),
            description: "A test".to_string(),
            technologies: vec![],
            difficulty,
            time_estimate: None,
            standout_factor: None,
            company_alignment: None,
        }
    }

    #[test]
    fn test_new_player_has_all_skills_at_zero() {
        let player = PlayerProgress::new("DEV");
        assert_eq!(player.skills.len(), SKILLS.len());
        assert!(player.skills.values().all(|&l| l == 0));
        assert_eq!(player.available_points, 0);
    }

    #[test]
    fn test_raise_without_points_is_rejected() {
        let mut player = PlayerProgress::new("DEV");
        let err = player.raise_skill("backend").unwrap_err();
        assert!(matches!(err, ProgressError::NoPointsAvailable));
        assert_eq!(player.skill_level("backend"), 0);
    }

    #[test]
    fn test_raise_consumes_point_lower_refunds() {
        let mut player = PlayerProgress::new("DEV");
        player.available_points = 2;

        assert!(player.raise_skill("backend").unwrap());
        assert_eq!(player.skill_level("backend"), 1);
        assert_eq!(player.available_points, 1);

        assert!(player.lower_skill("backend").unwrap());
        assert_eq!(player.skill_level("backend"), 0);
        assert_eq!(player.available_points, 2);
    }

    #[test]
    fn test_points_invariant_across_raise_lower() {
        let mut player = PlayerProgress::new("DEV");
        player.available_points = 5;

        for _ in 0..3 {
            player.raise_skill("algorithms").unwrap();
        }
        player.raise_skill("backend").unwrap();
        player.lower_skill("algorithms").unwrap();
        player.raise_skill("databases").unwrap();

        let spent: u32 = player.skills.values().sum();
        assert_eq!(spent + player.available_points, 5);
    }

    #[test]
    fn test_level_clamped_at_cap() {
        let mut player = PlayerProgress::new("DEV");
        player.available_points = 15;
        for _ in 0..MAX_SKILL_LEVEL {
            assert!(player.raise_skill("math").unwrap());
        }
        // At the cap: no movement, no point spent.
        assert!(!player.raise_skill("math").unwrap());
        assert_eq!(player.skill_level("math"), MAX_SKILL_LEVEL);
        assert_eq!(player.available_points, 5);
    }

    #[test]
    fn test_lower_at_zero_does_not_refund() {
        let mut player = PlayerProgress::new("DEV");
        assert!(!player.lower_skill("math").unwrap());
        assert_eq!(player.available_points, 0);
    }

    #[test]
    fn test_unknown_skill() {
        let mut player = PlayerProgress::new("DEV");
        assert!(matches!(
            player.raise_skill("underwater-basket-weaving"),
            Err(ProgressError::UnknownSkill(_))
        ));
    }

    #[test]
    fn test_completion_awards_by_tier() {
        let mut player = PlayerProgress::new("DEV");
        player.save_idea(idea(Difficulty::Beginner), "Acme", "Engineer");
        player.save_idea(idea(Difficulty::Advanced), "Acme", "Engineer");

        assert_eq!(player.complete_idea(1).unwrap(), 1);
        assert_eq!(player.complete_idea(2).unwrap(), 3);
        assert_eq!(player.available_points, 4);
    }

    #[test]
    fn test_double_completion_awards_once() {
        let mut player = PlayerProgress::new("DEV");
        player.save_idea(idea(Difficulty::Intermediate), "Acme", "Engineer");

        assert_eq!(player.complete_idea(1).unwrap(), 2);
        assert_eq!(player.complete_idea(1).unwrap(), 0);
        assert_eq!(player.available_points, 2);
    }

    #[test]
    fn test_complete_missing_idea() {
        let mut player = PlayerProgress::new("DEV");
        assert!(matches!(
            player.complete_idea(1),
            Err(ProgressError::NoSuchIdea(1))
        ));
        assert!(matches!(
            player.complete_idea(0),
            Err(ProgressError::NoSuchIdea(0))
        ));
    }

    #[test]
    fn test_remove_idea() {
        let mut player = PlayerProgress::new("DEV");
        player.save_idea(idea(Difficulty::Beginner), "Acme", "Engineer");
        let removed = player.remove_idea(1).unwrap();
        assert_eq!(removed.company, "Acme");
        assert!(player.saved_ideas.is_empty());
    }

    #[test]
    fn test_character_sheet_derivations() {
        let mut player = PlayerProgress::new("DEV");
        assert_eq!(player.character_class(), "Apprentice Dev");
        assert_eq!(player.strongest_skill(), None);
        assert_eq!(player.player_level(), 1);

        player.available_points = 30;
        for _ in 0..10 {
            player.raise_skill("backend").unwrap();
        }
        for _ in 0..5 {
            player.raise_skill("databases").unwrap();
        }

        assert_eq!(player.power_level(), 15);
        assert_eq!(player.total_xp(), 150);
        assert_eq!(player.character_class(), "Junior Coder");
        assert_eq!(player.strongest_skill(), Some("Backend"));
    }
}
