use crate::models::Site;

/// Ordered selector candidates per logical field. The first candidate that
/// matches a non-empty element wins; later entries cover older page markup.
pub struct FieldSelectors {
    pub title: &'static [&'static str],
    pub company: &'static [&'static str],
    pub location: &'static [&'static str],
    pub description: &'static [&'static str],
    pub requirements: &'static [&'static str],
}

/// One implementation per supported job board, selected by URL detection.
pub trait SiteAdapter: Sync {
    fn site(&self) -> Site;
    fn matches(&self, url: &str) -> bool;
    fn selectors(&self) -> &'static FieldSelectors;
}

pub struct Linkedin;
pub struct Indeed;
pub struct Glassdoor;

static LINKEDIN_SELECTORS: FieldSelectors = FieldSelectors {
    title: &[
        ".job-details-jobs-unified-top-card__job-title",
        ".t-24.t-bold",
    ],
    company: &[
        ".job-details-jobs-unified-top-card__company-name",
        ".job-details-jobs-unified-top-card__primary-description-container a",
    ],
    location: &[".job-details-jobs-unified-top-card__primary-description-container .tvm__text"],
    description: &[".jobs-description__content", ".jobs-box__html-content"],
    requirements: &[".jobs-description__content li"],
};

static INDEED_SELECTORS: FieldSelectors = FieldSelectors {
    title: &[
        ".jobsearch-JobInfoHeader-title",
        "[data-testid=\"jobsearch-JobInfoHeader-title\"]",
    ],
    company: &[
        ".jobsearch-InlineCompanyRating-companyHeader",
        "[data-testid=\"inlineHeader-companyName\"]",
    ],
    location: &[
        ".jobsearch-JobInfoHeader-subtitle .companyLocation",
        "[data-testid=\"job-location\"]",
    ],
    description: &["#jobDescriptionText"],
    requirements: &["#jobDescriptionText li"],
};

static GLASSDOOR_SELECTORS: FieldSelectors = FieldSelectors {
    title: &["[data-test=\"jobTitle\"]", ".JobDetails_jobTitle__Rw_gn"],
    company: &[
        "[data-test=\"employer-name\"]",
        ".JobDetails_companyName__bMEu8",
    ],
    location: &["[data-test=\"location\"]", ".JobDetails_location__mSg5h"],
    description: &[
        "[data-test=\"description\"]",
        ".JobDetails_jobDescription__uW_fK",
    ],
    requirements: &["[data-test=\"description\"] li"],
};

impl SiteAdapter for Linkedin {
    fn site(&self) -> Site {
        Site::Linkedin
    }

    fn matches(&self, url: &str) -> bool {
        url.contains("linkedin.com")
    }

    fn selectors(&self) -> &'static FieldSelectors {
        &LINKEDIN_SELECTORS
    }
}

impl SiteAdapter for Indeed {
    fn site(&self) -> Site {
        Site::Indeed
    }

    fn matches(&self, url: &str) -> bool {
        url.contains("indeed.com")
    }

    fn selectors(&self) -> &'static FieldSelectors {
        &INDEED_SELECTORS
    }
}

impl SiteAdapter for Glassdoor {
    fn site(&self) -> Site {
        Site::Glassdoor
    }

    fn matches(&self, url: &str) -> bool {
        url.contains("glassdoor.com")
    }

    fn selectors(&self) -> &'static FieldSelectors {
        &GLASSDOOR_SELECTORS
    }
}

static ADAPTERS: [&(dyn SiteAdapter); 3] = [&Linkedin, &Indeed, &Glassdoor];

/// Pick the adapter for a job page URL, if any board claims it.
pub fn detect(url: &str) -> Option<&'static dyn SiteAdapter> {
    ADAPTERS.iter().copied().find(|a| a.matches(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_linkedin() {
        let adapter = detect("https://www.linkedin.com/jobs/view/1234").unwrap();
        assert_eq!(adapter.site(), Site::Linkedin);
    }

    #[test]
    fn test_detect_indeed() {
        let adapter = detect("https://www.indeed.com/viewjob?jk=abc").unwrap();
        assert_eq!(adapter.site(), Site::Indeed);
    }

    #[test]
    fn test_detect_glassdoor() {
        let adapter = detect("https://www.glassdoor.com/job-listing/xyz").unwrap();
        assert_eq!(adapter.site(), Site::Glassdoor);
    }

    #[test]
    fn test_detect_unsupported() {
        assert!(detect("https://example.com/careers/42").is_none());
    }
}
