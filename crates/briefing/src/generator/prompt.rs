//! Briefing prompt construction.

use crate::config::BriefingConfig;

/// Default number of top headlines requested.
pub const DEFAULT_HEADLINE_COUNT: usize = 3;

/// Default output language.
pub const DEFAULT_LANGUAGE: &str = "Korean";

/// Default industry the closing implications section addresses.
pub const DEFAULT_INDUSTRY: &str = "agri-food";

/// Service-wide knobs for the prompt. Per-user content comes from the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOptions {
    /// Language the briefing must be written in.
    pub language: String,
    /// Industry the implications section is written for.
    pub industry: String,
    /// Number of top headlines.
    pub headline_count: usize,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            industry: DEFAULT_INDUSTRY.to_string(),
            headline_count: DEFAULT_HEADLINE_COUNT,
        }
    }
}

/// Build the search-and-summarize instruction for one user.
#[must_use]
pub fn build_prompt(config: &BriefingConfig, options: &PromptOptions) -> String {
    let keywords = if config.keywords.is_empty() {
        "(none specified - cover the most important general news of the day)".to_string()
    } else {
        config.keywords.join(", ")
    };
    let sources = if config.sources.is_empty() {
        "(any reputable news outlet)".to_string()
    } else {
        config.sources.join(", ")
    };

    format!(
        r"Search for today's major news matching the keywords and sources below and write a news briefing.
Keywords: {keywords}
Sources: {sources}

Format:
1. Top {count} headlines
2. Detailed news (a summary of each item with its source name and link)
3. Implications for the {industry} industry

You must write the entire briefing in {language} and output it as HTML markup only.",
        count = options.headline_count,
        industry = options.industry,
        language = options.language,
    )
}
