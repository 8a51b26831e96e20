// src/pipeline/classify.rs

//! Title-based admission for video items.

/// Titles YouTube substitutes for videos that can no longer be watched.
pub const UNAVAILABLE_TITLES: [&str; 2] = ["Private video", "Deleted video"];

/// Keywords used when a video source configures none.
pub fn default_keywords() -> Vec<String> {
    ["trailer", "teaser", "official video"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Case-insensitive substring match on titles.
///
/// An empty keyword list admits every title that is not a sentinel.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    keywords: Vec<String>,
}

impl Classifier {
    pub fn new<S: AsRef<str>>(keywords: impl IntoIterator<Item = S>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_unavailable(title: &str) -> bool {
        UNAVAILABLE_TITLES.contains(&title.trim())
    }

    pub fn matches(&self, title: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let title = title.to_lowercase();
        self.keywords.iter().any(|k| title.contains(k.as_str()))
    }

    pub fn admits(&self, title: &str) -> bool {
        !Self::is_unavailable(title) && self.matches(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keywords() {
        let classifier = Classifier::new(default_keywords());
        assert!(classifier.admits("Dune: Part Three | Official Trailer"));
        assert!(classifier.admits("Artist - Song (Official Video)"));
        assert!(classifier.admits("TEASER #2"));
        assert!(!classifier.admits("Behind the scenes"));
    }

    #[test]
    fn test_keyword_examples() {
        let classifier = Classifier::new(default_keywords());
        assert!(classifier.admits("Movie X – Official Trailer"));
        assert!(classifier.admits("Artist Y Teaser"));
        assert!(!classifier.admits("Weekly Vlog #12"));
        assert!(!classifier.admits("Private video"));
    }

    #[test]
    fn test_sentinel_titles_rejected() {
        let classifier = Classifier::default();
        assert!(!classifier.admits("Private video"));
        assert!(!classifier.admits("Deleted video"));
        assert!(classifier.admits("Private video diaries"));
    }

    #[test]
    fn test_empty_keywords_admit_all() {
        let classifier = Classifier::new(Vec::<String>::new());
        assert!(classifier.admits("Anything at all"));

        let blank = Classifier::new(["  "]);
        assert!(blank.admits("Still anything"));
    }
}
