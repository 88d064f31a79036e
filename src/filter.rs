use log::debug;
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
pub struct TreeFilter {
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Everything,
    Pattern(Regex),
    Nothing,
}

impl TreeFilter {
    pub fn compile(pattern: &str, is_regex: bool) -> Self {
        if pattern.trim().is_empty() {
            return Self {
                matcher: Matcher::Everything,
            };
        }

        let source = if is_regex {
            pattern.to_string()
        } else {
            wildcard_to_regex(pattern)
        };

        let matcher = match RegexBuilder::new(&source).case_insensitive(true).build() {
            Ok(regex) => Matcher::Pattern(regex),
            Err(err) => {
                debug!("filter pattern {pattern:?} rejected: {err}");
                Matcher::Nothing
            }
        };
        Self { matcher }
    }

    pub fn everything() -> Self {
        Self {
            matcher: Matcher::Everything,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.matcher, Matcher::Everything)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.matcher, Matcher::Nothing)
    }

    pub fn is_match(&self, name: &str) -> bool {
        match &self.matcher {
            Matcher::Everything => true,
            Matcher::Pattern(regex) => regex.is_match(name),
            Matcher::Nothing => false,
        }
    }
}

impl Default for TreeFilter {
    fn default() -> Self {
        Self::everything()
    }
}

fn wildcard_to_regex(pattern: &str) -> String {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    format!("^{escaped}$")
}
