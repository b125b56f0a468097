use std::ops::Range;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

pub const DEFAULT_PATTERN: &str = r"\{\{(.*?)\}\}";

const IMAGE_PREFIX: &str = "image:";

/// What a placeholder token asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    Text {
        name: String,
    },
    Image {
        name: String,
        width: Option<u32>,
        height: Option<u32>,
    },
}

impl Directive {
    pub fn name(&self) -> &str {
        match self {
            Directive::Text { name } | Directive::Image { name, .. } => name,
        }
    }

    pub fn kind(&self) -> DirectiveKind {
        match self {
            Directive::Text { .. } => DirectiveKind::Text,
            Directive::Image { .. } => DirectiveKind::Image,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DirectiveKind {
    Text,
    Image,
}

/// One token found in a paragraph's logical string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub directive: Directive,
}

impl Match {
    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Finds delimited placeholder tokens. The pattern's first capture group is
/// the inner token.
#[derive(Clone, Debug)]
pub struct Matcher {
    regex: Regex,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            regex: Regex::new(DEFAULT_PATTERN).expect("invalid default regex"),
        }
    }
}

impl Matcher {
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.trim().is_empty() {
            return Err(Error::InputValidation("placeholder pattern is empty".into()));
        }
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InputValidation(format!("invalid placeholder pattern: {e}")))?;
        if regex.captures_len() < 2 {
            return Err(Error::InputValidation(format!(
                "placeholder pattern {pattern:?} needs a capture group for the token name"
            )));
        }
        Ok(Self { regex })
    }

    /// Build a non-greedy pattern from literal open/close delimiters.
    pub fn with_delimiters(open: &str, close: &str) -> Result<Self> {
        if open.is_empty() || close.is_empty() {
            return Err(Error::InputValidation("delimiters must not be empty".into()));
        }
        Self::new(&format!("{}(.*?){}", regex::escape(open), regex::escape(close)))
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// All tokens in `text`, left to right, non-overlapping.
    pub fn find_all(&self, text: &str) -> Vec<Match> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let inner = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                Some(Match {
                    start: whole.start(),
                    end: whole.end(),
                    directive: parse_directive(inner),
                })
            })
            .collect()
    }
}

/// Classify an inner token. Malformed image directives fall back to a text
/// placeholder named by the whole token so they still show up in scans.
pub fn parse_directive(inner: &str) -> Directive {
    let token = inner.trim();
    let is_image = token
        .get(..IMAGE_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(IMAGE_PREFIX));
    if is_image {
        if let Some(image) = parse_image_args(&token[IMAGE_PREFIX.len()..]) {
            return image;
        }
        log::debug!("Malformed image directive {token:?}, treating as text");
    }
    Directive::Text {
        name: token.to_string(),
    }
}

fn parse_image_args(rest: &str) -> Option<Directive> {
    let mut parts = rest.split('|');
    let name = parts.next()?.trim();
    if name.is_empty() {
        return None;
    }
    let mut width = None;
    let mut height = None;
    for part in parts {
        let (key, value) = part.split_once(':')?;
        let value = value.trim().parse::<u32>().ok().filter(|v| *v > 0)?;
        let slot = match key.trim().to_ascii_lowercase().as_str() {
            "width" => &mut width,
            "height" => &mut height,
            _ => return None,
        };
        if slot.replace(value).is_some() {
            return None;
        }
    }
    Some(Directive::Image {
        name: name.to_string(),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(matches: &[Match]) -> Vec<&str> {
        matches.iter().map(|m| m.directive.name()).collect()
    }

    #[test]
    fn finds_text_tokens_left_to_right() {
        let m = Matcher::default().find_all("{{A}} and {{ B }}{{C}}");
        assert_eq!(names(&m), vec!["A", "B", "C"]);
        assert_eq!((m[0].start, m[0].end), (0, 5));
        assert_eq!((m[1].start, m[1].end), (10, 17));
    }

    #[test]
    fn non_greedy_match() {
        let m = Matcher::default().find_all("{{A}}}}");
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].end, 5);
    }

    #[test]
    fn image_directive_with_bounds() {
        let d = parse_directive("image:LOGO|width:200|height:150");
        assert_eq!(
            d,
            Directive::Image { name: "LOGO".into(), width: Some(200), height: Some(150) }
        );
    }

    #[test]
    fn image_directive_with_one_or_no_bounds() {
        assert_eq!(
            parse_directive("Image: Sig | HEIGHT:40"),
            Directive::Image { name: "Sig".into(), width: None, height: Some(40) }
        );
        assert_eq!(
            parse_directive("image:LOGO"),
            Directive::Image { name: "LOGO".into(), width: None, height: None }
        );
    }

    #[test]
    fn malformed_image_directive_falls_back_to_text() {
        for token in [
            "image:LOGO|width:abc",
            "image:LOGO|width:0",
            "image:LOGO|depth:3",
            "image:LOGO|width:1|width:2",
            "image:|width:10",
            "image:LOGO|width",
        ] {
            assert_eq!(parse_directive(token), Directive::Text { name: token.into() }, "{token}");
        }
    }

    #[test]
    fn custom_delimiters() {
        let matcher = Matcher::with_delimiters("[[", "]]").unwrap();
        let m = matcher.find_all("x [[NAME]] {{OTHER}}");
        assert_eq!(names(&m), vec!["NAME"]);
    }

    #[test]
    fn rejects_pattern_without_group() {
        assert!(matches!(Matcher::new(r"\{\{.*?\}\}"), Err(Error::InputValidation(_))));
        assert!(matches!(Matcher::new("("), Err(Error::InputValidation(_))));
    }
}
