//! Match highlighting
//!
//! Free-text searches ask the provider to wrap matched substrings in a pair
//! of sentinel markers. The markers are chosen so they cannot collide with
//! user content, letting the display layer find matches without ambiguity.

use serde::Serialize;

/// Default opening marker
pub const HIGHLIGHT_PRE_TAG: &str = "\u{2764}HL\u{1F498}DS\u{2764}";
/// Default closing marker
pub const HIGHLIGHT_POST_TAG: &str = "\u{2765}HL\u{1F498}DS\u{2765}";

/// Highlight request sent along with a listing query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub pre_tag: String,
    pub post_tag: String,
    /// Maximum fragments per field; 0 returns the whole field
    pub max_fragments: usize,
}

impl Default for Highlight {
    fn default() -> Self {
        Self {
            pre_tag: HIGHLIGHT_PRE_TAG.to_string(),
            post_tag: HIGHLIGHT_POST_TAG.to_string(),
            max_fragments: 0,
        }
    }
}

/// A piece of highlighted text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment<'a> {
    Plain(&'a str),
    Match(&'a str),
}

impl Highlight {
    /// Wrap `text` in the markers
    pub fn wrap(&self, text: &str) -> String {
        format!("{}{}{}", self.pre_tag, text, self.post_tag)
    }

    /// Split provider output into plain and matched fragments
    pub fn fragments<'a>(&self, text: &'a str) -> Vec<Fragment<'a>> {
        let mut out = Vec::new();
        let mut rest = text;

        while let Some(start) = rest.find(&self.pre_tag) {
            let after = &rest[start + self.pre_tag.len()..];
            let Some(end) = after.find(&self.post_tag) else {
                break;
            };

            if start > 0 {
                out.push(Fragment::Plain(&rest[..start]));
            }
            out.push(Fragment::Match(&after[..end]));
            rest = &after[end + self.post_tag.len()..];
        }

        if !rest.is_empty() {
            out.push(Fragment::Plain(rest));
        }
        out
    }

    /// Remove the markers, keeping the text
    pub fn strip(&self, text: &str) -> String {
        text.replace(&self.pre_tag, "").replace(&self.post_tag, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments() {
        let hl = Highlight::default();
        let text = format!("login {} from 10.0.0.1", hl.wrap("failed"));

        assert_eq!(
            hl.fragments(&text),
            vec![
                Fragment::Plain("login "),
                Fragment::Match("failed"),
                Fragment::Plain(" from 10.0.0.1"),
            ]
        );
        assert_eq!(hl.strip(&text), "login failed from 10.0.0.1");
    }

    #[test]
    fn test_unterminated_marker_is_plain() {
        let hl = Highlight::default();
        let text = format!("{}dangling", hl.pre_tag);

        assert_eq!(hl.fragments(&text), vec![Fragment::Plain(&text)]);
    }

    #[test]
    fn test_literal_brackets_are_not_markers() {
        let hl = Highlight::default();
        assert_eq!(hl.fragments("<em>x</em>"), vec![Fragment::Plain("<em>x</em>")]);
    }
}
