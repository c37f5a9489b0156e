//! Final text cleanup
//!
//! Runs once over the flat text of a rendered body. Empty variations and
//! markers leave behind doubled separators and blank lines; this removes them
//! without ever reordering content.

/// A lexical piece of the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Content(&'a str),
    Separator,
    Newline,
}

fn tokenize<'a>(text: &'a str, separator: &str) -> Vec<Token<'a>> {
    let mut tokens = Vec::new();
    for (n, line) in text.split('\n').enumerate() {
        if n > 0 {
            tokens.push(Token::Newline);
        }
        if separator.is_empty() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                tokens.push(Token::Content(trimmed));
            }
            continue;
        }
        for (i, piece) in line.split(separator).enumerate() {
            if i > 0 {
                tokens.push(Token::Separator);
            }
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                tokens.push(Token::Content(trimmed));
            }
        }
    }
    tokens
}

/// Drop separators that do not sit between two pieces of content
fn collapse_separators(tokens: Vec<Token<'_>>) -> Vec<Token<'_>> {
    let last_content = tokens.iter().rposition(|t| matches!(t, Token::Content(_)));
    let mut kept: Vec<Token<'_>> = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.into_iter().enumerate() {
        if token == Token::Separator {
            let after_content = matches!(
                kept.iter().rev().find(|t| **t != Token::Newline),
                Some(Token::Content(_))
            );
            let before_content = last_content.is_some_and(|last| i < last);
            if !after_content || !before_content {
                continue;
            }
        }
        kept.push(token);
    }
    kept
}

/// Normalize `text` using `separator` as the list token (usually `,`)
///
/// - line-edge whitespace trimmed
/// - separator runs collapsed to one, also across line breaks
/// - separators stripped from the start and end of the text
/// - exactly one space after a separator, none before
/// - two or more blank lines collapsed to one
/// - leading and trailing blank lines dropped
pub fn normalize(text: &str, separator: &str) -> String {
    let separator = separator.trim();
    let normalized = text.replace("\r\n", "\n");
    let tokens = collapse_separators(tokenize(&normalized, separator));

    let mut lines: Vec<String> = vec![String::new()];
    let mut tokens = tokens.into_iter().peekable();
    while let Some(token) = tokens.next() {
        let Some(line) = lines.last_mut() else { break };
        match token {
            Token::Content(content) => line.push_str(content),
            Token::Separator => {
                line.push_str(separator);
                if matches!(tokens.peek(), Some(Token::Content(_))) {
                    line.push(' ');
                }
            }
            Token::Newline => lines.push(String::new()),
        }
    }

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for line in &lines {
        let mut line = line.trim();
        // A line holding only a separator separates nothing
        if line == separator {
            line = "";
        }
        if line.is_empty() && out.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_collapses_empty_slots() {
        assert_eq!(normalize("masterpiece, , 1girl,, smiling ,detailed", ","), "masterpiece, 1girl, smiling, detailed");
    }

    #[test]
    fn test_strips_edge_separators() {
        assert_eq!(normalize(", , a, b, ", ","), "a, b");
        assert_eq!(normalize(",,,", ","), "");
        assert_eq!(normalize("", ","), "");
    }

    #[test]
    fn test_runs_across_line_breaks() {
        assert_eq!(normalize("a,\n, b", ","), "a,\nb");
        assert_eq!(normalize("a, \n  b, c", ","), "a,\nb, c");
    }

    #[test]
    fn test_blank_lines() {
        assert_eq!(normalize("\n\n a \n\n\n\n b \n\n", ","), "a\n\nb");
        assert_eq!(normalize("a\n , \nb", ","), "a\n\nb");
    }

    #[test]
    fn test_leftover_marker_gap() {
        assert_eq!(normalize("lowres, ", ","), "lowres");
        assert_eq!(normalize("a, , b", ","), "a, b");
    }

    #[test]
    fn test_other_separator() {
        assert_eq!(normalize("a | | b |", " | "), "a| b");
    }

    #[test]
    fn test_keeps_inner_spacing() {
        assert_eq!(normalize("<lora:detail:0.6>,  very   detailed", ","), "<lora:detail:0.6>, very   detailed");
    }

    fn words(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_ascii_alphabetic())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(text in "[a-c ,\n]{0,48}") {
            let once = normalize(&text, ",");
            prop_assert_eq!(normalize(&once, ","), once);
        }

        #[test]
        fn prop_normalize_preserves_content_order(text in "[a-c ,\n]{0,48}") {
            prop_assert_eq!(words(&normalize(&text, ",")), words(&text));
        }
    }
}
