//! Argument vectors with masking.
//!
//! An `ArgumentList` is the ordered token list handed to the process runner.
//! Each token carries a `masked` flag: the clear text is what the process
//! receives, while every textual rendering (logs, dry runs, tests) shows
//! `******` in its place.

use std::fmt;

/// Placeholder rendered in place of a masked token.
pub const MASK: &str = "******";

/// A single argument with its masking policy.
#[derive(Clone, PartialEq, Eq)]
pub struct ArgumentToken {
    text: String,
    masked: bool,
}

impl ArgumentToken {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            masked: false,
        }
    }

    pub fn masked(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            masked: true,
        }
    }

    /// The clear value passed to the process.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_masked(&self) -> bool {
        self.masked
    }

    /// Log-safe rendering: masked tokens become `******`, tokens containing
    /// whitespace (or empty tokens) are wrapped in double quotes.
    pub fn render(&self) -> String {
        if self.masked {
            MASK.to_string()
        } else if self.text.is_empty() || self.text.contains(char::is_whitespace) {
            format!("\"{}\"", self.text)
        } else {
            self.text.clone()
        }
    }
}

impl fmt::Debug for ArgumentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentToken")
            .field("text", &if self.masked { MASK } else { self.text.as_str() })
            .field("masked", &self.masked)
            .finish()
    }
}

/// Ordered argument vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentList {
    tokens: Vec<ArgumentToken>,
}

impl ArgumentList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, text: impl Into<String>) -> &mut Self {
        self.tokens.push(ArgumentToken::plain(text));
        self
    }

    pub fn add_masked(&mut self, text: impl Into<String>) -> &mut Self {
        self.tokens.push(ArgumentToken::masked(text));
        self
    }

    /// Append `flag value`.
    pub fn add_option(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.add(flag).add(value)
    }

    /// Split `input` on shell-like word boundaries and append every word.
    pub fn add_tokenized(&mut self, input: &str) -> &mut Self {
        for word in split_words(input) {
            self.add(word);
        }
        self
    }

    pub fn tokens(&self) -> &[ArgumentToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// First token: the program to launch.
    pub fn program(&self) -> Option<&str> {
        self.tokens.first().map(ArgumentToken::text)
    }

    /// Clear values, in order, for process execution.
    pub fn to_vec(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.text.clone()).collect()
    }

    /// Masked, log-safe rendering of the whole command line.
    pub fn to_command_line(&self) -> String {
        self.tokens
            .iter()
            .map(ArgumentToken::render)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ArgumentList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_command_line())
    }
}

/// Split a string into words the way a POSIX shell would, without any
/// expansion: whitespace separates words, single quotes group literally,
/// double quotes group with backslash escapes, a bare backslash escapes
/// the next character. An unterminated quote runs to the end of input.
pub fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some(e @ ('"' | '\\' | '$' | '`')) => current.push(e),
                            Some(e) => {
                                current.push('\\');
                                current.push(e);
                            }
                            None => current.push('\\'),
                        },
                        _ => current.push(q),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(e) = chars.next() {
                    current.push(e);
                }
            }
            _ => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Wrap a value in double quotes when it contains whitespace so the tool
/// reads it back as a single word.
pub fn quote_if_spaced(value: &str) -> String {
    if value.contains(char::is_whitespace) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_rendering() {
        let mut args = ArgumentList::new();
        args.add("sshpass").add_masked("-pS3cret").add("ansible");
        assert_eq!(args.to_command_line(), "sshpass ****** ansible");
        assert_eq!(args.to_vec(), vec!["sshpass", "-pS3cret", "ansible"]);
    }

    #[test]
    fn test_debug_never_shows_masked_value() {
        let token = ArgumentToken::masked("hunter2");
        assert!(!format!("{:?}", token).contains("hunter2"));
    }

    #[test]
    fn test_spaced_tokens_are_quoted_in_rendering() {
        let mut args = ArgumentList::new();
        args.add("ansible").add_option("-a", "echo something");
        assert_eq!(args.to_command_line(), "ansible -a \"echo something\"");
    }

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("--check  --diff"), vec!["--check", "--diff"]);
        assert_eq!(
            split_words("-e 'a b' --x=\"c \\\"d\\\"\""),
            vec!["-e", "a b", "--x=c \"d\""]
        );
        assert_eq!(split_words("a\\ b"), vec!["a b"]);
        assert_eq!(split_words("''"), vec![""]);
        assert!(split_words("   ").is_empty());
    }

    #[test]
    fn test_quote_if_spaced() {
        assert_eq!(quote_if_spaced("bar"), "bar");
        assert_eq!(quote_if_spaced("hello world"), "\"hello world\"");
        assert_eq!(quote_if_spaced("say \"hi\" now"), "\"say \\\"hi\\\" now\"");
    }

    #[test]
    fn test_escape_single_quote_content() {
        assert_eq!(escape_single_quote_content("it's"), "it'\\''s");
    }
}
