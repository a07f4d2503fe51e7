//! Command text parsing
//!
//! `/name arg "quoted arg" escaped\ arg` becomes a lowercased command name and
//! a list of arguments. Quotes group words, and a backslash makes the next
//! quote, space or backslash literal.

use crate::config::Settings;
use crate::error::{Error, Result};

/// A prefixed line split into name and arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased command token
    pub name: String,
    pub args: Vec<String>,
    /// Text after the prefix, unparsed
    pub raw: String,
    /// Issued with the silent prefix
    pub silent: bool,
}

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

/// Split the argument part of a command line
pub fn parse_parameters(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    // Whether the token just before an opening quote had content
    let mut content_before_quote = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&next) if next == '"' || next == ' ' || next == '\\' => {
                    current.push(next);
                    chars.next();
                }
                Some(&next) => {
                    current.push('\\');
                    current.push(next);
                    chars.next();
                }
                None => current.push('\\'),
            },
            '"' if in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                } else if content_before_quote {
                    args.push(String::new());
                }
                in_quotes = false;
            }
            '"' => {
                content_before_quote = !current.is_empty();
                if content_before_quote {
                    args.push(std::mem::take(&mut current));
                }
                in_quotes = true;
            }
            c if is_separator(c) && !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }
    args
}

/// Which prefix `input` starts with, if any; the longer prefix is tried first
fn strip_prefix<'a>(input: &'a str, settings: &Settings) -> Option<(&'a str, bool)> {
    let normal = settings.prefix();
    let silent = settings.silent_prefix();

    let mut candidates = [(normal, false), (silent, true)];
    candidates.sort_by_key(|(p, _)| std::cmp::Reverse(p.len()));

    candidates
        .iter()
        .find_map(|(prefix, is_silent)| input.strip_prefix(prefix).map(|rest| (rest, *is_silent)))
}

/// Parse a command line; `Ok(None)` when it carries no command prefix
pub fn parse_command(input: &str, settings: &Settings) -> Result<Option<ParsedCommand>> {
    let Some((rest, silent)) = strip_prefix(input, settings) else {
        return Ok(None);
    };

    if rest.is_empty() || rest.starts_with(is_separator) {
        return Err(Error::invalid(format!(
            "Invalid command entered. Type {}help for a list of valid commands.",
            settings.prefix()
        )));
    }

    let (name, remainder) = match rest.find(is_separator) {
        Some(index) => (&rest[..index], &rest[index..]),
        None => (rest, ""),
    };

    Ok(Some(ParsedCommand {
        name: name.to_lowercase(),
        args: parse_parameters(remainder),
        raw: rest.to_string(),
        silent,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(input: &str) -> Vec<String> {
        parse_parameters(input)
    }

    #[test]
    fn test_quotes_group_words() {
        assert_eq!(args(r#"hi "there you""#), vec!["hi", "there you"]);
    }

    #[test]
    fn test_escaped_space_is_literal() {
        assert_eq!(args(r"a\ b"), vec!["a b"]);
    }

    #[test]
    fn test_empty_quotes_yield_nothing() {
        assert!(args(r#""""#).is_empty());
        assert_eq!(args(r#"x """#), vec!["x"]);
    }

    #[test]
    fn test_empty_quotes_after_content_yield_empty_arg() {
        assert_eq!(args(r#"x"""#), vec!["x", ""]);
    }

    #[test]
    fn test_escapes() {
        assert_eq!(args(r#"say \"hello\""#), vec!["say", "\"hello\""]);
        assert_eq!(args(r"C:\\dir"), vec![r"C:\dir"]);
        // Unknown escapes keep the backslash
        assert_eq!(args(r"a\nb"), vec![r"a\nb"]);
        // A trailing lone backslash is kept
        assert_eq!(args("end\\"), vec!["end\\"]);
    }

    #[test]
    fn test_unknown_escape_keeps_pair_together() {
        assert_eq!(args("a\\\tb c"), vec!["a\\\tb", "c"]);
        assert_eq!(args("x \\\n"), vec!["x", "\\\n"]);
    }

    #[test]
    fn test_separators_collapse() {
        assert_eq!(args("  a \t b\n\nc  "), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unmatched_quote_flushes() {
        assert_eq!(args(r#"a "b c"#), vec!["a", "b c"]);
    }

    #[test]
    fn test_quote_in_word_splits() {
        assert_eq!(args(r#"ab"cd ef""#), vec!["ab", "cd ef"]);
    }

    #[test]
    fn test_parse_command() {
        let settings = Settings::default();

        let parsed = parse_command(r#"/Say hi "there you""#, &settings)
            .unwrap()
            .unwrap();
        assert_eq!(parsed.name, "say");
        assert_eq!(parsed.args, vec!["hi", "there you"]);
        assert!(!parsed.silent);

        let silent = parse_command(".help 2", &settings).unwrap().unwrap();
        assert!(silent.silent);
        assert_eq!(silent.args, vec!["2"]);

        let bare = parse_command("/who", &settings).unwrap().unwrap();
        assert_eq!(bare.name, "who");
        assert!(bare.args.is_empty());
    }

    #[test]
    fn test_parse_command_rejects_malformed() {
        let settings = Settings::default();
        assert!(parse_command("hello", &settings).unwrap().is_none());
        assert!(matches!(
            parse_command("/ help", &settings),
            Err(Error::InvalidArgument(_))
        ));
        assert!(parse_command("/", &settings).is_err());
    }

    #[test]
    fn test_custom_prefixes() {
        let settings = Settings {
            command_prefix: "!".into(),
            command_silent_prefix: "!!".into(),
            ..Settings::default()
        };

        let silent = parse_command("!!ban list", &settings).unwrap().unwrap();
        assert!(silent.silent);
        assert_eq!(silent.name, "ban");

        let normal = parse_command("!ban list", &settings).unwrap().unwrap();
        assert!(!normal.silent);
        assert!(parse_command("/ban", &settings).unwrap().is_none());
    }
}
