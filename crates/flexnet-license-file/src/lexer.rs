//! Tokenizer for FlexNet license-file lines.
//!
//! Grounded on `examples/original_source/file.py::_flexnet_lex`: normalize line endings,
//! join backslash-continued lines, collapse whitespace runs, then tokenize each logical
//! line with shell-style quoting and an extended word-character set (`.,-/:;+^` in
//! addition to alphanumerics and `_`). The upstream lexer is Python's `shlex` in
//! non-POSIX mode, which leaves quote characters on the token instead of stripping them;
//! [`grammar`](crate::grammar) strips them back off when a `KEY=VALUE` pair is built, the
//! same way `file.py` calls `.strip('"')` after the fact.

const EXTRA_WORD_CHARS: &str = ".,-/:;+^";

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || EXTRA_WORD_CHARS.contains(c)
}

/// Splits one already-whitespace-collapsed line into shell-style tokens.
pub fn tokenize_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            if in_token {
                tokens.push(std::mem::take(&mut current));
                in_token = false;
            }
            chars.next();
        } else if c == '\'' || c == '"' {
            in_token = true;
            let quote = c;
            current.push(c);
            chars.next();
            for c2 in chars.by_ref() {
                current.push(c2);
                if c2 == quote {
                    break;
                }
            }
        } else if is_word_char(c) {
            in_token = true;
            current.push(c);
            chars.next();
        } else {
            if in_token {
                tokens.push(std::mem::take(&mut current));
                in_token = false;
            }
            tokens.push(c.to_string());
            chars.next();
        }
    }

    if in_token {
        tokens.push(current);
    }

    tokens
}

/// Normalizes, joins continuation lines, collapses whitespace, and tokenizes a whole
/// license-file text into one token list per non-empty logical line.
pub fn lex(text: &str) -> Vec<Vec<String>> {
    let normalized = text.replace("\r\n", "\n").replace("\\\n", "");

    normalized
        .split('\n')
        .map(collapse_whitespace)
        .map(|line| tokenize_line(&line))
        .filter(|tokens| !tokens.is_empty())
        .collect()
}

fn collapse_whitespace(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last_was_space = false;
    for c in line.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_increment_line() {
        let tokens = tokenize_line("INCREMENT widget acme 1.0 31-dec-2030 5");
        assert_eq!(tokens, vec!["INCREMENT", "widget", "acme", "1.0", "31-dec-2030", "5"]);
    }

    #[test]
    fn keeps_quotes_on_quoted_values() {
        let tokens = tokenize_line(r#"SIGN="ABCD""#);
        assert_eq!(tokens, vec!["SIGN", "=", r#""ABCD""#]);
    }

    #[test]
    fn joins_backslash_continuations_before_lexing() {
        let lines = lex("INCREMENT widget acme \\\n1.0 31-dec-2030 5\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0][3], "1.0");
    }

    #[test]
    fn collapses_runs_of_whitespace() {
        assert_eq!(collapse_whitespace("a   b\tc"), "a b c");
    }

    #[test]
    fn drops_empty_lines() {
        let lines = lex("\n\n   \nSERVER host 1234\n");
        assert_eq!(lines.len(), 1);
    }
}
