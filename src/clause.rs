//! Clause head parsing.
//!
//! Recovers predicate indicators and argument bindings from a clause head text, either as
//! reported by the debugger (bound values) or as written in a source file (argument names).

use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::iter::Peekable;
use std::ops::Range;
use std::str::CharIndices;

/// Callable name with raw arguments text (text between the outer parentheses).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClauseHead {
    pub name: String,
    pub args: Option<String>,
}

impl ClauseHead {
    /// Top-level arguments of the head, empty for atoms.
    pub fn arguments(&self) -> Vec<String> {
        self.args
            .as_deref()
            .map(split_arguments)
            .unwrap_or_default()
    }

    pub fn arity(&self) -> usize {
        self.arguments().len()
    }
}

/// `name/arity` or `name//arity` identity of a callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateIndicator {
    pub name: String,
    pub arity: usize,
    pub is_non_terminal: bool,
}

impl Display for PredicateIndicator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sep = if self.is_non_terminal { "//" } else { "/" };
        write!(f, "{}{sep}{}", self.name, self.arity)
    }
}

/// Named argument with its bound value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentBinding {
    pub name: String,
    pub value: String,
}

impl ArgumentBinding {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Iterator over characters outside of quoted spans and comments.
///
/// Quoted atoms, strings, back-quoted texts, `0'c` character codes and comments are skipped
/// entirely (including delimiters), so structural characters found inside them are never
/// yielded.
struct Unquoted<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
    prev: Option<char>,
    prev_prev: Option<char>,
    comments: Vec<Range<usize>>,
}

impl<'a> Unquoted<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
            prev: None,
            prev_prev: None,
            comments: vec![],
        }
    }

    fn skip_quoted(&mut self, quote: char) {
        while let Some((_, c)) = self.chars.next() {
            match c {
                '\\' => {
                    self.chars.next();
                }
                c if c == quote => {
                    // doubled quote is an escaped quote
                    if self.chars.peek().map(|(_, c)| *c) == Some(quote) {
                        self.chars.next();
                    } else {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn skip_char_code(&mut self) {
        match self.chars.next() {
            Some((_, '\\')) => {
                self.chars.next();
            }
            Some((_, '\'')) => {
                if self.chars.peek().map(|(_, c)| *c) == Some('\'') {
                    self.chars.next();
                }
            }
            _ => {}
        }
    }

    fn skip_line_comment(&mut self, start: usize) {
        let end = self.text[start..]
            .find('\n')
            .map(|pos| start + pos)
            .unwrap_or(self.text.len());
        self.skip_until(end);
        self.comments.push(start..end);
    }

    fn skip_block_comment(&mut self, start: usize) {
        let end = self.text[start + 2..]
            .find("*/")
            .map(|pos| start + 2 + pos + 2)
            .unwrap_or(self.text.len());
        self.skip_until(end);
        self.comments.push(start..end);
    }

    fn skip_until(&mut self, end: usize) {
        while self.chars.peek().is_some_and(|(idx, _)| *idx < end) {
            self.chars.next();
        }
    }

    fn starts_char_code(&self) -> bool {
        self.prev == Some('0')
            && !self
                .prev_prev
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }
}

impl Iterator for Unquoted<'_> {
    type Item = (usize, char);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (idx, c) = self.chars.next()?;
            match c {
                '\'' if self.starts_char_code() => self.skip_char_code(),
                '\'' | '"' | '`' => self.skip_quoted(c),
                '%' => self.skip_line_comment(idx),
                '/' if self.text[idx..].starts_with("/*") => self.skip_block_comment(idx),
                _ => {
                    self.prev_prev = self.prev;
                    self.prev = Some(c);
                    return Some((idx, c));
                }
            }
            // skipped span acts as a separator for the char code detection
            self.prev_prev = self.prev;
            self.prev = Some(' ');
        }
    }
}

/// Extract callable name and raw arguments text.
///
/// The first open parenthesis outside of quotes starts the arguments, they end at the
/// matching close parenthesis. Unbalanced text yields everything after the open parenthesis.
pub fn parse_head(text: &str) -> ClauseHead {
    let text = text.trim();

    let mut open = None;
    let mut depth = 0usize;
    for (idx, c) in Unquoted::new(text) {
        match c {
            '(' => {
                if open.is_none() {
                    open = Some(idx);
                }
                depth += 1;
            }
            ')' if open.is_some() => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let start = open.unwrap_or_default();
                    return ClauseHead {
                        name: text[..start].trim().to_string(),
                        args: Some(text[start + 1..idx].to_string()),
                    };
                }
            }
            _ => {}
        }
    }

    match open {
        Some(start) => ClauseHead {
            name: text[..start].trim().to_string(),
            args: Some(text[start + 1..].to_string()),
        },
        None => ClauseHead {
            name: text.to_string(),
            args: None,
        },
    }
}

/// Split arguments text by top-level commas.
///
/// Compound terms, lists, curly terms and quoted spans are never split. Each argument is
/// trimmed. Blank text means zero arguments.
pub fn split_arguments(args: &str) -> Vec<String> {
    if args.trim().is_empty() {
        return vec![];
    }

    let mut result = vec![];
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in Unquoted::new(args) {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                result.push(args[start..idx].trim().to_string());
                start = idx + 1;
            }
            _ => {}
        }
    }
    result.push(args[start..].trim().to_string());
    result
}

/// Return 1-based line of a source text.
pub fn source_line(source: &str, line: usize) -> Option<&str> {
    source.lines().nth(line.checked_sub(1)?)
}

/// Locate the text of a clause head starting at a 1-based line.
///
/// The head may span several lines, it ends at the top-level neck (`:-` or `-->`) or at the
/// clause terminating full stop.
pub fn source_head(source: &str, line: usize) -> Option<String> {
    let start: usize = source
        .split_inclusive('\n')
        .take(line.checked_sub(1)?)
        .map(str::len)
        .sum();
    let rest = source.get(start..).filter(|rest| !rest.is_empty())?;

    let mut depth = 0usize;
    let mut end = rest.len();
    let mut chars = Unquoted::new(rest);
    while let Some((idx, c)) = chars.next() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 && rest[idx..].starts_with(":-") => {
                end = idx;
                break;
            }
            '-' if depth == 0 && rest[idx..].starts_with("-->") => {
                end = idx;
                break;
            }
            '.' if depth == 0
                && rest[idx + 1..]
                    .chars()
                    .next()
                    .map_or(true, |next| next.is_whitespace() || next == '%') =>
            {
                end = idx;
                break;
            }
            _ => {}
        }
    }

    let mut head = String::new();
    let mut pos = 0;
    for comment in chars.comments.iter().filter(|c| c.start < end) {
        head.push_str(&rest[pos..comment.start]);
        pos = comment.end.min(end);
    }
    head.push_str(&rest[pos..end]);

    let head = head.trim();
    (!head.is_empty()).then(|| head.to_string())
}

/// Build a predicate (or non-terminal) indicator for a clause head.
///
/// A head is a non-terminal one if the source line where it is defined contains `-->`.
pub fn indicator(head: &str, source_line: Option<&str>) -> PredicateIndicator {
    let head = parse_head(head);
    PredicateIndicator {
        arity: head.arity(),
        name: head.name,
        is_non_terminal: source_line.is_some_and(|line| line.contains("-->")),
    }
}

fn atom_text(name: &str) -> &str {
    name.strip_prefix('\'')
        .and_then(|n| n.strip_suffix('\''))
        .unwrap_or(name)
}

/// Pair argument names from a source clause head with values from a debugger reported head.
///
/// Falls back to synthetic names (`arg1`, `arg2`, ...) when the source head is unknown,
/// names another callable or has a different number of arguments.
pub fn reconcile(source_head: Option<&str>, bound_head: &str) -> Vec<ArgumentBinding> {
    let bound = parse_head(bound_head);
    let values = bound.arguments();

    let names = source_head
        .map(parse_head)
        .filter(|head| atom_text(&head.name) == atom_text(&bound.name))
        .map(|head| head.arguments())
        .filter(|names| names.len() == values.len());

    match names {
        Some(names) => names
            .into_iter()
            .zip(values)
            .map(|(name, value)| ArgumentBinding { name, value })
            .collect(),
        None => values
            .into_iter()
            .enumerate()
            .map(|(i, value)| ArgumentBinding::new(format!("arg{}", i + 1), value))
            .collect_vec(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_head() {
        struct TestCase {
            input: &'static str,
            name: &'static str,
            args: Option<&'static str>,
        }

        let cases = [
            TestCase {
                input: "foo(1, 2, [a,b,c])",
                name: "foo",
                args: Some("1, 2, [a,b,c]"),
            },
            TestCase {
                input: "  run  ",
                name: "run",
                args: None,
            },
            TestCase {
                input: "'a(b'(X)",
                name: "'a(b'",
                args: Some("X"),
            },
            TestCase {
                input: "f(')', \"(\", g(h(1))) :- true",
                name: "f",
                args: Some("')', \"(\", g(h(1))"),
            },
            TestCase {
                input: "bar(0'), X)",
                name: "bar",
                args: Some("0'), X"),
            },
            TestCase {
                input: "broken(a, b",
                name: "broken",
                args: Some("a, b"),
            },
        ];

        for tc in cases {
            let head = parse_head(tc.input);
            assert_eq!(head.name, tc.name, "input: {}", tc.input);
            assert_eq!(head.args.as_deref(), tc.args, "input: {}", tc.input);
        }
    }

    #[test]
    fn test_split_arguments() {
        struct TestCase {
            input: &'static str,
            expected: Vec<&'static str>,
        }

        let cases = [
            TestCase {
                input: "1, 2, [a,b,c]",
                expected: vec!["1", "2", "[a,b,c]"],
            },
            TestCase {
                input: "",
                expected: vec![],
            },
            TestCase {
                input: "   ",
                expected: vec![],
            },
            TestCase {
                input: "'a,b', 2",
                expected: vec!["'a,b'", "2"],
            },
            TestCase {
                input: "\"x, y\",g(a, b) , {p, q}",
                expected: vec!["\"x, y\"", "g(a, b)", "{p, q}"],
            },
            TestCase {
                input: "0',, 'it''s, fine', `a,b`",
                expected: vec!["0',", "'it''s, fine'", "`a,b`"],
            },
            TestCase {
                input: "[H|T], 'a\\'b,c'",
                expected: vec!["[H|T]", "'a\\'b,c'"],
            },
        ];

        for tc in cases {
            assert_eq!(split_arguments(tc.input), tc.expected, "input: {}", tc.input);
        }
    }

    #[test]
    fn test_quoted_comma_head() {
        assert_eq!(parse_head("f('a,b', 2)").arity(), 2);
    }

    #[test]
    fn test_indicator() {
        let ind = indicator("foo(X,Y)", Some("foo(X, Y) :- bar(X), baz(Y)."));
        assert_eq!(ind.to_string(), "foo/2");

        let ind = indicator("foo(X,Y)", Some("foo(X, Y) --> [X], bar(Y)."));
        assert_eq!(ind.to_string(), "foo//2");

        let ind = indicator("main", None);
        assert_eq!(ind.to_string(), "main/0");
    }

    #[test]
    fn test_source_head() {
        let source = "\
:- object(test).

foo(X, Y, Z) :-
    bar(X).

long(
    A,   % first
    'b.c'
) :- true.

fact(1).
digits(D) --> [D].
:- end_object.
";
        assert_eq!(source_head(source, 3).as_deref(), Some("foo(X, Y, Z)"));
        let long = source_head(source, 6).unwrap();
        assert_eq!(parse_head(&long).arguments(), vec!["A", "'b.c'"]);
        assert_eq!(source_head(source, 11).as_deref(), Some("fact(1)"));
        assert_eq!(source_head(source, 12).as_deref(), Some("digits(D)"));
        assert_eq!(source_head(source, 100), None);
        assert_eq!(source_head(source, 0), None);
    }

    #[test]
    fn test_source_line() {
        let source = "a.\nb --> c.\n";
        assert_eq!(source_line(source, 2), Some("b --> c."));
        assert_eq!(source_line(source, 0), None);
        assert_eq!(source_line(source, 3), None);
    }

    #[test]
    fn test_reconcile() {
        let bindings = reconcile(Some("foo(X, Y, Z)"), "foo(1, 2, [a,b,c])");
        assert_eq!(
            bindings,
            vec![
                ArgumentBinding::new("X", "1"),
                ArgumentBinding::new("Y", "2"),
                ArgumentBinding::new("Z", "[a,b,c]"),
            ]
        );
    }

    #[test]
    fn test_reconcile_fallback() {
        let expected = vec![
            ArgumentBinding::new("arg1", "v1"),
            ArgumentBinding::new("arg2", "v2"),
        ];

        // arity mismatch
        assert_eq!(reconcile(Some("foo(X, Y, Z)"), "foo(v1, v2)"), expected);
        // unknown source
        assert_eq!(reconcile(None, "foo(v1, v2)"), expected);
        // stale source, another callable at that line
        assert_eq!(reconcile(Some("bar(X, Y)"), "foo(v1, v2)"), expected);
        // zero arity
        assert!(reconcile(Some("run"), "run").is_empty());
    }

    #[test]
    fn test_reconcile_quoted_name() {
        let bindings = reconcile(Some("'my pred'(A)"), "'my pred'(42)");
        assert_eq!(bindings, vec![ArgumentBinding::new("A", "42")]);
        let bindings = reconcile(Some("'foo'(A)"), "foo(42)");
        assert_eq!(bindings, vec![ArgumentBinding::new("A", "42")]);
    }
}
