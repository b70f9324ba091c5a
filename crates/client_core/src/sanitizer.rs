//! Cleaning and validation of free-text input. Pure functions, cheap enough to run
//! on every keystroke.

use std::sync::LazyLock;

use regex::Regex;

pub const MIN_QUESTION_LENGTH: usize = 2;
pub const MAX_QUESTION_LENGTH: usize = 200;

pub const MSG_EMPTY: &str = "Please enter a question";
pub const MSG_SQL: &str = "Invalid input detected. Please rephrase your question.";
pub const MSG_SCRIPT: &str = "Invalid characters detected. Please use plain text.";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("sanitizer patterns are valid")
}

static MARKUP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)<script\b.*?</script\s*>",
        r"<[^>]+>",
        r"(?i)javascript:",
        r"(?i)on\w+\s*=",
        r"(?i)data:",
        r"(?i)vbscript:",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static SQL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bselect\b.*\bfrom\b",
        r"(?i)\bdrop\b.*\btable\b",
        r"(?i)\bdelete\b.*\bfrom\b",
        r"(?i)\binsert\b.*\binto\b",
        r"(?i)\bupdate\b.*\bset\b",
        r"(?i)union.*select",
        r"(?i)exec\s*\(",
        r"(?i);\s*--",
        r"(?i)\bor\b\s+1\s*=\s*1",
        r"(?i)\band\b\s+1\s*=\s*1",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static SCRIPT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)eval\s*\(",
        r"(?i)alert\s*\(",
        r"(?i)document\.",
        r"(?i)window\.",
        r"(?i)<\s*iframe",
        r"(?i)<\s*embed",
        r"(?i)<\s*object",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

/// Strips script blocks, tags, inline event handlers and `javascript:`/`data:`/
/// `vbscript:` prefixes. Passes repeat until nothing changes, so removing one
/// construct cannot splice a new one together (`javajavascript:script:`).
pub fn sanitize(input: &str, trim: bool) -> String {
    let mut current = input.to_string();
    loop {
        let mut next = current.clone();
        for pattern in MARKUP_PATTERNS.iter() {
            next = pattern.replace_all(&next, "").into_owned();
        }
        if next == current {
            break;
        }
        current = next;
    }

    if trim {
        current.trim().to_string()
    } else {
        current
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub message: Option<String>,
    /// Always populated, even when invalid, so callers can keep the cleaned text.
    pub sanitized: String,
}

impl Validation {
    fn ok(sanitized: String) -> Self {
        Self {
            valid: true,
            message: None,
            sanitized,
        }
    }

    fn rejected(message: impl Into<String>, sanitized: String) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
            sanitized,
        }
    }
}

/// First violated rule wins: empty, too short, too long, SQL shape, script shape.
pub fn validate(input: &str) -> Validation {
    let sanitized = sanitize(input, true);
    let length = sanitized.chars().count();

    if length == 0 {
        return Validation::rejected(MSG_EMPTY, sanitized);
    }
    if length < MIN_QUESTION_LENGTH {
        return Validation::rejected(
            format!("Question too short (minimum {MIN_QUESTION_LENGTH} characters)"),
            sanitized,
        );
    }
    if length > MAX_QUESTION_LENGTH {
        return Validation::rejected(
            format!("Question too long (maximum {MAX_QUESTION_LENGTH} characters)"),
            sanitized,
        );
    }
    if SQL_PATTERNS.iter().any(|p| p.is_match(&sanitized)) {
        return Validation::rejected(MSG_SQL, sanitized);
    }
    if SCRIPT_PATTERNS.iter().any(|p| p.is_match(&sanitized)) {
        return Validation::rejected(MSG_SCRIPT, sanitized);
    }

    Validation::ok(sanitized)
}

/// Keystroke filter for the question box: untrimmed sanitisation, and the edit is
/// refused (returns `None`) once the text would exceed the maximum length.
pub fn accept_keystroke_input(input: &str) -> Option<String> {
    let sanitized = sanitize(input, false);
    (sanitized.chars().count() <= MAX_QUESTION_LENGTH).then_some(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOSTILE: &[&str] = &[
        "<script>alert('x')</script>hello",
        "<SCRIPT type=\"text/javascript\">\nsteal()\n</SCRIPT >after",
        "<img src=x onerror=alert(1)>",
        "click <a href=\"javascript:void(0)\">here</a>",
        "javajavascript:script:alert",
        "<<b>script>x</script>",
        "onclick = doThing()",
        "DATA:text/html;base64,AAAA",
        "vbscript:msgbox",
        "ononclick==x",
    ];

    #[test]
    fn removes_markup_and_protocols() {
        for input in HOSTILE {
            let out = sanitize(input, false);
            let lower = out.to_ascii_lowercase();
            assert!(!lower.contains("<script"), "{input:?} -> {out:?}");
            assert!(!lower.contains("javascript:"), "{input:?} -> {out:?}");
            assert!(!lower.contains("vbscript:"), "{input:?} -> {out:?}");
            assert!(!lower.contains("data:"), "{input:?} -> {out:?}");
            assert!(
                !MARKUP_PATTERNS.iter().any(|p| p.is_match(&out)),
                "{input:?} -> {out:?}"
            );
        }
    }

    #[test]
    fn sanitize_is_idempotent() {
        let mut inputs: Vec<&str> = HOSTILE.to_vec();
        inputs.extend(["  plain text  ", "", "a < b and c > d", "multi\nline\n"]);
        for input in inputs {
            for trim in [false, true] {
                let once = sanitize(input, trim);
                assert_eq!(sanitize(&once, trim), once, "{input:?} trim={trim}");
            }
        }
    }

    #[test]
    fn keeps_plain_text_and_newlines() {
        assert_eq!(sanitize("line one\nline two ", false), "line one\nline two ");
        assert_eq!(sanitize("  spaced  ", true), "spaced");
    }

    #[test]
    fn rejects_empty_and_short_and_long() {
        let empty = validate("");
        assert!(!empty.valid);
        assert_eq!(empty.message.as_deref(), Some(MSG_EMPTY));

        let whitespace = validate("   ");
        assert_eq!(whitespace.message.as_deref(), Some(MSG_EMPTY));

        let short = validate("a");
        assert!(!short.valid);
        assert_eq!(
            short.message.as_deref(),
            Some("Question too short (minimum 2 characters)")
        );

        let long = validate(&"x".repeat(201));
        assert!(!long.valid);
        assert_eq!(
            long.message.as_deref(),
            Some("Question too long (maximum 200 characters)")
        );

        assert!(validate(&"x".repeat(200)).valid);
    }

    #[test]
    fn rejects_sql_shapes() {
        for input in [
            "SELECT * FROM users",
            "drop the table please",
            "x' OR 1=1",
            "name; -- comment",
            "union all select password",
            "exec (xp_cmdshell)",
        ] {
            let result = validate(input);
            assert!(!result.valid, "{input}");
            assert_eq!(result.message.as_deref(), Some(MSG_SQL), "{input}");
        }
    }

    #[test]
    fn rejects_script_shapes_after_sanitising() {
        for input in ["eval (code)", "what is document.cookie", "window.location", "<iframe"] {
            let result = validate(input);
            assert!(!result.valid, "{input}");
            assert_eq!(result.message.as_deref(), Some(MSG_SCRIPT), "{input}");
        }
    }

    #[test]
    fn sanitized_text_is_returned_even_when_invalid() {
        let result = validate("<b>SELECT</b> name FROM staff");
        assert!(!result.valid);
        assert_eq!(result.sanitized, "SELECT name FROM staff");
    }

    #[test]
    fn accepts_ordinary_questions() {
        let result = validate("  How many vacation days do I get? ");
        assert!(result.valid);
        assert_eq!(result.message, None);
        assert_eq!(result.sanitized, "How many vacation days do I get?");
    }

    #[test]
    fn keystroke_filter_caps_length() {
        assert_eq!(
            accept_keystroke_input("hi <b>there</b> ").as_deref(),
            Some("hi there ")
        );
        assert!(accept_keystroke_input(&"y".repeat(201)).is_none());
    }
}
