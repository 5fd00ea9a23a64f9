use regex::Regex;

/// Key lookup pattern.
///
/// Only leading and trailing `*` are meaningful:
/// `*abc*` contains, `abc*` prefix, `*abc` suffix, `abc` exact, `*` everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyPattern {
    #[default]
    All,
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl KeyPattern {
    pub fn parse(pattern: &str) -> Self {
        let (leading, rest) = match pattern.strip_prefix('*') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        let (trailing, body) = match rest.strip_suffix('*') {
            Some(body) => (true, body),
            None => (false, rest),
        };

        if body.is_empty() {
            return KeyPattern::All;
        }

        let body = body.to_string();
        match (leading, trailing) {
            (true, true) => KeyPattern::Contains(body),
            (false, true) => KeyPattern::Prefix(body),
            (true, false) => KeyPattern::Suffix(body),
            (false, false) => KeyPattern::Exact(body),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::All => true,
            KeyPattern::Exact(s) => key == s,
            KeyPattern::Prefix(s) => key.starts_with(s.as_str()),
            KeyPattern::Suffix(s) => key.ends_with(s.as_str()),
            KeyPattern::Contains(s) => key.contains(s.as_str()),
        }
    }

    /// Anchored expression for document queries
    pub fn to_regex(&self) -> Result<Regex, regex::Error> {
        let expr = match self {
            KeyPattern::All => String::new(),
            KeyPattern::Exact(s) => format!("^{}$", regex::escape(s)),
            KeyPattern::Prefix(s) => format!("^{}", regex::escape(s)),
            KeyPattern::Suffix(s) => format!("{}$", regex::escape(s)),
            KeyPattern::Contains(s) => regex::escape(s),
        };
        Regex::new(&expr)
    }

    /// Redis glob under a key namespace, with glob metacharacters escaped
    pub fn to_glob(&self, namespace: &str) -> String {
        let escape = |s: &str| {
            let mut out = String::with_capacity(s.len());
            for c in s.chars() {
                if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                    out.push('\\');
                }
                out.push(c);
            }
            out
        };
        let ns = escape(namespace);
        match self {
            KeyPattern::All => format!("{ns}*"),
            KeyPattern::Exact(s) => format!("{ns}{}", escape(s)),
            KeyPattern::Prefix(s) => format!("{ns}{}*", escape(s)),
            KeyPattern::Suffix(s) => format!("{ns}*{}", escape(s)),
            KeyPattern::Contains(s) => format!("{ns}*{}*", escape(s)),
        }
    }
}

impl From<&str> for KeyPattern {
    fn from(pattern: &str) -> Self {
        KeyPattern::parse(pattern)
    }
}
