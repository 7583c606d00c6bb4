//! Keyword normalization, request path parsing and URL templates
//!
//! A request path such as `/.wiki/team/page` is split into a keyword
//! (`wiki/`), a display flag (the leading `.`) and a remainder
//! (`team/page`) that feeds the `{*}` placeholder of generative links.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::GoError;

/// Placeholder substituted with the wildcard capture
pub const WILDCARD: &str = "{*}";

fn is_sane_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.'
}

/// Lower-cases a keyword and checks its character set.
///
/// Only `[a-z0-9-.]` is allowed, plus a single trailing `/` marking a
/// generative keyword.
pub fn sanitize(keyword: &str) -> Result<String, GoError> {
    let lowered = keyword.to_lowercase();
    let body = lowered.strip_suffix('/').unwrap_or(&lowered);

    if body.is_empty() || !body.chars().all(is_sane_char) {
        return Err(GoError::InvalidKeyword(keyword.to_string()));
    }

    Ok(lowered)
}

/// A list name is a pattern when it carries regex syntax.
pub fn is_regex_name(name: &str) -> bool {
    name.starts_with('^') || name.contains('\\')
}

/// Replaces HTML-escaped ampersands with plain ones.
pub fn deampify(s: &str) -> String {
    s.replace("&amp;", "&")
}

/// Normalizes a user-supplied URL before it is stored.
///
/// Whitespace is stripped, `&amp;` becomes `&`, and bare `www.` hosts get an
/// `http://` scheme.
pub fn canonical_url(url: &str) -> String {
    let compact: String = url.split_whitespace().collect();
    let compact = deampify(&compact);

    if compact.starts_with("www.") {
        format!("http://{}", compact)
    } else {
        compact
    }
}

/// Rejects URLs that could never be sent back as a `Location` header.
///
/// Expects a URL already passed through [`canonical_url`], which has removed
/// all whitespace.
pub fn check_url(url: &str) -> Result<(), GoError> {
    if url.is_empty() {
        return Err(GoError::InvalidInput("URL required".to_string()));
    }
    if url.chars().any(char::is_control) {
        return Err(GoError::InvalidInput(
            "URL contains control characters".to_string(),
        ));
    }
    Ok(())
}

/// Variable values are pasted into URLs unescaped, so they follow the same
/// rule as URLs: no control characters and no line breaks.
pub fn check_variable_value(value: &str) -> Result<(), GoError> {
    if value.chars().any(char::is_control) {
        return Err(GoError::InvalidInput(
            "variable value contains control characters".to_string(),
        ));
    }
    Ok(())
}

/// Escapes a keyword for use in a path, keeping `/` intact.
pub fn escape_keyword(keyword: &str) -> String {
    escape_segments(keyword)
}

fn escape_segments(value: &str) -> String {
    value
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// A parsed redirect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordPath {
    /// Raw keyword, not yet sanitized; ends with `/` for generative lookups
    pub keyword: String,

    /// Percent-decoded path after the keyword, without leading slash
    pub remainder: String,

    /// Request asked for the list page instead of a redirect (`.keyword`)
    pub force_list: bool,
}

impl KeywordPath {
    /// Splits a request path into keyword and remainder.
    ///
    /// `/foo/bar/baz` looks up the generative keyword `foo/` with remainder
    /// `bar/baz`. `/.foo/` shows the `foo/` list, while `/foo/` is treated as
    /// plain `foo`.
    pub fn parse(path: &str) -> Self {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let (first, rest) = match trimmed.split_once('/') {
            Some((first, rest)) => (first, Some(rest)),
            None => (trimmed, None),
        };

        let mut keyword = decode(first).into_owned();
        let force_list = keyword.starts_with('.');
        if force_list {
            keyword.remove(0);
        }

        let remainder = rest.map(decode).unwrap_or_default().into_owned();

        if !remainder.is_empty() || (force_list && rest.is_some()) {
            keyword.push('/');
        }

        Self {
            keyword,
            remainder,
            force_list,
        }
    }

    /// Keyword without the generative trailing slash
    pub fn bare_keyword(&self) -> &str {
        self.keyword.strip_suffix('/').unwrap_or(&self.keyword)
    }

    /// Remainder split into path segments, empty when there is none
    pub fn segments(&self) -> Vec<String> {
        if self.remainder.is_empty() {
            Vec::new()
        } else {
            self.remainder.split('/').map(str::to_string).collect()
        }
    }
}

fn decode(s: &str) -> Cow<'_, str> {
    urlencoding::decode(s).unwrap_or(Cow::Borrowed(s))
}

/// Values available to a URL template
#[derive(Debug, Clone, Default)]
pub struct TemplateArgs<'a> {
    /// Replaces `{*}`
    pub wildcard: String,

    /// Replaces `{0}`, `{1}`, ...
    pub positional: Vec<String>,

    /// Replaces `{name}`; unknown names stay as written
    pub variables: Option<&'a BTreeMap<String, String>>,
}

/// Renders a stored URL template.
///
/// Fails when a positional placeholder refers to an argument that does not
/// exist; the caller treats that as "not found".
pub fn render_template(template: &str, args: &TemplateArgs<'_>) -> Result<String, GoError> {
    let template = deampify(template);
    let mut out = String::with_capacity(template.len());
    let mut rest = template.as_str();

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            rest = "";
            break;
        };

        let key = &tail[1..end];
        match key {
            "*" => out.push_str(&escape_segments(&args.wildcard)),
            k if !k.is_empty() && k.chars().all(|c| c.is_ascii_digit()) => {
                let value = k
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| args.positional.get(i))
                    .ok_or_else(|| GoError::MissingTemplateArgument(k.to_string()))?;
                out.push_str(&escape_segments(value));
            }
            k => match args.variables.and_then(|vars| vars.get(k)) {
                Some(value) => out.push_str(value),
                None => out.push_str(&tail[..=end]),
            },
        }
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
