//! Hand-rolled recursive-descent parser for mapper path expressions.
//!
//! Grammar:
//! ```text
//! path       := segment ('.' segment)*
//! segment    := name bracket*
//! bracket    := '[' (index | filter | '*') ']'
//! index      := digit+
//! filter     := key '=' literal
//! name, key  := identifier chars (not '.', '[', ']')
//! literal    := any chars except ']'
//! ```

use std::fmt;

/// One step of a parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
    Filter { key: String, literal: String },
    Wildcard,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{name}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
            PathSegment::Filter { key, literal } => write!(f, "[{key}={literal}]"),
            PathSegment::Wildcard => write!(f, "[*]"),
        }
    }
}

/// Parse a full path expression into its ordered list of segments.
pub fn parse_path(expression: &str) -> Result<Vec<PathSegment>, String> {
    if expression.trim().is_empty() {
        return Err("mapper expression must not be empty".to_string());
    }

    let mut segments = Vec::new();
    for dotted_part in split_top_level_dots(expression) {
        if dotted_part.is_empty() {
            return Err(format!("empty path segment in '{expression}'"));
        }
        parse_dotted_part(dotted_part, expression, &mut segments)?;
    }
    Ok(segments)
}

/// Split on `.` without splitting inside `[...]` brackets, since filter
/// literals are free-form text that could themselves be mistaken for
/// separators if we split naively.
fn split_top_level_dots(expression: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in expression.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                parts.push(&expression[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&expression[start..]);
    parts
}

fn parse_dotted_part(
    part: &str,
    full_expression: &str,
    out: &mut Vec<PathSegment>,
) -> Result<(), String> {
    let bracket_start = part.find('[');
    let (name, mut rest) = match bracket_start {
        Some(idx) => (&part[..idx], &part[idx..]),
        None => (part, ""),
    };

    if name.is_empty() {
        return Err(format!(
            "path segment '{part}' in '{full_expression}' must start with a field name"
        ));
    }
    if !is_valid_name(name) {
        return Err(format!(
            "'{name}' in '{full_expression}' is not a valid field name"
        ));
    }
    out.push(PathSegment::Field(name.to_string()));

    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(format!(
                "expected '[' after field name in '{full_expression}'"
            ));
        }
        let close = rest.find(']').ok_or_else(|| {
            format!("unterminated '[' in '{full_expression}'")
        })?;
        let inner = &rest[1..close];
        out.push(parse_bracket(inner, full_expression)?);
        rest = &rest[close + 1..];
    }

    Ok(())
}

fn parse_bracket(inner: &str, full_expression: &str) -> Result<PathSegment, String> {
    if inner == "*" {
        return Ok(PathSegment::Wildcard);
    }
    if let Some(eq) = inner.find('=') {
        let key = &inner[..eq];
        let literal = &inner[eq + 1..];
        if key.is_empty() || !is_valid_name(key) {
            return Err(format!(
                "'{key}' is not a valid filter key in '{full_expression}'"
            ));
        }
        return Ok(PathSegment::Filter {
            key: key.to_string(),
            literal: literal.to_string(),
        });
    }
    if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
        return inner
            .parse::<usize>()
            .map(PathSegment::Index)
            .map_err(|_| format!("'{inner}' is not a valid index in '{full_expression}'"));
    }
    Err(format!(
        "'[{inner}]' is not a valid index, filter, or wildcard in '{full_expression}'"
    ))
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_dotted_path() {
        let segments = parse_path("user.profile.email").unwrap();
        assert_eq!(
            segments,
            vec![
                PathSegment::Field("user".to_string()),
                PathSegment::Field("profile".to_string()),
                PathSegment::Field("email".to_string()),
            ]
        );
    }

    #[test]
    fn index_segment() {
        let segments = parse_path("orders[0].amount").unwrap();
        assert_eq!(
            segments,
            vec![
                PathSegment::Field("orders".to_string()),
                PathSegment::Index(0),
                PathSegment::Field("amount".to_string()),
            ]
        );
    }

    #[test]
    fn filter_segment() {
        let segments = parse_path("data.users[id=123].name").unwrap();
        assert_eq!(
            segments,
            vec![
                PathSegment::Field("data".to_string()),
                PathSegment::Field("users".to_string()),
                PathSegment::Filter { key: "id".to_string(), literal: "123".to_string() },
                PathSegment::Field("name".to_string()),
            ]
        );
    }

    #[test]
    fn wildcard_segment() {
        let segments = parse_path("data.items[*]").unwrap();
        assert_eq!(
            segments,
            vec![
                PathSegment::Field("data".to_string()),
                PathSegment::Field("items".to_string()),
                PathSegment::Wildcard,
            ]
        );
    }

    #[test]
    fn chained_brackets() {
        let segments = parse_path("matrix[0][1]").unwrap();
        assert_eq!(
            segments,
            vec![
                PathSegment::Field("matrix".to_string()),
                PathSegment::Index(0),
                PathSegment::Index(1),
            ]
        );
    }

    #[test]
    fn rejects_empty_expression() {
        assert!(parse_path("").is_err());
        assert!(parse_path("   ").is_err());
    }

    #[test]
    fn rejects_unterminated_bracket() {
        assert!(parse_path("orders[0").is_err());
    }

    #[test]
    fn rejects_invalid_name() {
        assert!(parse_path("1abc").is_err());
        assert!(parse_path("user..email").is_err());
    }

    #[test]
    fn rejects_garbage_inside_brackets() {
        assert!(parse_path("orders[abc]").is_err());
    }
}
