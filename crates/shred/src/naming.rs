//! Column and table name sanitization.

/// Makes `name` a valid column or table identifier: alphanumerics and
/// underscores only, no leading digit, no separator runs.
///
/// The function is pure, total, and idempotent, so results may be cached by
/// callers that sanitize the same keys repeatedly.
pub fn sanitize(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_underscore = false;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            result.push(ch);
            last_underscore = false;
        } else if !last_underscore {
            result.push('_');
            last_underscore = true;
        }
    }

    let trimmed = result.trim_matches('_');
    if trimmed.is_empty() {
        return "unnamed_field".to_string();
    }
    if trimmed.chars().next().is_some_and(|c| c.is_numeric()) {
        return format!("col_{trimmed}");
    }
    trimmed.to_string()
}

/// Child-table name for an array at `field` reached through `parent_path`
/// inside `entity`. The entity and field are sanitized here; `parent_path`
/// is a join of already-sanitized components and is used as-is.
pub fn child_table_name(
    entity: &str,
    parent_path: &str,
    field: &str,
    separator: &str,
) -> String {
    let entity = sanitize(entity);
    let field = sanitize(field);
    if parent_path.is_empty() {
        format!("{entity}{separator}{field}")
    } else {
        format!("{entity}{separator}{parent_path}{separator}{field}")
    }
}

/// Sanitizes every name of a header row.
pub fn sanitize_header(names: &[String]) -> Vec<String> {
    names.iter().map(|name| sanitize(name)).collect()
}

/// Disambiguates repeated header names by appending `_1`, `_2`, … in order
/// of appearance. The first occurrence keeps the bare name. Names are taken
/// as given; metadata columns keep their reserved prefix.
pub fn dedupe_headers(names: &[String]) -> Vec<String> {
    let mut seen: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let n = seen.entry(name.as_str()).or_insert(0);
        if *n == 0 {
            out.push(name.clone());
        } else {
            out.push(format!("{name}_{n}"));
        }
        *n += 1;
    }
    out
}

/// Replaces characters that are unsafe in file names. Table names are
/// already identifier-shaped except for a configurable separator, which may
/// be any printable string.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
