//! Token-aware text rewriting shared by `@DEFINE` substitution and
//! `@IMPORT` namespace prefixing (spec.md §4.1). Both rewrite whole
//! identifier tokens; neither ever touches a partial match.

use std::collections::{HashMap, HashSet};

/// Replace every whole-token occurrence of a macro name with its value.
/// "Token-aware: an identifier is its maximal `[A-Za-z_][A-Za-z0-9_]*` span.
/// Partial matches never substitute."
pub fn substitute_macros(line: &str, macros: &HashMap<String, String>) -> String {
    map_identifiers(line, |ident, _preceding| macros.get(ident).cloned())
}

/// Rewrite every label definition, `VAR` declaration, and un-dotted
/// reference to a name this file defines into `<prefix>.<name>` (spec.md
/// §4.1's `@IMPORT` namespace-prefix rule).
pub fn apply_namespace_prefix(text: &str, prefix: &str) -> String {
    let own_names = collect_own_names(text);
    let mut out_lines = Vec::with_capacity(text.lines().count());
    for line in text.lines() {
        let rewritten = map_identifiers(line, |ident, preceding| {
            let preceded_by_dot = preceding == Some('.');
            let preceded_by_digit = preceding.map(|c| c.is_ascii_digit()).unwrap_or(false);
            if own_names.contains(ident) && !preceded_by_dot && !preceded_by_digit {
                Some(format!("{prefix}.{ident}"))
            } else {
                None
            }
        });
        out_lines.push(rewritten);
    }
    out_lines.join("\n")
}

/// Names this file defines itself: label/function definitions and `VAR`
/// declarations whose name does not already contain a dot (a dotted name
/// is already namespaced by a nested import and must not be re-collected).
fn collect_own_names(text: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_suffix(':') {
            let name_part = rest.split('(').next().unwrap_or(rest).trim();
            if is_plain_ident(name_part) {
                names.insert(name_part.to_string());
            }
            continue;
        }
        let mut it = trimmed.splitn(2, char::is_whitespace);
        if let Some(kw) = it.next() {
            if kw.eq_ignore_ascii_case("VAR") {
                if let Some(args) = it.next() {
                    let name = args.split(',').next().unwrap_or("").trim();
                    if is_plain_ident(name) {
                        names.insert(name.to_string());
                    }
                }
            }
        }
    }
    names
}

fn is_plain_ident(s: &str) -> bool {
    !s.is_empty()
        && !s.contains('.')
        && s.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false)
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Walk `text`, calling `f(identifier, preceding_char)` for every maximal
/// `[A-Za-z_][A-Za-z0-9_]*` span; when `f` returns `Some(replacement)`, the
/// span is replaced, otherwise it is copied verbatim.
fn map_identifiers(text: &str, mut f: impl FnMut(&str, Option<char>) -> Option<String>) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut preceding: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            let mut j = i + 1;
            while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            let ident: String = chars[start..j].iter().collect();
            match f(&ident, preceding) {
                Some(replacement) => out.push_str(&replacement),
                None => out.push_str(&ident),
            }
            preceding = Some(chars[j - 1]);
            i = j;
        } else {
            out.push(c);
            preceding = Some(c);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_references_are_left_alone() {
        let mut own = HashSet::new();
        own.insert("add".to_string());
        let text = "CALL other.add\nCALL add\n";
        let out = apply_namespace_prefix(text, "math");
        // "add" is a free reference here (math.ua never defines it in this
        // unit test), so collect_own_names finds nothing and nothing changes.
        assert_eq!(out, text.trim_end_matches('\n'));
    }

    #[test]
    fn macro_substitution_is_whole_token_only() {
        let mut macros = HashMap::new();
        macros.insert("N".to_string(), "4".to_string());
        assert_eq!(substitute_macros("LDI R0, N", &macros), "LDI R0, 4");
        assert_eq!(substitute_macros("LDI R0, NX", &macros), "LDI R0, NX");
        assert_eq!(substitute_macros("LDI R0, XN", &macros), "LDI R0, XN");
    }
}
