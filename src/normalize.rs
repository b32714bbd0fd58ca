//! Cell text cleanup applied before any lookup or matching.

use encoding_rs::{UTF_8, WINDOWS_1252};

/// Repairs text that was UTF-8 encoded but decoded as Windows-1252 somewhere
/// upstream, such as "CafÃ©" for "Café". The repair is accepted only when the
/// re-encoded bytes form well-formed UTF-8 and the result is shorter than the
/// input, which never holds for text that was already clean.
pub fn repair_mojibake(text: &str) -> String {
    let (bytes, _, had_errors) = WINDOWS_1252.encode(text);
    if had_errors {
        return text.to_string();
    }
    match UTF_8.decode_without_bom_handling_and_without_replacement(&bytes) {
        Some(repaired) if repaired.chars().count() < text.chars().count() => {
            repaired.into_owned()
        }
        _ => text.to_string(),
    }
}

/// Normalizes one raw cell: encoding repair, control characters dropped,
/// whitespace runs collapsed to a single space, ends trimmed.
pub fn clean_cell(raw: &str) -> String {
    let repaired = repair_mojibake(raw);
    let mut out = String::with_capacity(repaired.len());
    let mut pending_space = false;
    for ch in repaired.chars() {
        if ch.is_control() {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}
