//! Text normalization used when comparing free-form generated text against
//! inventory item names.

/// Lowercase, turn punctuation into spaces and collapse runs of whitespace.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Best-effort English singular form of a single lowercase word.
pub fn singularize(word: &str) -> String {
    if word.len() <= 3 {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["ches", "shes", "sses", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("oes") {
        return word[..word.len() - 2].to_string();
    }
    if word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// [`normalize_text`] followed by per-word singularization.
pub fn normalize_phrase(text: &str) -> String {
    normalize_text(text)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(singularize)
        .collect::<Vec<String>>()
        .join(" ")
}

/// True when `needle` occurs in `haystack` on word boundaries.
/// Both inputs are expected to be normalized already.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    let padded_haystack = format!(" {haystack} ");
    let padded_needle = format!(" {needle} ");
    padded_haystack.contains(&padded_needle)
}
