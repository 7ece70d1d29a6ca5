/// Accepts ISO 639-1/2/3 codes with an optional region or script subtag
/// (`en`, `ceb`, `zh-TW`, `pt-BR`, `mni-Mtei`, `es-419`).
pub fn is_valid_lang_code(code: &str) -> bool {
    let code = code.trim();
    let (base, suffix) = match code.split_once('-') {
        Some((base, suffix)) => (base, Some(suffix)),
        None => (code, None),
    };
    if !matches!(base.len(), 2 | 3) || !base.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return false;
    }
    match suffix {
        None => true,
        Some(suffix) => {
            matches!(suffix.len(), 2..=4) && suffix.chars().all(|ch| ch.is_ascii_alphanumeric())
        }
    }
}
