use std::future::Future;
use std::pin::Pin;

use quick_xml::escape::unescape;
use tracing::debug;

use crate::error::ServiceError;

pub type TranslateFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, ServiceError>> + Send + 'a>>;

/// Translation collaborator. Results may still contain HTML entities.
pub trait Translator: Send + Sync {
    fn translate<'a>(&'a self, text: &'a str, target_lang: &'a str) -> TranslateFuture<'a>;
}

/// Longest reference worth looking for; `&CounterClockwiseContourIntegral;` is 33 bytes.
const MAX_REFERENCE_LEN: usize = 40;

/// Decodes named and numeric HTML character references one at a time. A
/// reference that does not resolve (a bare `&`, an unknown name) is copied
/// through unchanged and the rest of the text is still decoded.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        rest = &rest[start..];
        let reference =
            reference_len(rest).and_then(|len| Some((len, resolve_reference(&rest[..len])?)));
        match reference {
            Some((len, value)) => {
                decoded.push_str(&value);
                rest = &rest[len..];
            }
            None => {
                decoded.push('&');
                rest = &rest[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

/// Length of `&name;` or `&#...;` at the start of `text`, including both delimiters.
fn reference_len(text: &str) -> Option<usize> {
    let body = text.get(1..)?;
    let end = body
        .char_indices()
        .take_while(|(index, _)| *index < MAX_REFERENCE_LEN)
        .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || *ch == '#'))
        .filter(|(_, ch)| *ch == ';')
        .map(|(index, _)| index)?;
    (end > 0).then_some(end + 2)
}

fn resolve_reference(reference: &str) -> Option<String> {
    match unescape(reference) {
        Ok(value) => Some(value.into_owned()),
        Err(err) => {
            debug!("leaving '{}' undecoded: {}", reference, err);
            None
        }
    }
}
