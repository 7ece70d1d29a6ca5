use serde::Deserialize;
use serde_json::json;

use crate::error::{ServiceError, ServiceKind};
use crate::translator::{TranslateFuture, Translator};

use super::{GoogleClient, HttpFailure};

const TRANSLATE_URL: &str = "https://translation.googleapis.com/language/translate/v2";

/// Cloud Translation v2. Results come back HTML-escaped.
#[derive(Debug, Clone)]
pub struct GoogleTranslate {
    client: GoogleClient,
    url: String,
    source_lang: Option<String>,
}

impl GoogleTranslate {
    pub fn new(client: GoogleClient) -> Self {
        Self {
            client,
            url: TRANSLATE_URL.to_string(),
            source_lang: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Fixes the source language instead of letting the service detect it.
    pub fn with_source_lang(mut self, lang: impl Into<String>) -> Self {
        self.source_lang = Some(lang.into());
        self
    }
}

impl Translator for GoogleTranslate {
    fn translate<'a>(&'a self, text: &'a str, target_lang: &'a str) -> TranslateFuture<'a> {
        Box::pin(async move {
            let mut body = json!({
                "q": text,
                "target": target_lang,
                "format": "html"
            });
            if let Some(source) = &self.source_lang {
                body["source"] = json!(source);
            }
            let response = self
                .client
                .post_json(ServiceKind::Translation, &self.url, &body)
                .await
                .map_err(|failure| map_failure(failure, target_lang))?;
            parse_translate_response(&response)
        })
    }
}

fn map_failure(failure: HttpFailure, target_lang: &str) -> ServiceError {
    match failure {
        HttpFailure::Status { status, message }
            if status.as_u16() == 400 && is_language_error(&message) =>
        {
            ServiceError::UnsupportedLanguage(target_lang.to_string())
        }
        other => other.into_service_error(ServiceKind::Translation),
    }
}

fn is_language_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("invalid value") || lower.contains("language")
}

pub(crate) fn parse_translate_response(text: &str) -> Result<String, ServiceError> {
    let payload: TranslateResponse =
        serde_json::from_str(text).map_err(|err| ServiceError::Malformed {
            service: ServiceKind::Translation,
            message: format!("failed to parse Translation response JSON: {}", err),
        })?;
    payload
        .data
        .translations
        .into_iter()
        .next()
        .map(|translation| translation.translated_text)
        .ok_or_else(|| ServiceError::Malformed {
            service: ServiceKind::Translation,
            message: "no translation returned".to_string(),
        })
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn first_translation_is_returned_escaped() {
        let body = r#"{"data":{"translations":[{"translatedText":"Caf&eacute; &amp; bar","detectedSourceLanguage":"de"}]}}"#;
        assert_eq!(parse_translate_response(body).unwrap(), "Caf&eacute; &amp; bar");
    }

    #[test]
    fn empty_translation_list_is_malformed() {
        let body = r#"{"data":{"translations":[]}}"#;
        assert!(matches!(
            parse_translate_response(body),
            Err(ServiceError::Malformed { .. })
        ));
    }

    #[test]
    fn bad_target_maps_to_unsupported_language() {
        let failure = HttpFailure::Status {
            status: StatusCode::BAD_REQUEST,
            message: "Invalid Value | status: INVALID_ARGUMENT | code: 400".to_string(),
        };
        assert!(matches!(
            map_failure(failure, "xx"),
            ServiceError::UnsupportedLanguage(lang) if lang == "xx"
        ));
    }
}
