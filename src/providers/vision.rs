use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{ServiceError, ServiceKind};
use crate::ocr::{BoundingBox, OcrDetection, OcrFuture, OcrService, TextFragment};

use super::{GoogleClient, GoogleError, HttpFailure};

const ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

/// Cloud Vision `TEXT_DETECTION`.
#[derive(Debug, Clone)]
pub struct GoogleVision {
    client: GoogleClient,
    url: String,
}

impl GoogleVision {
    pub fn new(client: GoogleClient) -> Self {
        Self {
            client,
            url: ANNOTATE_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl OcrService for GoogleVision {
    fn detect<'a>(&'a self, image_bytes: &'a [u8]) -> OcrFuture<'a> {
        Box::pin(async move {
            let body = json!({
                "requests": [
                    {
                        "image": { "content": BASE64.encode(image_bytes) },
                        "features": [ { "type": "TEXT_DETECTION" } ]
                    }
                ]
            });
            let text = self
                .client
                .post_json(ServiceKind::Ocr, &self.url, &body)
                .await
                .map_err(|failure| match failure {
                    HttpFailure::Status { status, message } if status.as_u16() == 400 => {
                        ServiceError::InvalidImage(message)
                    }
                    other => other.into_service_error(ServiceKind::Ocr),
                })?;
            let detection = parse_annotate_response(&text)?;
            debug!("vision found {} fragments", detection.fragments.len());
            Ok(detection)
        })
    }
}

pub(crate) fn parse_annotate_response(text: &str) -> Result<OcrDetection, ServiceError> {
    let payload: AnnotateResponse =
        serde_json::from_str(text).map_err(|err| ServiceError::Malformed {
            service: ServiceKind::Ocr,
            message: format!("failed to parse Vision response JSON: {}", err),
        })?;
    let Some(response) = payload.responses.into_iter().next() else {
        return Ok(OcrDetection::default());
    };
    if let Some(error) = response.error {
        // google.rpc.Code 3 = INVALID_ARGUMENT: the image itself was rejected.
        return Err(match error.code {
            Some(3) => ServiceError::InvalidImage(error.describe()),
            _ => ServiceError::Unavailable {
                service: ServiceKind::Ocr,
                message: error.describe(),
            },
        });
    }

    let mut annotations = response.text_annotations.into_iter();
    let full_text = annotations.next().map(|aggregate| aggregate.description);
    let fragments = annotations
        .map(|annotation| {
            let vertices = annotation.bounding_poly.vertices;
            let corner = |idx: usize| {
                vertices
                    .get(idx)
                    .map(|vertex| (vertex.x, vertex.y))
                    .unwrap_or((0, 0))
            };
            TextFragment::new(
                BoundingBox::from_corners(corner(0), corner(2)),
                annotation.description,
            )
        })
        .collect();
    Ok(OcrDetection {
        full_text,
        fragments,
    })
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(rename = "textAnnotations", default)]
    text_annotations: Vec<EntityAnnotation>,
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
    #[serde(rename = "boundingPoly", default)]
    bounding_poly: BoundingPoly,
}

#[derive(Debug, Default, Deserialize)]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<Vertex>,
}

// Vision omits zero coordinates from vertices.
#[derive(Debug, Default, Deserialize)]
struct Vertex {
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
}
