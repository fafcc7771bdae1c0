use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::normalize::{canonicalize_confidence, canonicalize_sections};
use super::types::{ExtractionOutcome, ExtractionRequest, ExtractionService, MatchSuggestion};
use super::ExtractionError;
use crate::models::enums::ReferenceSet;

/// HTTP client for the document extraction service.
pub struct HttpExtractionService {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpExtractionService {
    /// Create a client pointing at an extraction service instance.
    /// The timeout covers the whole call; extraction runs for minutes on
    /// large scans.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn map_error(e: reqwest::Error) -> ExtractionError {
        if e.is_timeout() {
            ExtractionError::Timeout
        } else if e.is_connect() {
            ExtractionError::Unavailable(e.to_string())
        } else {
            ExtractionError::Http(e.to_string())
        }
    }
}

/// Request body for POST /v1/extract
#[derive(Serialize)]
struct ExtractRequestBody<'a> {
    document_type: &'a str,
    mime_type: &'a str,
    /// Base64-encoded file bytes.
    content: String,
}

/// Response body from POST /v1/extract
#[derive(Deserialize)]
struct ExtractResponseBody {
    sections: serde_json::Value,
    #[serde(default)]
    section_confidence: BTreeMap<String, f32>,
    #[serde(default)]
    model: String,
}

/// Request body for POST /v1/suggest
#[derive(Serialize)]
struct SuggestRequestBody<'a> {
    text: &'a str,
    reference: &'a str,
}

/// Response body from POST /v1/suggest
#[derive(Deserialize)]
struct SuggestResponseBody {
    suggestion: Option<MatchSuggestion>,
}

impl ExtractionService for HttpExtractionService {
    fn extract(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let body = ExtractRequestBody {
            document_type: request.document_type.as_str(),
            mime_type: request.mime_type,
            content: base64::engine::general_purpose::STANDARD.encode(request.content),
        };

        let response = self
            .client
            .post(format!("{}/v1/extract", self.base_url))
            .json(&body)
            .send()
            .map_err(Self::map_error)?;

        if !response.status().is_success() {
            return Err(ExtractionError::Http(format!(
                "extraction service returned {}",
                response.status()
            )));
        }

        let parsed: ExtractResponseBody = response
            .json()
            .map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;

        if !parsed.sections.is_object() {
            return Err(ExtractionError::InvalidResponse(
                "sections is not a JSON object".to_string(),
            ));
        }

        // Single canonicalization step: downstream consumers assume
        // canonical keys.
        Ok(ExtractionOutcome {
            sections: canonicalize_sections(parsed.sections),
            section_confidence: canonicalize_confidence(parsed.section_confidence),
            model: parsed.model,
        })
    }

    fn suggest_match(
        &self,
        raw_text: &str,
        reference: ReferenceSet,
    ) -> Result<Option<MatchSuggestion>, ExtractionError> {
        let body = SuggestRequestBody {
            text: raw_text,
            reference: reference.as_str(),
        };

        let response = self
            .client
            .post(format!("{}/v1/suggest", self.base_url))
            .json(&body)
            .send()
            .map_err(Self::map_error)?;

        if !response.status().is_success() {
            return Err(ExtractionError::Http(format!(
                "suggestion endpoint returned {}",
                response.status()
            )));
        }

        let parsed: SuggestResponseBody = response
            .json()
            .map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;

        Ok(parsed.suggestion)
    }
}
