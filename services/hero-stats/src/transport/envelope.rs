//! Invocation result envelope: the report as gzip + base64 JSON on success,
//! a plain diagnostic body on failure.

use std::{
    collections::BTreeMap,
    io::{Read, Write},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use schema::GlobalStats;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::api::StatsError;

pub const FAILURE_MESSAGE: &str = "not ok";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportEnvelope {
    pub status_code: u16,
    pub is_base64_encoded: bool,
    pub body: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("failed serializing report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed compressing report: {0}")]
    Compress(#[from] std::io::Error),
    #[error("failed decoding base64 body: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Serialize)]
struct SuccessBody<'a> {
    result: &'a GlobalStats,
}

#[derive(Serialize)]
struct FailureBody<'a> {
    message: &'a str,
    exception: &'a str,
}

/// Wraps a report attempt for the caller. Never fails: an encoding problem on
/// the success path is reported as a failure envelope.
pub fn respond(result: Result<GlobalStats, StatsError>, compress: bool) -> TransportEnvelope {
    match result {
        Ok(report) => success_envelope(&report, compress).unwrap_or_else(|err| {
            error!(error = %err, "failed encoding hero stats");
            failure_envelope(&err.to_string())
        }),
        Err(err) => {
            error!(error = %err, "issue retrieving hero stats");
            failure_envelope(&err.to_string())
        }
    }
}

pub fn success_envelope(
    report: &GlobalStats,
    compress: bool,
) -> Result<TransportEnvelope, EnvelopeError> {
    let json = serde_json::to_vec(&SuccessBody { result: report })?;
    let mut headers = json_headers();
    if !compress {
        return Ok(TransportEnvelope {
            status_code: 200,
            is_base64_encoded: false,
            body: String::from_utf8_lossy(&json).into_owned(),
            headers,
        });
    }

    let body = gzip_base64(&json)?;
    debug!(
        raw_bytes = json.len(),
        encoded_bytes = body.len(),
        "compressed hero stats body"
    );
    headers.insert("Content-Encoding".to_string(), "gzip".to_string());
    Ok(TransportEnvelope {
        status_code: 200,
        is_base64_encoded: true,
        body,
        headers,
    })
}

pub fn failure_envelope(diagnostic: &str) -> TransportEnvelope {
    let body = serde_json::to_string(&FailureBody {
        message: FAILURE_MESSAGE,
        exception: diagnostic,
    })
    .unwrap_or_else(|_| format!("{{\"message\":\"{FAILURE_MESSAGE}\"}}"));
    TransportEnvelope {
        status_code: 500,
        is_base64_encoded: false,
        body,
        headers: json_headers(),
    }
}

fn json_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())])
}

pub fn gzip_base64(raw: &[u8]) -> Result<String, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

impl TransportEnvelope {
    /// Raw body bytes as they go on the wire: base64-decoded when flagged,
    /// still gzip-compressed.
    pub fn wire_body(&self) -> Result<Vec<u8>, EnvelopeError> {
        if self.is_base64_encoded {
            Ok(STANDARD.decode(&self.body)?)
        } else {
            Ok(self.body.clone().into_bytes())
        }
    }

    pub fn decoded_body(&self) -> Result<String, EnvelopeError> {
        let wire = self.wire_body()?;
        if !self.is_base64_encoded {
            return Ok(String::from_utf8_lossy(&wire).into_owned());
        }
        let mut json = String::new();
        GzDecoder::new(wire.as_slice()).read_to_string(&mut json)?;
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ReportInputs, ReportOptions, build_report};
    use store::StoreError;

    fn sample_report() -> GlobalStats {
        build_report(
            &ReportInputs {
                hero_ids: vec!["H1".to_string()],
                ..ReportInputs::default()
            },
            &ReportOptions::default(),
        )
    }

    #[test]
    fn success_body_round_trips_through_gzip_and_base64() {
        let report = sample_report();
        let envelope = respond(Ok(report.clone()), true);

        assert_eq!(envelope.status_code, 200);
        assert!(envelope.is_base64_encoded);
        assert_eq!(
            envelope.headers.get("Content-Encoding").map(String::as_str),
            Some("gzip")
        );
        assert_eq!(&envelope.wire_body().unwrap()[..2], &[0x1f, 0x8b]);

        let decoded: serde_json::Value =
            serde_json::from_str(&envelope.decoded_body().unwrap()).unwrap();
        assert_eq!(
            decoded,
            serde_json::json!({ "result": serde_json::to_value(&report).unwrap() })
        );
        assert_eq!(decoded["result"]["heroStats"][1]["id"], "average");
    }

    #[test]
    fn uncompressed_success_is_plain_json() {
        let envelope = respond(Ok(sample_report()), false);
        assert_eq!(envelope.status_code, 200);
        assert!(!envelope.is_base64_encoded);
        assert!(!envelope.headers.contains_key("Content-Encoding"));
        assert!(envelope.body.starts_with("{\"result\":{\"heroStats\":["));
    }

    #[test]
    fn failure_carries_fixed_message_and_diagnostic() {
        let err = StatsError::Fetch {
            table: "bgs_hero_stats",
            source: StoreError::Io("connection refused".to_string()),
        };
        let envelope = respond(Err(err), true);

        assert_eq!(envelope.status_code, 500);
        assert!(!envelope.is_base64_encoded);
        let body: serde_json::Value = serde_json::from_str(&envelope.body).unwrap();
        assert_eq!(body["message"], FAILURE_MESSAGE);
        let exception = body["exception"].as_str().unwrap();
        assert!(exception.contains("bgs_hero_stats"));
        assert!(exception.contains("connection refused"));
    }

    #[test]
    fn envelope_serializes_with_camel_case_keys() {
        let envelope = failure_envelope("boom");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["statusCode"], 500);
        assert_eq!(value["isBase64Encoded"], false);
        assert_eq!(value["headers"]["Content-Type"], "application/json");
    }
}
