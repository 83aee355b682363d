//! Benchmark upload state: the source document plus the extra files the
//! server asks for before it accepts a benchmark.

pub mod http;

pub use http::{ControllerBackend, ControllerClient, ControllerConfig, ReqwestControllerBackend};

use reqwest::StatusCode;
use std::fmt;
use thiserror::Error;

/// Form field that carries the benchmark source.
pub const SOURCE_FIELD: &str = "benchmark";
/// Filename used when the source comes from the in-terminal editor.
pub const EDITED_SOURCE_NAME: &str = "benchmark.hf.yaml";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid controller configuration: {0}")]
    InvalidConfig(String),
    #[error("no upload in progress")]
    NotPending,
    #[error("no file slot named {0}")]
    UnknownSlot(String),
    #[error("missing files: {}", .0.join(", "))]
    MissingFiles(Vec<String>),
    #[error("upload already submitted")]
    AlreadySubmitted,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server rejected upload ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("response has no Location header")]
    MissingLocation,
}

impl UploadError {
    /// Text shown to the user when the upload fails.
    pub fn user_message(&self) -> String {
        match self {
            UploadError::Rejected { body, .. } if !body.trim().is_empty() => {
                body.trim_end().to_string()
            }
            other => other.to_string(),
        }
    }
}

/// One multipart form part.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub field: String,
    pub filename: String,
    pub content: Vec<u8>,
}

impl fmt::Debug for UploadPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadPart")
            .field("field", &self.field)
            .field("filename", &self.filename)
            .field("bytes", &self.content.len())
            .finish()
    }
}

/// A ready-to-send upload.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub parts: Vec<UploadPart>,
    /// Sent as `if-match` so the server can refuse stale edits.
    pub version: Option<String>,
    pub auth_token: Option<String>,
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("parts", &self.parts)
            .field("version", &self.version)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Result of an accepted upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReceipt {
    pub location: String,
    /// Name the session should switch to.
    pub benchmark: String,
}

impl UploadReceipt {
    /// The benchmark name is the last path segment of the location.
    pub fn from_location(location: &str) -> Self {
        let benchmark = location
            .rsplit_once('/')
            .map_or(location, |(_, last)| last)
            .to_string();
        Self {
            location: location.to_string(),
            benchmark,
        }
    }
}

/// What the upload form shows for one requested file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSlotView {
    pub name: String,
    /// Local name of the file attached so far.
    pub attached: Option<String>,
}

#[derive(Debug)]
struct FileSlot {
    name: String,
    attached: Option<(String, Vec<u8>)>,
}

/// Upload assembled across the edit and file-list exchanges. It lives from
/// the moment the source is chosen until the submission completes.
#[derive(Debug, Default)]
pub struct PendingUpload {
    source: Option<UploadPart>,
    benchmark: Option<String>,
    version: Option<String>,
    slots: Vec<FileSlot>,
    submitted: bool,
}

impl PendingUpload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            source: Some(UploadPart {
                field: SOURCE_FIELD.to_string(),
                filename: filename.into(),
                content,
            }),
            ..Self::default()
        }
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn benchmark(&self) -> Option<&str> {
        self.benchmark.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Records the server's file request. Slots keep the server's order.
    pub fn require_files(
        &mut self,
        benchmark: impl Into<String>,
        version: Option<String>,
        files: Vec<String>,
    ) {
        self.benchmark = Some(benchmark.into());
        self.version = version;
        self.slots = files
            .into_iter()
            .map(|name| FileSlot {
                name,
                attached: None,
            })
            .collect();
    }

    pub fn slots(&self) -> Vec<UploadSlotView> {
        self.slots
            .iter()
            .map(|slot| UploadSlotView {
                name: slot.name.clone(),
                attached: slot.attached.as_ref().map(|(local, _)| local.clone()),
            })
            .collect()
    }

    pub fn missing(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|slot| slot.attached.is_none())
            .map(|slot| slot.name.clone())
            .collect()
    }

    /// Attaches a local file to a requested slot; re-attaching replaces it.
    pub fn attach(
        &mut self,
        slot: &str,
        local_name: impl Into<String>,
        content: Vec<u8>,
    ) -> Result<(), UploadError> {
        let target = self
            .slots
            .iter_mut()
            .find(|candidate| candidate.name == slot)
            .ok_or_else(|| UploadError::UnknownSlot(slot.to_string()))?;
        target.attached = Some((local_name.into(), content));
        Ok(())
    }

    /// Builds the multipart request once every slot is filled. A pending
    /// upload is submitted at most once.
    pub fn build_request(
        &mut self,
        auth_token: Option<String>,
    ) -> Result<UploadRequest, UploadError> {
        if self.submitted {
            return Err(UploadError::AlreadySubmitted);
        }
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(UploadError::MissingFiles(missing));
        }
        let mut parts: Vec<UploadPart> = self.source.iter().cloned().collect();
        for slot in &self.slots {
            if let Some((_, content)) = &slot.attached {
                parts.push(UploadPart {
                    field: slot.name.clone(),
                    filename: slot.name.clone(),
                    content: content.clone(),
                });
            }
        }
        self.submitted = true;
        Ok(UploadRequest {
            parts,
            version: self.version.clone(),
            auth_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_lists_source_then_slots_in_order() {
        let mut upload = PendingUpload::with_source("bench.hf.yaml", b"name: demo".to_vec());
        upload.require_files(
            "demo",
            Some("v7".into()),
            vec!["a.csv".into(), "b.csv".into()],
        );
        upload.attach("b.csv", "/tmp/b.csv", b"b".to_vec()).unwrap();
        upload.attach("a.csv", "/tmp/a.csv", b"a".to_vec()).unwrap();

        let request = upload.build_request(Some("tok".into())).unwrap();
        let fields: Vec<_> = request.parts.iter().map(|p| p.field.as_str()).collect();
        assert_eq!(fields, vec!["benchmark", "a.csv", "b.csv"]);
        assert_eq!(request.parts[0].filename, "bench.hf.yaml");
        assert_eq!(request.version.as_deref(), Some("v7"));
        assert!(upload.is_submitted());
    }

    #[test]
    fn incomplete_upload_reports_missing_slots() {
        let mut upload = PendingUpload::with_source("x.yaml", Vec::new());
        upload.require_files("demo", None, vec!["data.csv".into()]);
        match upload.build_request(None) {
            Err(UploadError::MissingFiles(missing)) => assert_eq!(missing, vec!["data.csv"]),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!upload.is_submitted());
    }

    #[test]
    fn unknown_slot_is_rejected() {
        let mut upload = PendingUpload::new();
        upload.require_files("demo", None, vec!["data.csv".into()]);
        assert!(matches!(
            upload.attach("other.csv", "other.csv", Vec::new()),
            Err(UploadError::UnknownSlot(_))
        ));
    }

    #[test]
    fn second_submission_is_refused() {
        let mut upload = PendingUpload::with_source("x.yaml", Vec::new());
        upload.build_request(None).unwrap();
        assert!(matches!(
            upload.build_request(None),
            Err(UploadError::AlreadySubmitted)
        ));
    }

    #[test]
    fn receipt_takes_last_location_segment() {
        let receipt = UploadReceipt::from_location("http://controller:8090/benchmark/demo");
        assert_eq!(receipt.benchmark, "demo");
        assert_eq!(UploadReceipt::from_location("demo").benchmark, "demo");
    }

    #[test]
    fn rejection_body_is_shown_verbatim() {
        let err = UploadError::Rejected {
            status: StatusCode::CONFLICT,
            body: "Benchmark version mismatch\n".into(),
        };
        assert_eq!(err.user_message(), "Benchmark version mismatch");
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let request = UploadRequest {
            parts: Vec::new(),
            version: None,
            auth_token: Some("secret".into()),
        };
        assert!(!format!("{request:?}").contains("secret"));
    }
}
