//! `DeploymentBase` and its nested `Chunk`/`Artifact` models, as returned by
//! `GET {deploymentBase}`.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::{auth::AuthStrategy, dispatcher::{client::resolve_href, download::ArtifactDownload}};

/// Session configuration needed to materialize a downloader for an
/// artifact. Attached by the controller after parsing; absent on
/// a `DeploymentBase` built directly via [`DeploymentBase::parse`] in
/// isolation (e.g. in tests).
#[derive(Debug, Clone)]
pub(crate) struct DownloadSession {
    pub(crate) base_url: Url,
    pub(crate) base_is_tls: bool,
    pub(crate) auth: AuthStrategy,
    pub(crate) default_headers: Vec<(String, String)>,
    pub(crate) verify_server_certificate: bool,
    pub(crate) timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Skip,
    Attempt,
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceWindow {
    Available,
    Unavailable,
}

impl<'de> Deserialize<'de> for MaintenanceWindow {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "available" => Ok(Self::Available),
            "unavailable" => Ok(Self::Unavailable),
            other => Err(serde::de::Error::custom(format!(
                "unknown maintenanceWindow value: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hashes {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

/// Which of an artifact's three declared hashes matched the bytes actually
/// downloaded. Hash verification is informational at the protocol level:
/// this type offers the check but never enforces it itself, leaving the
/// handler to decide whether a mismatch should fail the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashVerification {
    pub md5_matches: bool,
    pub sha1_matches: bool,
    pub sha256_matches: bool,
}

impl HashVerification {
    #[must_use]
    pub fn all_match(&self) -> bool {
        self.md5_matches && self.sha1_matches && self.sha256_matches
    }
}

impl Hashes {
    /// Computes md5/sha1/sha256 over `bytes` and reports which of the
    /// artifact's declared hashes it matches.
    #[must_use]
    pub fn verify(&self, bytes: &[u8]) -> HashVerification {
        use md5::Md5;
        use sha1::Sha1;
        use sha2::{Digest, Sha256};

        HashVerification {
            md5_matches: hex_digest(Md5::digest(bytes)).eq_ignore_ascii_case(&self.md5),
            sha1_matches: hex_digest(Sha1::digest(bytes)).eq_ignore_ascii_case(&self.sha1),
            sha256_matches: hex_digest(Sha256::digest(bytes)).eq_ignore_ascii_case(&self.sha256),
        }
    }
}

fn hex_digest(bytes: impl AsRef<[u8]>) -> String {
    bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Deserialize)]
struct Href {
    href: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ArtifactLinks {
    download: Option<Href>,
    #[serde(rename = "download-http")]
    download_http: Option<Href>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    pub filename: String,
    pub size: u64,
    pub hashes: Hashes,
    #[serde(rename = "_links")]
    links: ArtifactLinks,
}

impl Artifact {
    /// Resolves the download link to use, preferring the TLS (`download`)
    /// variant when the base URI used TLS, else the plain
    /// (`download-http`) variant.
    #[must_use]
    pub fn download_href(&self, base_is_tls: bool) -> Option<&str> {
        if base_is_tls {
            self.links
                .download
                .as_ref()
                .or(self.links.download_http.as_ref())
                .map(|h| h.href.as_str())
        } else {
            self.links
                .download_http
                .as_ref()
                .or(self.links.download.as_ref())
                .map(|h| h.href.as_str())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chunk {
    pub part: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, Deserialize)]
struct DeploymentInner {
    update: ActionType,
    #[serde(default = "default_download")]
    download: ActionType,
    #[serde(rename = "maintenanceWindow")]
    maintenance_window: Option<MaintenanceWindow>,
    #[serde(default)]
    chunks: Vec<Chunk>,
}

fn default_download() -> ActionType {
    ActionType::Attempt
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentBase {
    pub id: String,
    deployment: DeploymentInner,
    #[serde(skip)]
    session: Option<DownloadSession>,
}

impl DeploymentBase {
    /// Parses the body of a `GET {deploymentBase}` response.
    ///
    /// # Errors
    /// Returns the `serde_json` error on schema mismatch.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub(crate) fn with_session(mut self, session: DownloadSession) -> Self {
        self.session = Some(session);
        self
    }

    /// Materializes a downloader for `artifact`, resolving its download
    /// link against the base URI and preferring the TLS link flavor when
    /// the base connection is TLS.
    /// Returns `None` if the artifact advertised no usable download link,
    /// or if this `DeploymentBase` was never attached to a live session.
    #[must_use]
    pub fn artifact_download(&self, artifact: &Artifact) -> Option<ArtifactDownload> {
        let session = self.session.as_ref()?;
        let href = artifact.download_href(session.base_is_tls)?;
        let url = resolve_href(&session.base_url, href).ok()?;
        Some(ArtifactDownload::new(
            url,
            session.auth.clone(),
            session.default_headers.clone(),
            session.verify_server_certificate,
            session.timeout,
        ))
    }

    #[must_use]
    pub fn update_type(&self) -> ActionType {
        self.deployment.update
    }

    #[must_use]
    pub fn download_type(&self) -> ActionType {
        self.deployment.download
    }

    #[must_use]
    pub fn maintenance_window(&self) -> Option<MaintenanceWindow> {
        self.deployment.maintenance_window
    }

    /// Chunks in server-listed order; artifacts within are downloaded in
    /// this order too.
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.deployment.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static [u8] {
        br#"{
            "id": "42",
            "deployment": {
                "update": "forced",
                "download": "attempt",
                "maintenanceWindow": "available",
                "chunks": [
                    {
                        "part": "os",
                        "name": "firmware",
                        "version": "1.2.3",
                        "artifacts": [
                            {
                                "filename": "firmware.bin",
                                "size": 1024,
                                "hashes": {"md5": "m", "sha1": "s1", "sha256": "s256"},
                                "_links": {
                                    "download": {"href": "https://example/download"},
                                    "download-http": {"href": "http://example/download"}
                                }
                            }
                        ]
                    }
                ]
            }
        }"#
    }

    #[test]
    fn parses_chunks_and_artifacts_in_order() {
        let d = DeploymentBase::parse(sample()).unwrap();
        assert_eq!(d.id, "42");
        assert_eq!(d.update_type(), ActionType::Forced);
        assert_eq!(d.maintenance_window(), Some(MaintenanceWindow::Available));
        assert_eq!(d.chunks().len(), 1);
        let artifact = &d.chunks()[0].artifacts[0];
        assert_eq!(artifact.size, 1024);
        assert_eq!(
            artifact.download_href(true),
            Some("https://example/download")
        );
        assert_eq!(artifact.download_href(false), Some("http://example/download"));
    }

    #[test]
    fn verify_reports_which_hashes_match() {
        let hashes = Hashes {
            md5: "098f6bcd4621d373cade4e832627b4f6".to_string(),
            sha1: "0000000000000000000000000000000000000a".to_string(),
            sha256: "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08".to_string(),
        };
        let result = hashes.verify(b"test");
        assert!(result.md5_matches);
        assert!(!result.sha1_matches);
        assert!(result.sha256_matches);
        assert!(!result.all_match());
    }
}
