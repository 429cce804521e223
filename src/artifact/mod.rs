use anyhow::{bail, Context, Result};
use reqwest::{multipart, Client, RequestBuilder};
use serde::Deserialize;
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{fs, time};
use tracing::{debug, info};
use url::Url;

const STORE_URL_VAR: &str = "ARTIFACT_STORE_URL";
const STORE_TOKEN_VAR: &str = "ARTIFACT_STORE_TOKEN";

const COMMIT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const COMMIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Metadata for a new artifact version about to be published.
pub struct ArtifactSpec {
    pub name: String,
    pub artifact_type: String,
    pub description: String,
}

/// Manifest returned when resolving an artifact reference.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub file_name: String,
    pub download_url: String,
}

/// A freshly uploaded artifact version, possibly not yet durable.
#[derive(Debug, Deserialize)]
pub struct PublishedArtifact {
    pub id: String,
    pub name: String,
    pub version: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct ArtifactStatus {
    state: String,
}

/// Thin client for the HTTP artifact store: resolve a reference to a local
/// file, publish a file as a new version, and wait for that version to
/// become durable.
#[derive(Debug)]
pub struct Store {
    base: Url,
    token: Option<String>,
    client: Client,
}

impl Store {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("invalid artifact store URL `{}`", base_url))?;
        Ok(Store {
            base,
            token,
            client: Client::new(),
        })
    }

    /// Build a client from `ARTIFACT_STORE_URL` (+ optional token).
    pub fn from_env() -> Result<Self> {
        let base_url = env::var(STORE_URL_VAR)
            .with_context(|| format!("{} is not set", STORE_URL_VAR))?;
        let token = env::var(STORE_TOKEN_VAR).ok();
        Store::new(&base_url, token)
    }

    /// Resolve `name[:version]` (default `latest`) and download the backing
    /// file into `dest_dir`. Returns the local path.
    pub async fn resolve_to_file(&self, reference: &str, dest_dir: &Path) -> Result<PathBuf> {
        let (name, version) = split_reference(reference);
        let manifest_url = self
            .base
            .join(&format!("api/artifacts/{}/versions/{}", name, version))
            .context("building manifest URL")?;

        debug!(url = %manifest_url, "resolving artifact reference");
        let manifest: Manifest = self
            .get(manifest_url)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("resolving artifact `{}`", reference))?
            .json()
            .await
            .context("decoding artifact manifest")?;
        info!(name = %manifest.name, version = %manifest.version, "resolved artifact");

        let download_url = Url::parse(&manifest.download_url)
            .or_else(|_| self.base.join(&manifest.download_url))
            .context("building download URL")?;
        let bytes = self
            .get(download_url)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("downloading artifact `{}`", reference))?
            .bytes()
            .await?;

        let dest = dest_dir.join(&manifest.file_name);
        fs::write(&dest, &bytes)
            .await
            .with_context(|| format!("writing `{}`", dest.display()))?;
        debug!(bytes = bytes.len(), file = %dest.display(), "downloaded artifact file");
        Ok(dest)
    }

    /// Upload `file` as a new version of `spec.name`. The returned version
    /// may still be pending; follow with [`Store::wait_committed`].
    pub async fn publish(&self, spec: &ArtifactSpec, file: &Path) -> Result<PublishedArtifact> {
        let bytes = fs::read(file)
            .await
            .with_context(|| format!("reading `{}`", file.display()))?;
        let file_name = file
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(&spec.name)
            .to_string();

        let form = multipart::Form::new()
            .text("name", spec.name.clone())
            .text("type", spec.artifact_type.clone())
            .text("description", spec.description.clone())
            .part("file", multipart::Part::bytes(bytes).file_name(file_name));

        let upload_url = self.base.join("api/artifacts").context("building upload URL")?;
        let published: PublishedArtifact = self
            .post(upload_url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("publishing artifact `{}`", spec.name))?
            .json()
            .await
            .context("decoding publish response")?;

        info!(id = %published.id, version = %published.version, "uploaded artifact");
        Ok(published)
    }

    /// Block until the store reports the version committed. Errors if the
    /// store reports failure or the deadline passes first.
    pub async fn wait_committed(&self, artifact: &PublishedArtifact) -> Result<()> {
        if artifact.state == "committed" {
            return Ok(());
        }

        let status_url = self
            .base
            .join(&format!("api/artifacts/{}", artifact.id))
            .context("building status URL")?;
        let deadline = time::Instant::now() + COMMIT_TIMEOUT;

        loop {
            let status: ArtifactStatus = self
                .get(status_url.clone())
                .send()
                .await?
                .error_for_status()
                .with_context(|| format!("checking artifact `{}`", artifact.id))?
                .json()
                .await
                .context("decoding artifact status")?;

            match status.state.as_str() {
                "committed" => return Ok(()),
                "failed" => bail!("artifact `{}` failed to commit", artifact.id),
                other => debug!(id = %artifact.id, state = %other, "artifact not yet durable"),
            }

            if time::Instant::now() >= deadline {
                bail!(
                    "artifact `{}` not committed after {:?}",
                    artifact.id,
                    COMMIT_TIMEOUT
                );
            }
            time::sleep(COMMIT_POLL_INTERVAL).await;
        }
    }

    fn get(&self, url: Url) -> RequestBuilder {
        self.authed(self.client.get(url))
    }

    fn post(&self, url: Url) -> RequestBuilder {
        self.authed(self.client.post(url))
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

/// Split `name[:version]`, defaulting the version to `latest`.
fn split_reference(reference: &str) -> (&str, &str) {
    match reference.rsplit_once(':') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => (name, version),
        _ => (reference, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_splits_on_last_colon() {
        assert_eq!(split_reference("nyc_raw.csv:v3"), ("nyc_raw.csv", "v3"));
        assert_eq!(split_reference("nyc_raw.csv:latest"), ("nyc_raw.csv", "latest"));
    }

    #[test]
    fn reference_without_version_defaults_to_latest() {
        assert_eq!(split_reference("nyc_raw.csv"), ("nyc_raw.csv", "latest"));
        assert_eq!(split_reference("nyc_raw.csv:"), ("nyc_raw.csv:", "latest"));
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = Store::new("not a url", None).unwrap_err();
        assert!(err.to_string().contains("invalid artifact store URL"));
    }

    #[test]
    fn decodes_manifest_payload() {
        let manifest: Manifest = serde_json::from_str(
            r#"{
                "name": "nyc_raw.csv",
                "version": "v7",
                "file_name": "nyc_raw.csv",
                "download_url": "/files/abc123"
            }"#,
        )
        .expect("manifest should decode");
        assert_eq!(manifest.version, "v7");
        assert_eq!(manifest.download_url, "/files/abc123");
    }
}
