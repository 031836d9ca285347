use crate::config::ClientConfig;
use crate::criteria::{FilterCriteria, MetaLookup, ReportEndpoint};
use crate::error::{ReportError, Result};
use crate::export::{check_filename, ExportFormat};
use crate::response::RawResponse;
use crate::schema::ReportRow;
use crate::session::SessionStore;
use futures::StreamExt;
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

const REPORT_DATA_SEGMENT: &str = "get-report-data";
const META_SEGMENT: &str = "report-meta";
const SESSION_EXPIRED_MARKER: &str = "session expired";

#[derive(Clone)]
pub struct ReportClient {
    client: Client,
    config: ClientConfig,
    session: Arc<dyn SessionStore>,
}

impl ReportClient {
    pub fn new(config: ClientConfig, session: Arc<dyn SessionStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: Client::builder().build()?,
            config,
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    /// Rows of one report. The criteria are validated before anything is sent.
    pub async fn fetch_report(
        &self,
        endpoint: &ReportEndpoint,
        criteria: &FilterCriteria,
    ) -> Result<Vec<ReportRow>> {
        criteria.validate()?;
        let url = self
            .config
            .endpoint_url(&format!("{}/{}", endpoint.path, REPORT_DATA_SEGMENT));
        let payload = self.payload(endpoint, criteria);

        let body = self.with_timeout(self.post_text(&url, &payload)).await?;
        let rows = RawResponse::classify(&body).into_rows(self.config.repair_malformed)?;

        info!("Fetched {} rows from {}", rows.len(), endpoint.path);
        Ok(rows)
    }

    pub async fn fetch_lookup(
        &self,
        lookup: MetaLookup,
        criteria: &FilterCriteria,
    ) -> Result<Vec<ReportRow>> {
        let url = self
            .config
            .endpoint_url(&format!("{}/{}", META_SEGMENT, lookup.endpoint()));
        let payload = criteria
            .clone()
            .with_login_defaults(&self.config.login_userid, &self.config.login_hlevel)
            .lookup_payload();

        let body = self.with_timeout(self.post_text(&url, &payload)).await?;
        let entries = RawResponse::classify(&body).into_rows(self.config.repair_malformed)?;

        debug!("Lookup {} returned {} entries", lookup.endpoint(), entries.len());
        Ok(entries)
    }

    /// The generated file as bytes.
    pub async fn export(
        &self,
        endpoint: &ReportEndpoint,
        criteria: &FilterCriteria,
        format: ExportFormat,
    ) -> Result<Vec<u8>> {
        criteria.validate()?;
        let url = self.export_url(endpoint, format);
        let payload = self.payload(endpoint, criteria);

        let bytes = self
            .with_timeout(async {
                let response = self.post(&url, &payload).await?;
                Ok::<_, ReportError>(response.bytes().await?.to_vec())
            })
            .await?;

        info!("Downloaded {} byte {:?} export", bytes.len(), format);
        Ok(bytes)
    }

    /// Streams the generated file into the configured download directory under `filename`.
    ///
    /// Chunks go to a temporary file next to the target, which is renamed into place once
    /// the body is complete. A failed or timed out download removes the temporary file.
    pub async fn export_to(
        &self,
        endpoint: &ReportEndpoint,
        criteria: &FilterCriteria,
        format: ExportFormat,
        filename: &str,
    ) -> Result<PathBuf> {
        criteria.validate()?;
        check_filename(filename)?;

        let url = self.export_url(endpoint, format);
        let payload = self.payload(endpoint, criteria);
        let dir = self.config.download_dir.clone();
        let target = dir.join(filename);

        self.with_timeout(async {
            let response = self.post(&url, &payload).await?;

            tokio::fs::create_dir_all(&dir).await?;
            let (std_file, temp_path) = NamedTempFile::new_in(&dir)?.into_parts();
            let mut file = tokio::fs::File::from_std(std_file);

            let mut stream = response.bytes_stream();
            let mut written: u64 = 0;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            drop(file);

            temp_path
                .persist(&target)
                .map_err(|e| ReportError::IoError(e.error))?;

            info!("Saved {} byte export to {}", written, target.display());
            Ok::<_, ReportError>(target.clone())
        })
        .await
    }

    fn payload(&self, endpoint: &ReportEndpoint, criteria: &FilterCriteria) -> Value {
        criteria
            .clone()
            .with_login_defaults(&self.config.login_userid, &self.config.login_hlevel)
            .to_payload(endpoint.division_key)
    }

    fn export_url(&self, endpoint: &ReportEndpoint, format: ExportFormat) -> String {
        self.config
            .endpoint_url(&format!("{}/{}", endpoint.path, format.endpoint()))
    }

    async fn with_timeout<T, F>(&self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = self.config.timeout();
        match tokio::time::timeout(limit, request).await {
            Ok(result) => result.map_err(|e| match e {
                ReportError::Timeout(_) => ReportError::Timeout(limit),
                other => other,
            }),
            Err(_) => {
                warn!("Request cancelled after {:?}", limit);
                Err(ReportError::Timeout(limit))
            }
        }
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<Response> {
        debug!("POST {}", url);

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(payload);
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(self.expire_session(format!("server answered {}", status)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_session_expired(&body) {
                return Err(self.expire_session(body));
            }
            return Err(ReportError::ServerError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn post_text(&self, url: &str, payload: &Value) -> Result<String> {
        let body = self.post(url, payload).await?.text().await?;
        if is_session_expired(&body) {
            return Err(self.expire_session(body));
        }
        Ok(body)
    }

    fn expire_session(&self, reason: String) -> ReportError {
        warn!("Session rejected, clearing stored token: {}", reason);
        if let Err(e) = self.session.clear() {
            warn!("Failed to clear session store: {}", e);
        }
        ReportError::Unauthenticated(reason)
    }
}

fn is_session_expired(body: &str) -> bool {
    body.to_lowercase().contains(SESSION_EXPIRED_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expired_detection() {
        assert!(is_session_expired(r#"{"message":"Session Expired"}"#));
        assert!(!is_session_expired(r#"[{"region":"North"}]"#));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let session = Arc::new(crate::session::MemorySessionStore::new());
        assert!(ReportClient::new(ClientConfig::new("localhost"), session).is_err());
    }
}
