use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::UTConfig;
use crate::domain::UTError;
use crate::record::{Record, RecordSet};

/// Shown for any non-success HTTP status.
pub const FETCH_FAILED_MESSAGE: &str = "Unable to fetch users, please try again later.";

const USER_AGENT: &str = concat!("ut/", env!("CARGO_PKG_VERSION"));

/// Where the record set comes from. Each `fetch` yields a complete, fresh set.
#[derive(Debug, Clone)]
pub enum RecordSource {
    Http(HttpSource),
    File(FileSource),
}

impl RecordSource {
    pub fn from_config(config: &UTConfig) -> Result<Self, UTError> {
        match &config.file {
            Some(path) => Ok(RecordSource::File(FileSource::new(path.clone()))),
            None => Ok(RecordSource::Http(HttpSource::new(
                &config.url,
                Duration::from_secs(config.request_timeout_secs),
            )?)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RecordSource::Http(s) => s.url.clone(),
            RecordSource::File(s) => s.path.to_string_lossy().to_string(),
        }
    }

    pub async fn fetch(&self) -> Result<RecordSet, UTError> {
        let start_time = Instant::now();
        let body = match self {
            RecordSource::Http(s) => s.fetch_body().await,
            RecordSource::File(s) => s.read_body().await,
        }
        .inspect_err(|e| warn!("Loading {} failed: {e}", self.describe()))?;

        let records = Record::from_json(body)?;
        info!(
            "Loaded {} records from {} in {}ms",
            records.len(),
            self.describe(),
            start_time.elapsed().as_millis()
        );
        Ok(Arc::new(records))
    }
}

#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    client: Client,
}

impl HttpSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, UTError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| UTError::config(format!("Unable to build http client: {e}")))?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    async fn fetch_body(&self) -> Result<Value, UTError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("GET {} returned {status}", self.url);
            return Err(UTError::fetch(FETCH_FAILED_MESSAGE));
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| UTError::fetch(format!("Invalid response from server: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn read_body(&self) -> Result<Value, UTError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            UTError::fetch(format!("Unable to read {}: {e}", self.path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            UTError::fetch(format!("Invalid JSON in {}: {e}", self.path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http(server: &MockServer) -> RecordSource {
        RecordSource::Http(
            HttpSource::new(&format!("{}/users", server.uri()), Duration::from_secs(5)).unwrap(),
        )
    }

    #[tokio::test]
    async fn fetches_users_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 1, "name": "Leanne Graham", "company": { "name": "Romaguera-Crona" } },
                { "id": 2, "name": "Ervin Howell", "company": { "name": "Deckow-Crist" } },
            ])))
            .mount(&server)
            .await;

        let records = http(&server).fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].text(&"company.name".parse().unwrap()).unwrap(),
            "Deckow-Crist"
        );
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = http(&server).fetch().await.unwrap_err();
        assert!(matches!(err, UTError::FetchFailure(ref m) if m == FETCH_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn malformed_body_is_a_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = http(&server).fetch().await.unwrap_err();
        assert!(matches!(err, UTError::FetchFailure(_)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([]))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let source = RecordSource::Http(
            HttpSource::new(
                &format!("{}/users", server.uri()),
                Duration::from_millis(200),
            )
            .unwrap(),
        );
        assert!(matches!(
            source.fetch().await.unwrap_err(),
            UTError::FetchFailure(_)
        ));
    }

    #[tokio::test]
    async fn reads_records_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id": 7, "name": "Kurtis Weissnat"}}]"#).unwrap();

        let source = RecordSource::File(FileSource::new(file.path().to_path_buf()));
        let records = source.fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text(&"name".parse().unwrap()).unwrap(), "Kurtis Weissnat");
    }

    #[tokio::test]
    async fn fixture_users_support_company_search() {
        let path = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/users.json"));
        let records = RecordSource::File(FileSource::new(path)).fetch().await.unwrap();
        assert_eq!(records.len(), 10);

        let pipeline = crate::pipeline::ListViewPipeline::new(
            "company.name".parse().unwrap(),
            "name".parse().unwrap(),
        );
        let state = crate::pipeline::ViewState::new(8).unwrap().with_search_term("llc");
        let view = pipeline.derive_view(&records, &state).unwrap();
        let ids: Vec<usize> = view.rows.iter().map(|r| r.position()).collect();
        assert_eq!(ids, vec![4, 9]);
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_failure() {
        let source = RecordSource::File(FileSource::new("/nonexistent/users.json".into()));
        assert!(matches!(
            source.fetch().await.unwrap_err(),
            UTError::FetchFailure(_)
        ));
    }

    #[tokio::test]
    async fn object_body_is_invalid_data() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"users": []}}"#).unwrap();

        let source = RecordSource::File(FileSource::new(file.path().to_path_buf()));
        assert!(matches!(
            source.fetch().await.unwrap_err(),
            UTError::InvalidData(_)
        ));
    }
}
