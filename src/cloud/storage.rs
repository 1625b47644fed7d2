use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tokio_util::codec::{BytesCodec, FramedRead};

use super::auth::GcpSession;
use super::{ObjectStore, REQUEST_TIMEOUT, RemoteObject};
use crate::error::PipelineError;

const STORAGE_BASE_URL: &str = "https://storage.googleapis.com";

/// Slowest sustained rate an upload may run at before it is abandoned.
const MIN_UPLOAD_BYTES_PER_SEC: u64 = 64 * 1024;

fn upload_timeout(len: u64) -> Duration {
    REQUEST_TIMEOUT + Duration::from_secs(len / MIN_UPLOAD_BYTES_PER_SEC)
}

/// Google Cloud Storage through the JSON API.
pub struct GcsStore {
    session: GcpSession,
    base_url: String,
}

impl GcsStore {
    pub fn new(session: GcpSession) -> Self {
        Self::with_base_url(session, STORAGE_BASE_URL)
    }

    pub fn with_base_url(session: GcpSession, base_url: &str) -> Self {
        Self {
            session,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn upload_url(&self, object: &RemoteObject) -> Result<Url, PipelineError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| PipelineError::UploadFailed(format!("bad storage url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| PipelineError::UploadFailed("bad storage url".into()))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", object.bucket.as_str(), "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", &object.name);
        Ok(url)
    }

    fn object_url(&self, object: &RemoteObject) -> Result<Url, PipelineError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| PipelineError::CleanupFailed(format!("bad storage url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| PipelineError::CleanupFailed("bad storage url".into()))?
            .pop_if_empty()
            .extend([
                "storage",
                "v1",
                "b",
                object.bucket.as_str(),
                "o",
                object.name.as_str(),
            ]);
        Ok(url)
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match crate::encoding::extension_of(&path.to_string_lossy()).as_str() {
        ".mp3" => "audio/mpeg",
        ".wav" => "audio/wav",
        ".flac" => "audio/flac",
        ".ogg" => "audio/ogg",
        ".amr" => "audio/amr",
        ".awb" => "audio/amr-wb",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(&self, object: &RemoteObject, local_path: &Path) -> Result<String, PipelineError> {
        let reading = |e: std::io::Error| {
            PipelineError::UploadFailed(format!("reading {}: {}", local_path.display(), e))
        };
        let file = tokio::fs::File::open(local_path).await.map_err(reading)?;
        let len = file.metadata().await.map_err(reading)?.len();
        log::debug!(
            "uploading {} bytes from {} to {}",
            len,
            local_path.display(),
            object.uri()
        );

        let body = reqwest::Body::wrap_stream(FramedRead::new(file, BytesCodec::new()));
        let response = self
            .session
            .http()
            .post(self.upload_url(object)?)
            .timeout(upload_timeout(len))
            .bearer_auth(self.session.bearer().await?)
            .header(reqwest::header::CONTENT_TYPE, content_type_for(local_path))
            .header(reqwest::header::CONTENT_LENGTH, len)
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::UploadFailed(format!(
                "storage returned {}: {}",
                status, error_text
            )));
        }

        Ok(object.uri())
    }

    async fn delete(&self, object: &RemoteObject) -> Result<(), PipelineError> {
        let response = self
            .session
            .http()
            .delete(self.object_url(object)?)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(self.session.bearer().await?)
            .send()
            .await
            .map_err(|e| PipelineError::CleanupFailed(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // never created, nothing to remove
            StatusCode::NOT_FOUND => {
                log::debug!("{} was already absent", object.uri());
                Ok(())
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(PipelineError::CleanupFailed(format!(
                    "storage returned {}: {}",
                    status, error_text
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::testing::MockServer;
    use std::io::Write;

    fn store() -> GcsStore {
        GcsStore::new(GcpSession::with_token(reqwest::Client::new(), "token"))
    }

    #[test]
    fn upload_url_carries_media_type_and_encoded_name() {
        let url = store()
            .upload_url(&RemoteObject::new("my-bucket", "dir/uploaded audio.wav"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/upload/storage/v1/b/my-bucket/o\
             ?uploadType=media&name=dir%2Fuploaded+audio.wav"
        );
    }

    #[test]
    fn object_url_encodes_name_as_one_segment() {
        let url = store()
            .object_url(&RemoteObject::new("my-bucket", "dir/a.wav"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/my-bucket/o/dir%2Fa.wav"
        );
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for(Path::new("x.MP3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("x.awb")), "audio/amr-wb");
        assert_eq!(content_type_for(Path::new("x.bin")), "application/octet-stream");
    }

    #[test]
    fn upload_timeout_grows_with_file_size() {
        assert_eq!(upload_timeout(0), REQUEST_TIMEOUT);
        assert_eq!(
            upload_timeout(1024 * 1024 * 1024),
            REQUEST_TIMEOUT + Duration::from_secs(16 * 1024)
        );
    }

    fn store_at(server: &MockServer) -> GcsStore {
        GcsStore::with_base_url(
            GcpSession::with_token(reqwest::Client::new(), "token"),
            &server.base_url,
        )
    }

    #[tokio::test]
    async fn put_streams_the_file_as_the_object_body() {
        let server =
            MockServer::start(|_, _| (200, r#"{"name": "uploaded_audio-1.wav"}"#.into())).await;
        let mut file = tempfile::NamedTempFile::with_suffix(".wav").unwrap();
        let audio: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        file.write_all(&audio).unwrap();
        let object = RemoteObject::new("my-bucket", "uploaded_audio-1.wav");

        let uri = store_at(&server).put(&object, file.path()).await.unwrap();

        assert_eq!(uri, "gs://my-bucket/uploaded_audio-1.wav");
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/upload/storage/v1/b/my-bucket/o");
        assert_eq!(
            requests[0].query,
            "uploadType=media&name=uploaded_audio-1.wav"
        );
        assert_eq!(requests[0].bearer(), Some("token"));
        assert_eq!(requests[0].body.as_ref(), audio.as_slice());
    }

    #[tokio::test]
    async fn rejected_upload_is_upload_failed() {
        let server = MockServer::start(|_, _| (403, "forbidden".into())).await;
        let file = tempfile::NamedTempFile::with_suffix(".wav").unwrap();

        let result = store_at(&server)
            .put(&RemoteObject::new("b", "a.wav"), file.path())
            .await;

        assert!(matches!(result, Err(PipelineError::UploadFailed(msg)) if msg.contains("403")));
    }

    #[tokio::test]
    async fn unreadable_file_never_reaches_the_bucket() {
        let server = MockServer::start(|_, _| (200, "{}".into())).await;

        let result = store_at(&server)
            .put(&RemoteObject::new("b", "a.wav"), Path::new("/nonexistent/a.wav"))
            .await;

        assert!(matches!(result, Err(PipelineError::UploadFailed(_))));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn delete_of_an_absent_object_succeeds() {
        let server =
            MockServer::start(|_, _| (404, r#"{"error": {"code": 404}}"#.into())).await;
        let object = RemoteObject::new("my-bucket", "uploaded_audio-1.wav");

        store_at(&server).delete(&object).await.unwrap();

        let requests = server.requests();
        assert_eq!(requests[0].method, axum::http::Method::DELETE);
        assert_eq!(
            requests[0].path,
            "/storage/v1/b/my-bucket/o/uploaded_audio-1.wav"
        );
    }

    #[tokio::test]
    async fn delete_failure_is_cleanup_failed() {
        let server = MockServer::start(|_, _| (500, "backend error".into())).await;

        let result = store_at(&server)
            .delete(&RemoteObject::new("b", "a.wav"))
            .await;

        assert!(matches!(result, Err(PipelineError::CleanupFailed(msg)) if msg.contains("500")));
    }
}
