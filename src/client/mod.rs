use crate::store::ConversationStore;
use log::{ error, info };
use reqwest::{ Client as HttpClient, StatusCode, multipart };
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Backend root used when no override is configured.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api";

/// Failures surfaced by the API client. Every variant is logged at the
/// point of detection before it is returned; callers own presentation.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure: connection refused, DNS, broken pipe.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The server answered, but with a non-success status.
    #[error("HTTP error! status: {0}")]
    Http(StatusCode),

    /// Upload rejected; carries the server's `detail` message when one
    /// could be extracted, `"Upload failed"` otherwise.
    #[error("{0}")]
    Upload(String),

    /// A success response whose body was not valid JSON.
    #[error("failed to decode response body: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

/// Thin wrapper over the backend chat API. Holds the shared
/// [`ConversationStore`] so `send_message` can drive the loading flag.
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
    store: Arc<ConversationStore>,
}

/// Holds `is_loading` true for the duration of a scope; resets it on
/// drop so every exit path, including errors, releases the flag.
struct LoadingGuard<'a> {
    store: &'a ConversationStore,
}

impl<'a> LoadingGuard<'a> {
    fn engage(store: &'a ConversationStore) -> Self {
        store.is_loading.set(true);
        Self { store }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.is_loading.set(false);
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, store: Arc<ConversationStore>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: HttpClient::new(),
            base_url,
            store,
        }
    }

    /// Send `question` to the backend, continuing `conversation_id` if
    /// given. The JSON reply is returned as-is; its shape is the
    /// server's contract, not validated here.
    ///
    /// `is_loading` is set true on entry and reset false on every exit
    /// path, success or failure. Single attempt, no retry or timeout.
    pub async fn send_message(
        &self,
        question: &str,
        conversation_id: Option<&str>
    ) -> Result<Value, ApiError> {
        let _loading = LoadingGuard::engage(&self.store);

        let url = format!("{}/prompt", self.base_url);
        let request = PromptRequest { question, conversation_id };

        let response = self.http
            .post(&url)
            .json(&request)
            .send().await
            .map_err(|e| {
                error!("Error sending message: {}", e);
                ApiError::Network(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let err = ApiError::Http(status);
            error!("Error sending message: {}", err);
            return Err(err);
        }

        response
            .json::<Value>().await
            .map_err(|e| {
                error!("Error sending message: {}", e);
                ApiError::Decode(e)
            })
    }

    /// Upload a document as a multipart form with field name `file`.
    /// On rejection the failure message is taken from the `detail`
    /// field of the server's JSON body when present.
    ///
    /// Does not touch `is_loading`; only `send_message` drives it.
    pub async fn upload_document(
        &self,
        file_name: &str,
        bytes: Vec<u8>
    ) -> Result<Value, ApiError> {
        let url = format!("{}/document", self.base_url);
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        let response = self.http
            .post(&url)
            .multipart(form)
            .send().await
            .map_err(|e| {
                error!("Upload error: {}", e);
                ApiError::Network(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<Value>().await {
                Ok(body) =>
                    body
                        .get("detail")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| "Upload failed".to_string()),
                Err(_) => "Upload failed".to_string(),
            };
            let err = ApiError::Upload(message);
            error!("Upload error: {}", err);
            return Err(err);
        }

        response
            .json::<Value>().await
            .map_err(|e| {
                error!("Upload error: {}", e);
                ApiError::Decode(e)
            })
    }

    /// Read a file from disk and upload it under its final path
    /// component.
    pub async fn upload_document_from_path(&self, path: &Path) -> Result<Value, ApiError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            error!("Upload error: failed to read '{}': {}", path.display(), e);
            ApiError::Upload(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        info!("Uploading '{}' ({} bytes)", file_name, bytes.len());
        self.upload_document(&file_name, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{ body_json, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn client_for(base: &str) -> (ApiClient, Arc<ConversationStore>) {
        let store = Arc::new(ConversationStore::new());
        (ApiClient::new(base, Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn send_message_passes_reply_through_unchanged() {
        let server = MockServer::start().await;
        let reply = json!({"answer": "hi", "conversation_id": "abc"});
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .and(body_json(json!({"question": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply.clone()))
            .mount(&server).await;

        let (client, _store) = client_for(&server.uri());
        let got = client.send_message("hello", None).await.unwrap();
        assert_eq!(got, reply);
    }

    #[tokio::test]
    async fn send_message_includes_conversation_id_when_given() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .and(body_json(json!({"question": "again", "conversation_id": "abc"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answer": "ok"})))
            .mount(&server).await;

        let (client, _store) = client_for(&server.uri());
        let got = client.send_message("again", Some("abc")).await.unwrap();
        assert_eq!(got["answer"], "ok");
    }

    #[tokio::test]
    async fn send_message_cycles_loading_flag_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server).await;

        let (client, store) = client_for(&server.uri());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.is_loading.subscribe(move |v: &bool| {
            sink.lock().unwrap().push(*v);
        });

        client.send_message("hello", None).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
        assert!(!store.is_loading.get());
    }

    #[tokio::test]
    async fn send_message_fails_with_status_and_resets_loading() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server).await;

        let (client, store) = client_for(&server.uri());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.is_loading.subscribe(move |v: &bool| {
            sink.lock().unwrap().push(*v);
        });

        let err = client.send_message("hello", None).await.unwrap_err();
        match err {
            ApiError::Http(status) => assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR),
            other => panic!("expected Http error, got {:?}", other),
        }
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn send_message_resets_loading_on_network_failure() {
        // Nothing listens on this port; the connection is refused.
        let (client, store) = client_for("http://127.0.0.1:1");

        let err = client.send_message("hello", None).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert!(!store.is_loading.get());
    }

    #[tokio::test]
    async fn send_message_fails_on_unparseable_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server).await;

        let (client, store) = client_for(&server.uri());
        let err = client.send_message("hello", None).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert!(!store.is_loading.get());
    }

    #[tokio::test]
    async fn upload_passes_reply_through_and_leaves_loading_alone() {
        let server = MockServer::start().await;
        let reply = json!({"filename": "notes.pdf", "chunk_count": 3, "status": "success"});
        Mock::given(method("POST"))
            .and(path("/document"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply.clone()))
            .mount(&server).await;

        let (client, store) = client_for(&server.uri());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.is_loading.subscribe(move |v: &bool| {
            sink.lock().unwrap().push(*v);
        });

        let got = client.upload_document("notes.pdf", b"%PDF-1.4".to_vec()).await.unwrap();
        assert_eq!(got, reply);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_extracts_detail_from_rejection_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/document"))
            .respond_with(
                ResponseTemplate::new(413).set_body_json(json!({"detail": "file too large"}))
            )
            .mount(&server).await;

        let (client, _store) = client_for(&server.uri());
        let err = client.upload_document("big.pdf", vec![0; 16]).await.unwrap_err();
        match err {
            ApiError::Upload(message) => assert_eq!(message, "file too large"),
            other => panic!("expected Upload error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn upload_falls_back_to_generic_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/document"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server).await;

        let (client, _store) = client_for(&server.uri());
        let err = client.upload_document("doc.pdf", vec![1, 2, 3]).await.unwrap_err();
        match err {
            ApiError::Upload(message) => assert_eq!(message, "Upload failed"),
            other => panic!("expected Upload error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn upload_falls_back_when_detail_is_not_a_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/document"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"detail": [1, 2]})))
            .mount(&server).await;

        let (client, _store) = client_for(&server.uri());
        let err = client.upload_document("doc.pdf", vec![1]).await.unwrap_err();
        match err {
            ApiError::Upload(message) => assert_eq!(message, "Upload failed"),
            other => panic!("expected Upload error, got {:?}", other),
        }
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let store = Arc::new(ConversationStore::new());
        let client = ApiClient::new("http://localhost:8000/api/", store);
        assert_eq!(client.base_url, "http://localhost:8000/api");
    }
}
