//! Reporting engine client: request construction, response mapping and the
//! public operations built on them.
//!
//! # Design
//! Each endpoint is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`. Both
//! are pure. The public operations glue them together through the client's
//! `Transport` and wrap every failure in a `ClientError` tagged with the
//! operation. Nothing is retried and no state is kept between calls.

use std::{fs, path::Path};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ApiError, ClientError, Operation};
use crate::http::{FilePart, HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::id::{generate, non_empty};
use crate::transport::{BlockingTransport, Transport};

/// Multipart field carrying uploaded content.
pub const UPLOAD_FIELD: &str = "file";
pub const UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";
pub const TASK_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Everything except RFC 3986 unreserved characters is escaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Client for the reporting engine REST API.
///
/// Cheap to share: with the default `BlockingTransport` it is `Send + Sync`
/// and concurrent calls are independent.
#[derive(Debug, Clone)]
pub struct ReportingClient<T = BlockingTransport> {
    base_url: String,
    transport: T,
}

impl ReportingClient<BlockingTransport> {
    /// Builds the HTTP transport (timeout and trust policy) from `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let transport = BlockingTransport::from_config(config)?;
        Ok(Self::with_transport(&config.base_url, transport))
    }
}

impl<T: Transport> ReportingClient<T> {
    pub fn with_transport(base_url: &str, transport: T) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Uploads the file at `path` through `upload_data`. The part's file name
    /// is `filename` when given and non-empty, otherwise the path's base name.
    /// A failed upload nests the data upload's error as the cause.
    pub fn upload_file(
        &self,
        path: impl AsRef<Path>,
        file_id: Option<Uuid>,
        filename: Option<&str>,
    ) -> Result<Uuid, ClientError> {
        let path = path.as_ref();
        let run = || -> Result<Uuid, ApiError> {
            let name = upload_file_name(path, filename);
            let data = fs::read(path)?;
            self.upload_data(data, &name, file_id)
                .map_err(|e| ApiError::Nested(Box::new(e)))
        };
        run().map_err(failed(Operation::UploadFile))
    }

    /// Uploads raw bytes under `filename`; returns the folder id reported by
    /// the server.
    pub fn upload_data(
        &self,
        data: impl Into<Vec<u8>>,
        filename: &str,
        file_id: Option<Uuid>,
    ) -> Result<Uuid, ClientError> {
        let request = self.build_upload_data(generate(file_id), data.into(), filename);
        self.send(request)
            .and_then(|resp| self.parse_upload_data(resp))
            .map_err(failed(Operation::UploadData))
    }

    /// Downloads the content of a folder, or one named file within it.
    pub fn download_data(&self, folder_id: Uuid, filename: Option<&str>) -> Result<Vec<u8>, ClientError> {
        self.send(self.build_download_data(folder_id, filename))
            .and_then(|resp| self.parse_download_data(resp))
            .map_err(failed(Operation::DownloadData))
    }

    /// Deletes one folder, or every folder when `folder_id` is `None`.
    pub fn delete(&self, folder_id: Option<Uuid>) -> Result<bool, ClientError> {
        self.send(self.build_delete(folder_id))
            .and_then(|resp| self.parse_delete(resp))
            .map_err(failed(Operation::Delete))
    }

    /// Submits a job description; returns the task id reported by the server.
    pub fn run_task(&self, job_json: &str, task_id: Option<Uuid>) -> Result<Uuid, ClientError> {
        self.send(self.build_run_task(generate(task_id), job_json))
            .and_then(|resp| self.parse_run_task(resp))
            .map_err(failed(Operation::RunTask))
    }

    /// Stops one task, or every task when `task_id` is `None`.
    pub fn stop_task(&self, task_id: Option<Uuid>) -> Result<bool, ClientError> {
        self.send(self.build_stop_task(task_id))
            .and_then(|resp| self.parse_stop_task(resp))
            .map_err(failed(Operation::StopTask))
    }

    pub fn get_status(&self, task_id: Uuid) -> Result<String, ClientError> {
        self.send(self.build_get_status(task_id))
            .and_then(|resp| self.parse_get_status(resp))
            .map_err(failed(Operation::GetStatus))
    }

    pub fn get_all_status(&self) -> Result<String, ClientError> {
        self.send(self.build_get_all_status())
            .and_then(|resp| self.parse_get_all_status(resp))
            .map_err(failed(Operation::GetAllStatus))
    }

    pub fn health_status(&self) -> Result<String, ClientError> {
        self.send(self.build_health_status())
            .and_then(|resp| self.parse_health_status(resp))
            .map_err(failed(Operation::HealthStatus))
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.transport.execute(request)
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    pub fn build_upload_data(&self, id: Uuid, data: Vec<u8>, filename: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            url: self.url(&format!("/upload/{id}")),
            headers: Vec::new(),
            body: RequestBody::Multipart(FilePart {
                field_name: UPLOAD_FIELD.to_string(),
                file_name: filename.to_string(),
                content_type: UPLOAD_CONTENT_TYPE.to_string(),
                data,
            }),
        }
    }

    pub fn build_download_data(&self, folder_id: Uuid, filename: Option<&str>) -> HttpRequest {
        let mut path = format!("/download/{folder_id}");
        if let Some(name) = non_empty(filename) {
            path.push_str("?filename=");
            path.extend(utf8_percent_encode(name, QUERY_VALUE));
        }
        self.get(&path)
    }

    pub fn build_delete(&self, folder_id: Option<Uuid>) -> HttpRequest {
        self.delete_at(&item_path("/delete", folder_id))
    }

    pub fn build_run_task(&self, task_id: Uuid, job_json: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            url: self.url(&format!("/task/{task_id}")),
            headers: vec![("content-type".to_string(), TASK_CONTENT_TYPE.to_string())],
            body: RequestBody::Json(job_json.to_string()),
        }
    }

    pub fn build_stop_task(&self, task_id: Option<Uuid>) -> HttpRequest {
        self.delete_at(&item_path("/task", task_id))
    }

    pub fn build_get_status(&self, task_id: Uuid) -> HttpRequest {
        self.get(&format!("/status/{task_id}"))
    }

    pub fn build_get_all_status(&self) -> HttpRequest {
        self.get("/status/all")
    }

    pub fn build_health_status(&self) -> HttpRequest {
        self.get("/health")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, path: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: self.url(path),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    fn delete_at(&self, path: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Delete,
            url: self.url(path),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    // -----------------------------------------------------------------------
    // Response parsers
    // -----------------------------------------------------------------------

    pub fn parse_upload_data(&self, response: HttpResponse) -> Result<Uuid, ApiError> {
        parse_identifier(response)
    }

    pub fn parse_download_data(&self, response: HttpResponse) -> Result<Vec<u8>, ApiError> {
        check_success(&response)?;
        Ok(response.body)
    }

    pub fn parse_delete(&self, response: HttpResponse) -> Result<bool, ApiError> {
        check_success(&response)?;
        Ok(true)
    }

    pub fn parse_run_task(&self, response: HttpResponse) -> Result<Uuid, ApiError> {
        parse_identifier(response)
    }

    pub fn parse_stop_task(&self, response: HttpResponse) -> Result<bool, ApiError> {
        check_success(&response)?;
        Ok(true)
    }

    pub fn parse_get_status(&self, response: HttpResponse) -> Result<String, ApiError> {
        parse_text(response)
    }

    pub fn parse_get_all_status(&self, response: HttpResponse) -> Result<String, ApiError> {
        parse_text(response)
    }

    /// Unlike the other parsers, a failed health check carries only the
    /// reason phrase.
    pub fn parse_health_status(&self, response: HttpResponse) -> Result<String, ApiError> {
        if !response.is_success() {
            return Err(ApiError::Unavailable(response.reason_phrase().to_string()));
        }
        Ok(String::from_utf8(response.body)?)
    }
}

/// File name sent with an upload: the explicit one when non-empty, else the
/// base name of `path`.
pub fn upload_file_name(path: &Path, filename: Option<&str>) -> String {
    match non_empty(filename) {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

fn item_path(collection: &str, id: Option<Uuid>) -> String {
    match id {
        Some(id) => format!("{collection}/{id}"),
        None => collection.to_string(),
    }
}

/// Map a non-2xx status to `ApiError::Http` carrying the full response dump.
fn check_success(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::Http {
        status: response.status,
        description: response.describe(),
    })
}

fn parse_identifier(response: HttpResponse) -> Result<Uuid, ApiError> {
    check_success(&response)?;
    Ok(serde_json::from_slice(&response.body)?)
}

fn parse_text(response: HttpResponse) -> Result<String, ApiError> {
    check_success(&response)?;
    Ok(String::from_utf8(response.body)?)
}

fn failed(operation: Operation) -> impl FnOnce(ApiError) -> ClientError {
    move |source| {
        tracing::warn!(error = %source, "{}", operation.message());
        ClientError::new(operation, source)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    const BASE: &str = "http://localhost:40263";

    /// Records requests and replays queued outcomes.
    #[derive(Default)]
    struct ScriptedTransport {
        requests: Mutex<Vec<HttpRequest>>,
        replies: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
    }

    impl ScriptedTransport {
        fn replying(reply: Result<HttpResponse, ApiError>) -> Self {
            let t = Self::default();
            t.replies.lock().unwrap().push_back(reply);
            t
        }

        fn last_request(&self) -> HttpRequest {
            self.requests.lock().unwrap().last().cloned().expect("a request was sent")
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ok(b"")))
        }
    }

    fn ok(body: &[u8]) -> HttpResponse {
        status(200, body)
    }

    fn status(code: u16, body: &[u8]) -> HttpResponse {
        HttpResponse {
            status: code,
            reason: Some(
                match code {
                    200 => "OK",
                    404 => "Not Found",
                    500 => "Internal Server Error",
                    503 => "Service Unavailable",
                    _ => "",
                }
                .to_string(),
            ),
            headers: Vec::new(),
            body: body.to_vec(),
        }
    }

    fn json_id(id: Uuid) -> Vec<u8> {
        format!("\"{id}\"").into_bytes()
    }

    fn client(reply: Result<HttpResponse, ApiError>) -> ReportingClient<ScriptedTransport> {
        ReportingClient::with_transport(BASE, ScriptedTransport::replying(reply))
    }

    fn refused() -> ApiError {
        ApiError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"))
    }

    // --- builders ---

    #[test]
    fn build_upload_data_produces_multipart_request() {
        let c = client(Ok(ok(b"")));
        let req = c.build_upload_data(Uuid::nil(), vec![1, 2], "a.bin");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, format!("{BASE}/upload/00000000-0000-0000-0000-000000000000"));
        let RequestBody::Multipart(part) = req.body else {
            panic!("expected multipart body");
        };
        assert_eq!(part.field_name, "file");
        assert_eq!(part.file_name, "a.bin");
        assert_eq!(part.content_type, "application/octet-stream");
        assert_eq!(part.data, vec![1, 2]);
    }

    #[test]
    fn build_download_without_filename_has_no_query() {
        let c = client(Ok(ok(b"")));
        let id = Uuid::nil();
        assert_eq!(c.build_download_data(id, None).url, format!("{BASE}/download/{id}"));
        assert_eq!(c.build_download_data(id, Some("")).url, format!("{BASE}/download/{id}"));
    }

    #[test]
    fn build_download_escapes_filename() {
        let c = client(Ok(ok(b"")));
        let id = Uuid::nil();
        let req = c.build_download_data(id, Some("my report & co/ü.pdf"));
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.url,
            format!("{BASE}/download/{id}?filename=my%20report%20%26%20co%2F%C3%BC.pdf")
        );
    }

    #[test]
    fn optional_ids_select_collection_or_item_endpoint() {
        let c = client(Ok(ok(b"")));
        let id = Uuid::nil();
        assert_eq!(c.build_delete(None).url, format!("{BASE}/delete"));
        assert_eq!(c.build_delete(Some(id)).url, format!("{BASE}/delete/{id}"));
        assert_eq!(c.build_stop_task(None).url, format!("{BASE}/task"));
        assert_eq!(c.build_stop_task(Some(id)).url, format!("{BASE}/task/{id}"));
        assert_eq!(c.build_delete(None).method, HttpMethod::Delete);
        assert_eq!(c.build_stop_task(None).method, HttpMethod::Delete);
    }

    #[test]
    fn build_run_task_passes_json_through() {
        let c = client(Ok(ok(b"")));
        let id = Uuid::nil();
        let req = c.build_run_task(id, r#"{"tasks":[]}"#);
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, format!("{BASE}/task/{id}"));
        assert_eq!(req.body, RequestBody::Json(r#"{"tasks":[]}"#.to_string()));
        assert_eq!(
            req.headers,
            vec![("content-type".to_string(), "application/json; charset=utf-8".to_string())]
        );
    }

    #[test]
    fn status_and_health_routes() {
        let c = client(Ok(ok(b"")));
        let id = Uuid::nil();
        assert_eq!(c.build_get_status(id).url, format!("{BASE}/status/{id}"));
        assert_eq!(c.build_get_all_status().url, format!("{BASE}/status/all"));
        assert_eq!(c.build_health_status().url, format!("{BASE}/health"));
        assert!(c.build_health_status().body.is_empty());
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let c = ReportingClient::with_transport("http://localhost:40263/", ScriptedTransport::default());
        assert_eq!(c.base_url(), "http://localhost:40263");
        assert_eq!(c.build_health_status().url, "http://localhost:40263/health");
    }

    #[test]
    fn upload_file_name_prefers_explicit_name() {
        let path = Path::new("/data/input/sales.xlsx");
        assert_eq!(upload_file_name(path, Some("renamed.xlsx")), "renamed.xlsx");
        assert_eq!(upload_file_name(path, Some("")), "sales.xlsx");
        assert_eq!(upload_file_name(path, None), "sales.xlsx");
    }

    // --- parsers ---

    #[test]
    fn parse_identifier_reads_json_string() {
        let id = Uuid::new_v4();
        let c = client(Ok(ok(b"")));
        assert_eq!(c.parse_upload_data(ok(&json_id(id))).unwrap(), id);
        assert_eq!(c.parse_run_task(ok(&json_id(id))).unwrap(), id);
    }

    #[test]
    fn parse_identifier_rejects_bad_json() {
        let c = client(Ok(ok(b"")));
        let err = c.parse_run_task(ok(b"not json")).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[test]
    fn non_success_carries_full_description() {
        let c = client(Ok(ok(b"")));
        let err = c.parse_get_status(status(500, b"boom")).unwrap_err();
        match err {
            ApiError::Http { status, description } => {
                assert_eq!(status, 500);
                assert!(description.contains("Internal Server Error"));
                assert!(description.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_health_failure_carries_reason_phrase_only() {
        let c = client(Ok(ok(b"")));
        let err = c.parse_health_status(status(503, b"details")).unwrap_err();
        assert!(matches!(&err, ApiError::Unavailable(reason) if reason == "Service Unavailable"));
    }

    #[test]
    fn parse_text_rejects_invalid_utf8() {
        let c = client(Ok(ok(b"")));
        let err = c.parse_get_all_status(ok(&[0xff, 0xfe])).unwrap_err();
        assert!(matches!(err, ApiError::InvalidText(_)));
    }

    // --- operations ---

    #[test]
    fn upload_data_without_id_generates_one() {
        let returned = Uuid::new_v4();
        let c = client(Ok(ok(&json_id(returned))));
        let id = c.upload_data(vec![0x01, 0x02], "a.bin", None).unwrap();
        assert_eq!(id, returned);

        let req = c.transport().last_request();
        let sent_id: Uuid = req.url.rsplit('/').next().unwrap().parse().unwrap();
        assert_eq!(sent_id.get_version_num(), 4);
    }

    #[test]
    fn upload_data_with_id_uses_it() {
        let id = Uuid::new_v4();
        let c = client(Ok(ok(&json_id(id))));
        c.upload_data(&b"x"[..], "x.txt", Some(id)).unwrap();
        assert_eq!(c.transport().last_request().url, format!("{BASE}/upload/{id}"));
    }

    #[test]
    fn upload_file_reads_file_and_uses_base_name() {
        let dir = std::env::temp_dir().join(format!("reporting-upload-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("input.csv");
        fs::write(&path, b"a;b\n1;2\n").unwrap();

        let id = Uuid::new_v4();
        let c = client(Ok(ok(&json_id(id))));
        assert_eq!(c.upload_file(&path, Some(id), None).unwrap(), id);
        let RequestBody::Multipart(part) = c.transport().last_request().body else {
            panic!("expected multipart body");
        };
        assert_eq!(part.file_name, "input.csv");
        assert_eq!(part.data, b"a;b\n1;2\n");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn upload_file_missing_file_fails_without_request() {
        let c = client(Ok(ok(b"")));
        let err = c
            .upload_file("/definitely/not/here.bin", None, Some("x.bin"))
            .unwrap_err();
        assert_eq!(err.operation, Operation::UploadFile);
        assert!(matches!(err.source, ApiError::Io(_)));
        assert!(c.transport().requests.lock().unwrap().is_empty());
    }

    #[test]
    fn upload_file_failure_nests_data_upload_error() {
        let dir = std::env::temp_dir().join(format!("reporting-upload-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("input.csv");
        fs::write(&path, b"x").unwrap();

        let c = client(Err(refused()));
        let err = c.upload_file(&path, None, None).unwrap_err();
        assert_eq!(err.operation, Operation::UploadFile);
        assert_eq!(err.to_string(), "The data file to rest api failed.");
        let ApiError::Nested(inner) = &err.source else {
            panic!("expected nested data upload error, got {:?}", err.source);
        };
        assert_eq!(inner.operation, Operation::UploadData);
        assert_eq!(inner.to_string(), "The data upload to rest api failed.");
        assert!(matches!(inner.source, ApiError::Io(_)));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn download_returns_raw_bytes() {
        let c = client(Ok(ok(&[0x00, 0xff, 0x10])));
        assert_eq!(c.download_data(Uuid::nil(), None).unwrap(), vec![0x00, 0xff, 0x10]);
    }

    #[test]
    fn delete_and_stop_return_true() {
        let c = client(Ok(ok(b"")));
        assert!(c.delete(None).unwrap());
        assert!(c.stop_task(Some(Uuid::nil())).unwrap());
    }

    #[test]
    fn status_calls_return_text() {
        let c = client(Ok(ok(br#"{"status":"Running"}"#)));
        assert_eq!(c.get_status(Uuid::nil()).unwrap(), r#"{"status":"Running"}"#);
        assert_eq!(c.get_all_status().unwrap(), "");
    }

    #[test]
    fn failures_are_wrapped_with_operation() {
        type Call = fn(&ReportingClient<ScriptedTransport>) -> Result<(), ClientError>;
        let cases: [(Operation, Call); 8] = [
            (Operation::UploadData, |c| c.upload_data(vec![1], "a", None).map(drop)),
            (Operation::DownloadData, |c| c.download_data(Uuid::nil(), None).map(drop)),
            (Operation::Delete, |c| c.delete(None).map(drop)),
            (Operation::RunTask, |c| c.run_task("{}", None).map(drop)),
            (Operation::StopTask, |c| c.stop_task(None).map(drop)),
            (Operation::GetStatus, |c| c.get_status(Uuid::nil()).map(drop)),
            (Operation::GetAllStatus, |c| c.get_all_status().map(drop)),
            (Operation::HealthStatus, |c| c.health_status().map(drop)),
        ];
        for (operation, call) in cases {
            let c = client(Err(refused()));
            let err = call(&c).unwrap_err();
            assert_eq!(err.operation, operation);
            assert_eq!(err.to_string(), operation.message());
            assert!(matches!(err.source, ApiError::Io(_)));
        }
    }

    #[test]
    fn health_failure_surfaces_reason_phrase() {
        let c = client(Ok(status(503, b"ignored body")));
        let err = c.health_status().unwrap_err();
        assert_eq!(err.to_string(), "The health status request to rest api failed.");
        assert_eq!(err.source.to_string(), "Service Unavailable");
    }

    #[test]
    fn client_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ReportingClient>();
    }
}
