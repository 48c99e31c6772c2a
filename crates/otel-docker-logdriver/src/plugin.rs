//! Docker plugin handshake.
//!
//! The daemon drives logging plugins over HTTP/1 on a unix socket under
//! `/run/docker/plugins/`. This module is thin RPC glue: it decodes the
//! handshake payloads and forwards start/stop to the [`Driver`]; every
//! policy decision lives elsewhere.
//!
//! | Endpoint                   | Behavior                                  |
//! |----------------------------|-------------------------------------------|
//! | `/Plugin.Activate`         | advertise the `LoggingDriver` capability  |
//! | `/LogDriver.StartLogging`  | open + register the container stream      |
//! | `/LogDriver.StopLogging`   | cancel + forget the container stream      |
//! | `/LogDriver.Capabilities`  | `ReadLogs: false` (no log read-back)      |
//! | `/LogDriver.ReadLogs`      | 501 - read-back is a non-goal             |
//!
//! Per the plugin protocol, handler-level failures travel in the `Err`
//! field of a 200 response; protocol-level problems (unreadable JSON) get
//! a 400.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::container::ContainerInfo;
use crate::driver::Driver;
use crate::error::PluginError;

/// Socket the daemon discovers the plugin through.
pub const DEFAULT_SOCKET: &str = "/run/docker/plugins/otel-logs.sock";

const ACTIVATE_PATH: &str = "/Plugin.Activate";
const START_LOGGING_PATH: &str = "/LogDriver.StartLogging";
const STOP_LOGGING_PATH: &str = "/LogDriver.StopLogging";
const CAPABILITIES_PATH: &str = "/LogDriver.Capabilities";
const READ_LOGS_PATH: &str = "/LogDriver.ReadLogs";

/// `StartLogging` payload: the stream key plus container metadata.
#[derive(Debug, Deserialize)]
pub struct StartLoggingRequest {
    #[serde(rename = "File")]
    pub file: String,
    #[serde(rename = "Info")]
    pub info: ContainerInfo,
}

/// `StopLogging` payload: just the stream key.
#[derive(Debug, Deserialize)]
pub struct StopLoggingRequest {
    #[serde(rename = "File")]
    pub file: String,
}

/// Standard plugin response: an empty `Err` means success.
#[derive(Debug, Default, Serialize)]
struct PluginResponse {
    #[serde(rename = "Err")]
    err: String,
}

/// Serves the plugin handshake until `shutdown` fires.
///
/// A stale socket left by a previous plugin instance is removed before
/// binding. Each connection is handled on its own task; a panicking
/// handler is contained and does not take the listener down.
pub async fn serve_unix(
    socket_path: &Path,
    driver: Arc<Driver>,
    shutdown: CancellationToken,
) -> Result<(), PluginError> {
    if let Some(parent) = socket_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PluginError::SocketDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    match std::fs::remove_file(socket_path) {
        Ok(()) => debug!(socket = %socket_path.display(), "removed stale plugin socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(PluginError::StaleSocket {
                path: socket_path.to_path_buf(),
                source,
            })
        }
    }

    let listener = UnixListener::bind(socket_path).map_err(|source| PluginError::Bind {
        path: socket_path.to_path_buf(),
        source,
    })?;
    info!(socket = %socket_path.display(), "plugin handshake listening");

    let server = http1::Builder::new();
    let mut joinset = tokio::task::JoinSet::new();

    loop {
        let conn = tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((conn, _addr)) => conn,
                Err(e) => {
                    error!("plugin socket accept error: {e}");
                    continue;
                }
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    // Don't kill the listener on a handler panic.
                    error!("plugin connection handler panicked: {e:?}");
                    continue;
                }
                Ok(()) | Err(_) => continue,
            },
        };

        let io = TokioIo::new(conn);
        let server = server.clone();
        let driver = Arc::clone(&driver);
        joinset.spawn(async move {
            let service =
                service_fn(move |req| plugin_endpoint_handler(Arc::clone(&driver), req));
            if let Err(e) = server.serve_connection(io, service).await {
                debug!("plugin connection error: {e}");
            }
        });
    }

    joinset.shutdown().await;
    Ok(())
}

async fn plugin_endpoint_handler<B>(
    driver: Arc<Driver>,
    req: Request<B>,
) -> http::Result<Response<Full<Bytes>>>
where
    B: Body,
    B::Error: fmt::Display,
{
    match (req.method(), req.uri().path()) {
        (_, ACTIVATE_PATH) => json_response(
            StatusCode::OK,
            &json!({"Implements": ["LoggingDriver"]}),
        ),
        (&Method::POST, START_LOGGING_PATH) => start_logging_handler(driver, req).await,
        (&Method::POST, STOP_LOGGING_PATH) => stop_logging_handler(driver, req).await,
        (_, CAPABILITIES_PATH) => {
            json_response(StatusCode::OK, &json!({"Cap": {"ReadLogs": false}}))
        }
        (_, READ_LOGS_PATH) => json_response(
            StatusCode::NOT_IMPLEMENTED,
            &PluginResponse {
                err: "not implemented".to_string(),
            },
        ),
        _ => {
            let mut not_found = Response::default();
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}

async fn start_logging_handler<B>(
    driver: Arc<Driver>,
    req: Request<B>,
) -> http::Result<Response<Full<Bytes>>>
where
    B: Body,
    B::Error: fmt::Display,
{
    let request: StartLoggingRequest = match read_request(req).await {
        Ok(request) => request,
        Err(message) => return json_response(StatusCode::BAD_REQUEST, &PluginResponse { err: message }),
    };

    info!(
        container_id = %request.info.container_id,
        file = %request.file,
        "StartLogging"
    );

    match driver.start_logging(&request.file, request.info).await {
        Ok(()) => json_response(StatusCode::OK, &PluginResponse::default()),
        // Handler failures ride in the Err field of a 200, per the
        // plugin protocol.
        Err(e) => json_response(
            StatusCode::OK,
            &PluginResponse { err: e.to_string() },
        ),
    }
}

async fn stop_logging_handler<B>(
    driver: Arc<Driver>,
    req: Request<B>,
) -> http::Result<Response<Full<Bytes>>>
where
    B: Body,
    B::Error: fmt::Display,
{
    let request: StopLoggingRequest = match read_request(req).await {
        Ok(request) => request,
        Err(message) => return json_response(StatusCode::BAD_REQUEST, &PluginResponse { err: message }),
    };

    info!(file = %request.file, "StopLogging");
    driver.stop_logging(&request.file);
    json_response(StatusCode::OK, &PluginResponse::default())
}

async fn read_request<B, T>(req: Request<B>) -> Result<T, String>
where
    B: Body,
    B::Error: fmt::Display,
    T: serde::de::DeserializeOwned,
{
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| format!("read request body: {e}"))?
        .to_bytes();
    serde_json::from_slice(&body).map_err(|e| format!("decode request body: {e}"))
}

fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> http::Result<Response<Full<Bytes>>> {
    let payload = serde_json::to_vec(body).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::NormalizedRecord;
    use crate::transport::RecordEmitter;
    use serde_json::Value;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Default)]
    struct NullEmitter {
        count: Mutex<usize>,
    }

    impl RecordEmitter for NullEmitter {
        fn emit(&self, _record: NormalizedRecord) {
            *self.count.lock().expect("count lock") += 1;
        }
    }

    fn create_test_driver() -> Arc<Driver> {
        Arc::new(Driver::new(Arc::new(NullEmitter::default())))
    }

    fn post(path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .expect("request")
    }

    async fn response_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn start_body(file: &str) -> String {
        format!(
            r#"{{"File": {file:?}, "Info": {{"ContainerID": "cid123", "ContainerName": "/demo", "ContainerImageName": "busybox"}}}}"#
        )
    }

    #[tokio::test]
    async fn test_activate_advertises_logging_driver() {
        let response = plugin_endpoint_handler(create_test_driver(), post(ACTIVATE_PATH, ""))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["Implements"][0], "LoggingDriver");
    }

    #[tokio::test]
    async fn test_capabilities_has_no_read_logs() {
        let response = plugin_endpoint_handler(create_test_driver(), post(CAPABILITIES_PATH, ""))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["Cap"]["ReadLogs"], false);
    }

    #[tokio::test]
    async fn test_read_logs_not_implemented() {
        let response = plugin_endpoint_handler(create_test_driver(), post(READ_LOGS_PATH, ""))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

        let json = response_json(response).await;
        assert_eq!(json["Err"], "not implemented");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let response = plugin_endpoint_handler(create_test_driver(), post("/Nope", ""))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_and_duplicate_start() {
        let driver = create_test_driver();
        let stream = tempfile::NamedTempFile::new().expect("tempfile");
        let path = stream.path().to_string_lossy().into_owned();

        let response = plugin_endpoint_handler(
            Arc::clone(&driver),
            post(START_LOGGING_PATH, &start_body(&path)),
        )
        .await
        .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["Err"], "");

        // Same key again: rejected through the Err field, status stays 200.
        let response = plugin_endpoint_handler(
            Arc::clone(&driver),
            post(START_LOGGING_PATH, &start_body(&path)),
        )
        .await
        .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert!(json["Err"].as_str().expect("err string").contains("already exists"));
    }

    #[tokio::test]
    async fn test_stop_is_always_ok() {
        let response = plugin_endpoint_handler(
            create_test_driver(),
            post(STOP_LOGGING_PATH, r#"{"File": "/never/started"}"#),
        )
        .await
        .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["Err"], "");
    }

    #[tokio::test]
    async fn test_malformed_start_body_is_bad_request() {
        let response = plugin_endpoint_handler(
            create_test_driver(),
            post(START_LOGGING_PATH, "this is not json"),
        )
        .await
        .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = response_json(response).await;
        assert!(!json["Err"].as_str().expect("err string").is_empty());
    }

    #[tokio::test]
    async fn test_serve_unix_end_to_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("otel-logs.sock");
        let shutdown = CancellationToken::new();

        let serve = tokio::spawn({
            let socket = socket.clone();
            let shutdown = shutdown.clone();
            async move { serve_unix(&socket, create_test_driver(), shutdown).await }
        });

        // Wait for the socket to appear.
        timeout(Duration::from_secs(2), async {
            while !socket.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("socket never appeared");

        let stream = tokio::net::UnixStream::connect(&socket)
            .await
            .expect("connect to plugin socket");
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .expect("http handshake");
        tokio::spawn(conn);

        let request = Request::builder()
            .method(Method::POST)
            .uri(ACTIVATE_PATH)
            .header("Host", "localhost")
            .body(Full::new(Bytes::new()))
            .expect("request");
        let response = sender.send_request(request).await.expect("activate response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("LoggingDriver"));

        shutdown.cancel();
        timeout(Duration::from_secs(2), serve)
            .await
            .expect("serve should stop on shutdown")
            .expect("serve task panicked")
            .expect("serve returned error");
    }

    #[tokio::test]
    async fn test_serve_unix_replaces_stale_socket() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("otel-logs.sock");

        // Leave a stale regular file where the socket goes.
        let mut stale = std::fs::File::create(&socket).expect("create stale file");
        stale.write_all(b"stale").expect("write stale");
        drop(stale);

        let shutdown = CancellationToken::new();
        let serve = tokio::spawn({
            let socket = socket.clone();
            let shutdown = shutdown.clone();
            async move { serve_unix(&socket, create_test_driver(), shutdown).await }
        });

        // The stale file is only replaced once the listener binds, so wait
        // until a connection is actually accepted.
        timeout(Duration::from_secs(2), async {
            while tokio::net::UnixStream::connect(&socket).await.is_err() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("listener never came up");

        shutdown.cancel();
        timeout(Duration::from_secs(2), serve)
            .await
            .expect("serve should stop")
            .expect("serve task panicked")
            .expect("stale socket should have been replaced");
    }
}
