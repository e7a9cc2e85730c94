use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument, warn};

use super::{query_to_header, HttpServerConfig};
use crate::context::TestContext;
use crate::endpoints::server::ServerExchange;
use crate::endpoints::{BaseEndpoint, Endpoint};
use crate::error::{CitrusError, CitrusResult};
use crate::message::{headers, Message, MessageSelector};

/// Shared state of the request handler
struct ServerState {
    exchange: ServerExchange,
    reply_timeout: Duration,
    default_status: StatusCode,
}

/// HTTP server endpoint.
///
/// Every inbound request becomes a message for the test to receive. The next
/// message the test sends is the response; its status code comes from the
/// `citrus_http_status_code` header.
pub struct HttpServerEndpoint {
    config: HttpServerConfig,
    base: BaseEndpoint,
    state: Arc<ServerState>,
    bound_port: AtomicU16,
}

impl HttpServerEndpoint {
    pub fn new(config: HttpServerConfig) -> Self {
        let default_status = StatusCode::from_u16(config.default_status_code).unwrap_or(StatusCode::OK);
        Self {
            base: BaseEndpoint::new(&config.name),
            state: Arc::new(ServerState {
                exchange: ServerExchange::new(config.name.clone()),
                reply_timeout: Duration::from_millis(config.timeout),
                default_status,
            }),
            bound_port: AtomicU16::new(config.port),
            config,
        }
    }

    /// Port the server listens on; the actual port once started with port `0`
    pub fn port(&self) -> u16 {
        self.bound_port.load(Ordering::SeqCst)
    }

    fn router(&self) -> Router {
        Router::new()
            .fallback(handle_request)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(Arc::clone(&self.state))
    }
}

/// Turn an inbound request into a message
fn request_to_message(method: &Method, uri: &Uri, header_map: &HeaderMap, body: &Bytes) -> Message {
    let mut message = Message::new(String::from_utf8_lossy(body).into_owned())
        .with_header(headers::HTTP_METHOD, method.as_str())
        .with_header(headers::HTTP_REQUEST_URI, uri.to_string())
        .with_header(headers::HTTP_REQUEST_PATH, uri.path());
    if let Some(query) = uri.query() {
        message.set_header(headers::HTTP_QUERY_PARAMS, query_to_header(query));
    }

    for (name, value) in header_map {
        let Ok(value) = value.to_str() else {
            continue;
        };
        if name == http::header::CONTENT_TYPE {
            message.set_header(headers::HTTP_CONTENT_TYPE, value);
        } else {
            message.set_header(name.as_str(), value);
        }
    }
    message
}

/// Build the HTTP response for a reply message
fn message_to_response(reply: Message) -> CitrusResult<Response> {
    let status = match reply.header(headers::HTTP_STATUS_CODE) {
        Some(code) => code
            .parse::<u16>()
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| CitrusError::config_invalid(headers::HTTP_STATUS_CODE, format!("invalid status code '{}'", code)))?,
        None => StatusCode::OK,
    };

    let mut response = Response::builder().status(status);
    for (name, value) in reply.custom_headers() {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                response = response.header(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid response header"),
        }
    }

    response
        .body(Body::from(reply.payload))
        .map_err(|e| CitrusError::runtime(format!("Failed to build HTTP response: {}", e)))
}

async fn handle_request(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    header_map: HeaderMap,
    body: Bytes,
) -> Response {
    let request = request_to_message(&method, &uri, &header_map, &body);
    debug!(method = %method, uri = %uri, "Handling HTTP request");

    let reply = state.exchange.handle(request, state.reply_timeout).await;
    let result = match reply {
        Some(reply) => message_to_response(reply),
        None => Ok(empty_response(state.default_status)),
    };

    result.unwrap_or_else(|e| {
        error!(error = %e, "Failed to send HTTP response");
        empty_response(StatusCode::INTERNAL_SERVER_ERROR)
    })
}

fn empty_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

#[async_trait]
impl Endpoint for HttpServerEndpoint {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn endpoint_type(&self) -> &'static str {
        "http-server"
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout)
    }

    fn auto_start(&self) -> bool {
        self.config.auto_start
    }

    fn is_running(&self) -> bool {
        self.base.is_running()
    }

    #[instrument(skip(self), level = "debug")]
    async fn start(&self) -> CitrusResult<()> {
        if self.base.is_running() {
            debug!(endpoint = %self.config.name, "Server already running");
            return Ok(());
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| CitrusError::endpoint(&self.config.name, format!("failed to bind {}: {}", addr, e)))?;
        let port = listener.local_addr()?.port();
        self.bound_port.store(port, Ordering::SeqCst);

        let mut shutdown_rx = self.base.create_shutdown_channel().await;
        let app = self.router();
        let name = self.config.name.clone();

        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            });
            if let Err(e) = server.await {
                error!(endpoint = %name, error = %e, "HTTP server error");
            }
        });
        self.base.set_task(handle).await;
        self.base.set_running(true);

        info!(endpoint = %self.config.name, port, "HTTP server started");
        Ok(())
    }

    async fn stop(&self) -> CitrusResult<()> {
        self.base.stop_task().await;
        Ok(())
    }

    async fn send(&self, message: Message, _context: &TestContext) -> CitrusResult<()> {
        self.state.exchange.reply(message)
    }

    async fn receive(
        &self,
        selector: Option<&MessageSelector>,
        timeout: Duration,
        _context: &TestContext,
    ) -> CitrusResult<Message> {
        self.state.exchange.receive(selector, timeout).await
    }

    async fn purge(&self, selector: Option<&MessageSelector>) -> CitrusResult<usize> {
        Ok(self.state.exchange.purge(selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::http::{HttpClient, HttpRequest, ReqwestHttpClient};

    #[test]
    fn test_request_to_message() {
        let mut header_map = HeaderMap::new();
        header_map.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        header_map.insert("x-trace-id", HeaderValue::from_static("abc"));
        let uri: Uri = "/todos/1?done=true&page=2".parse().unwrap();

        let message = request_to_message(&Method::PUT, &uri, &header_map, &Bytes::from_static(b"{}"));
        assert_eq!(message.payload, "{}");
        assert_eq!(message.header(headers::HTTP_METHOD), Some("PUT"));
        assert_eq!(message.header(headers::HTTP_REQUEST_PATH), Some("/todos/1"));
        assert_eq!(message.header(headers::HTTP_QUERY_PARAMS), Some("done=true,page=2"));
        assert_eq!(message.header(headers::HTTP_CONTENT_TYPE), Some("application/json"));
        assert_eq!(message.header("x-trace-id"), Some("abc"));
    }

    #[test]
    fn test_invalid_reply_status() {
        let reply = Message::new("").with_header(headers::HTTP_STATUS_CODE, "abc");
        assert!(message_to_response(reply).is_err());
    }

    #[tokio::test]
    async fn test_server_round_trip() {
        let server = Arc::new(HttpServerEndpoint::new(HttpServerConfig::new("api", 0)));
        server.start().await.unwrap();
        let url = format!("http://127.0.0.1:{}/orders", server.port());

        let client = tokio::spawn(async move {
            ReqwestHttpClient::new()
                .execute(HttpRequest::new(Method::POST, url).with_body("order"))
                .await
        });

        let context = TestContext::new();
        let request = server
            .receive(None, Duration::from_secs(5), &context)
            .await
            .unwrap();
        assert_eq!(request.payload, "order");
        assert_eq!(request.header(headers::HTTP_REQUEST_PATH), Some("/orders"));

        server
            .send(
                Message::new("created")
                    .with_header(headers::HTTP_STATUS_CODE, "201")
                    .with_header("X-Order", "1"),
                &context,
            )
            .await
            .unwrap();

        let response = client.await.unwrap().unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(response.body(), "created");
        assert_eq!(response.headers().get("x-order").map(String::as_str), Some("1"));

        server.stop().await.unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_default_status_without_reply() {
        let mut config = HttpServerConfig::new("api", 0);
        config.timeout = 50;
        config.default_status_code = 204;
        let server = HttpServerEndpoint::new(config);
        server.start().await.unwrap();

        let response = ReqwestHttpClient::new()
            .get(&format!("http://127.0.0.1:{}/ping", server.port()))
            .await
            .unwrap();
        assert_eq!(response.status(), 204);

        server.stop().await.unwrap();
    }
}
