use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// A tiny_http server answering from a route handler; used to stand in for
/// the platform APIs and plain web pages.
pub struct StubServer {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

pub struct StubResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

#[allow(dead_code)]
impl StubResponse {
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.into(),
        }
    }

    pub fn error(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: "stub error".to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self::error(404)
    }
}

impl StubServer {
    /// `handler` receives the request path including the query string.
    pub fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&str) -> StubResponse + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let stub = handler(&url);

                let header = tiny_http::Header::from_bytes(
                    &b"Content-Type"[..],
                    stub.content_type.as_bytes(),
                )
                .expect("build header");
                let response = tiny_http::Response::from_string(stub.body)
                    .with_status_code(stub.status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
