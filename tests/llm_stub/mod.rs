use std::io::Read as _;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

/// How the stub reasoning service answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum LlmMode {
    /// Well-formed chat-completion responses.
    Json,
    /// Valid responses whose payload is wrapped in markdown code fences.
    JsonFenced,
    /// SSE framing with delta fragments, as deployments that ignore
    /// `stream: false` produce.
    Sse,
    /// Transport-level failure on every call.
    Http500,
    /// Valid responses whose content is unparseable prose.
    Garbage,
}

pub struct LlmStub {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl LlmStub {
    pub fn spawn(mode: LlmMode) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start llm stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post
                    || path != "/v1/chat/completions"
                {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                if mode == LlmMode::Http500 {
                    let _ = request.respond(
                        tiny_http::Response::from_string("stub llm failure")
                            .with_status_code(500),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json")
                                .with_status_code(400),
                        );
                        continue;
                    }
                };

                let Some(prompt) = parsed
                    .pointer("/messages/0/content")
                    .and_then(|v| v.as_str())
                else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing message content")
                            .with_status_code(400),
                    );
                    continue;
                };

                let content = match mode {
                    LlmMode::Garbage => "I cannot answer that in JSON, sorry.".to_string(),
                    LlmMode::JsonFenced => format!("```json\n{}\n```", content_for(prompt)),
                    _ => content_for(prompt),
                };

                let response = match mode {
                    LlmMode::Sse => {
                        let mid = content.len() / 2;
                        let split = (0..=mid)
                            .rev()
                            .find(|idx| content.is_char_boundary(*idx))
                            .unwrap_or(0);
                        let (head, tail) = content.split_at(split);
                        let body = format!(
                            "data: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
                            serde_json::json!({"choices": [{"delta": {"content": head}}]}),
                            serde_json::json!({"choices": [{"delta": {"content": tail}}]}),
                        );
                        tiny_http::Response::from_string(body)
                            .with_status_code(200)
                            .with_header(header("text/event-stream"))
                    }
                    _ => {
                        let body = serde_json::json!({
                            "choices": [{"message": {"role": "assistant", "content": content}}]
                        });
                        tiny_http::Response::from_string(body.to_string())
                            .with_status_code(200)
                            .with_header(header("application/json"))
                    }
                };
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

impl Drop for LlmStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn header(content_type: &str) -> tiny_http::Header {
    tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
        .expect("build header")
}

fn content_for(prompt: &str) -> String {
    if prompt.contains("Candidate links to evaluate:") {
        score_response(prompt)
    } else if prompt.contains("Update the knowledge state") {
        "Stub knowledge state.".to_string()
    } else {
        "ok".to_string()
    }
}

/// Scores every enumerated candidate; URLs containing "skip-me" score low,
/// "boost" high, everything else in between.
fn score_response(prompt: &str) -> String {
    let mut entries = Vec::new();
    for line in prompt.lines() {
        let trimmed = line.trim();
        let Some((id, rest)) = trimmed.split_once(". anchor=") else {
            continue;
        };
        let Ok(id) = id.parse::<u64>() else {
            continue;
        };
        let url = rest.split(" url=").nth(1).unwrap_or("").trim();
        let score = if url.contains("skip-me") {
            0.2
        } else if url.contains("boost") {
            0.9
        } else {
            0.8
        };
        entries.push(serde_json::json!({
            "id": id,
            "score": score,
            "reason": format!("stub score for candidate {id}"),
        }));
    }
    Value::Array(entries).to_string()
}
