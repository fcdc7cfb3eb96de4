use std::future::Future;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::huddle_config::BackendConfig;

use super::backend::{
    BackendError, CompletionBackend, CompletionChunk, CompletionRequest, CompletionStream,
};
use super::turn::{Role, Turn};

/// Client for an Ollama-compatible `/api/chat` endpoint with NDJSON streaming.
pub struct OllamaBackend {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Self::with_client(client, &config.host, config.api_key())
    }

    pub fn with_client(
        client: reqwest::Client,
        host: &str,
        api_key: Option<String>,
    ) -> Result<Self, BackendError> {
        let mut base = host.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)?.join("api/chat")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl CompletionBackend for OllamaBackend {
    fn stream_chat<'a>(
        &'a self,
        request: CompletionRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionStream, BackendError>> + Send + 'a>> {
        Box::pin(async move {
            let body = ChatBody::new(&request);
            let mut builder = self.client.post(self.endpoint.clone()).json(&body);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }
            tracing::debug!(
                endpoint = %self.endpoint,
                model = request.model,
                turns = request.turns.len(),
                "completion request"
            );
            let response = builder.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(BackendError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(decode_ndjson(Box::pin(response.bytes_stream())))
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

impl<'a> ChatBody<'a> {
    fn new(request: &CompletionRequest<'a>) -> Self {
        Self {
            model: request.model,
            messages: request.turns.iter().map(WireMessage::from_turn).collect(),
            stream: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<&'a str>,
}

impl<'a> WireMessage<'a> {
    fn from_turn(turn: &'a Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.text(),
            images: turn.images(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

fn parse_line(line: &[u8]) -> Result<Option<CompletionChunk>, BackendError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parsed: StreamLine = serde_json::from_str(line)?;
    if let Some(error) = parsed.error {
        return Err(BackendError::Backend(error));
    }
    let content = parsed.message.map(|m| m.content).unwrap_or_default();
    Ok(Some(CompletionChunk::new(content, parsed.done)))
}

/// Split a byte stream into NDJSON lines and decode each into a chunk.
///
/// Ends after the first `done` line, the first error, or end of input.
fn decode_ndjson<S, B, E>(bytes: S) -> CompletionStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<BackendError> + Send,
{
    stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_line(&line) {
                        Ok(None) => continue,
                        Ok(Some(chunk)) => {
                            let done = chunk.done;
                            return Some((Ok(chunk), (bytes, buffer, done)));
                        }
                        Err(e) => return Some((Err(e), (bytes, buffer, true))),
                    }
                }
                match bytes.next().await {
                    Some(Ok(data)) => buffer.extend_from_slice(data.as_ref()),
                    Some(Err(e)) => return Some((Err(e.into()), (bytes, buffer, true))),
                    None => {
                        let line = std::mem::take(&mut buffer);
                        return match parse_line(&line) {
                            Ok(None) => None,
                            Ok(Some(chunk)) => Some((Ok(chunk), (bytes, buffer, true))),
                            Err(e) => Some((Err(e), (bytes, buffer, true))),
                        };
                    }
                }
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::turn::ContentPart;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    fn byte_chunks(chunks: &[&'static str]) -> CompletionStream {
        let items: Vec<Result<&'static [u8], BackendError>> =
            chunks.iter().map(|c| Ok(c.as_bytes())).collect();
        decode_ndjson(stream::iter(items))
    }

    async fn collect(stream: CompletionStream) -> Vec<Result<CompletionChunk, String>> {
        stream
            .map(|r| r.map_err(|e| e.to_string()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let out = collect(byte_chunks(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n{\"mess",
            "age\":{\"content\":\"lo\"},\"done\":false}\n\n",
            "{\"message\":{\"content\":\"\"},\"done\":true}\n",
        ]))
        .await;
        assert_eq!(
            out,
            vec![
                Ok(CompletionChunk::new("Hel", false)),
                Ok(CompletionChunk::new("lo", false)),
                Ok(CompletionChunk::new("", true)),
            ]
        );
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_decoded() {
        let out = collect(byte_chunks(&["{\"message\":{\"content\":\"x\"},\"done\":true}"])).await;
        assert_eq!(out, vec![Ok(CompletionChunk::new("x", true))]);
    }

    #[tokio::test]
    async fn error_line_ends_the_stream() {
        let out = collect(byte_chunks(&[
            "{\"message\":{\"content\":\"a\"},\"done\":false}\n",
            "{\"error\":\"model overloaded\"}\n",
            "{\"message\":{\"content\":\"b\"},\"done\":false}\n",
        ]))
        .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok(CompletionChunk::new("a", false)));
        assert_eq!(out[1], Err("model overloaded".to_string()));
    }

    #[tokio::test]
    async fn garbage_line_is_a_decode_error() {
        let out = collect(byte_chunks(&["not json\n"])).await;
        assert!(matches!(out.as_slice(), [Err(e)] if e.starts_with("invalid stream line")));
    }

    #[test]
    fn wire_body_carries_images_separately() {
        let turns = vec![
            Turn::user_parts(vec![
                ContentPart::Text("what is this".into()),
                ContentPart::Image("QUJD".into()),
            ]),
            Turn::assistant("a cat"),
        ];
        let body = ChatBody::new(&CompletionRequest {
            model: "qwen3-vl:235b-cloud",
            turns: &turns,
        });
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "model": "qwen3-vl:235b-cloud",
                "stream": true,
                "messages": [
                    { "role": "user", "content": "what is this", "images": ["QUJD"] },
                    { "role": "assistant", "content": "a cat" }
                ]
            })
        );
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let backend =
            OllamaBackend::with_client(reqwest::Client::new(), "http://localhost:11434/proxy", None)
                .unwrap();
        assert_eq!(backend.endpoint().as_str(), "http://localhost:11434/proxy/api/chat");
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn streams_reply_from_http_endpoint() {
        let seen = Arc::new(Mutex::new(None::<(Option<String>, Value)>));
        let seen_in_handler = seen.clone();
        let router = Router::new().route(
            "/api/chat",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = seen_in_handler.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *seen.lock().unwrap() = Some((auth, body));
                    concat!(
                        "{\"message\":{\"content\":\"hi \"},\"done\":false}\n",
                        "{\"message\":{\"content\":\"there\"},\"done\":false}\n",
                        "{\"message\":{\"content\":\"\"},\"done\":true}\n",
                    )
                }
            }),
        );
        let host = serve(router).await;
        let backend =
            OllamaBackend::with_client(reqwest::Client::new(), &host, Some("secret".into()))
                .unwrap();

        let turns = vec![Turn::user_text("hello")];
        let stream = backend
            .stream_chat(CompletionRequest {
                model: "m1",
                turns: &turns,
            })
            .await
            .unwrap();
        let text: String = collect(stream)
            .await
            .into_iter()
            .map(|r| r.unwrap().content)
            .collect();
        assert_eq!(text, "hi there");

        let (auth, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer secret"));
        assert_eq!(body["model"], "m1");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn non_success_status_fails_before_streaming() {
        let router = Router::new().route(
            "/api/chat",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let host = serve(router).await;
        let backend = OllamaBackend::with_client(reqwest::Client::new(), &host, None).unwrap();
        let turns = vec![Turn::user_text("hello")];
        let err = match backend
            .stream_chat(CompletionRequest {
                model: "m1",
                turns: &turns,
            })
            .await
        {
            Ok(_) => panic!("expected status error"),
            Err(e) => e,
        };
        assert!(matches!(err, BackendError::Status { status: 401, ref body } if body == "bad key"));
    }
}
