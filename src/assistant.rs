use crate::dates::DateResolver;
use crate::intent::{IntentParser, ParseContext};
use crate::protocol::{ChatMessage, Reply, Request};
use chrono::{DateTime, TimeZone};
use rand::rngs::StdRng;
use std::fmt::Display;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum AssistantError {
    #[error("assistant request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("assistant answered with status {0}")]
    Status(u16),
    #[error("assistant did not answer within {0:?}")]
    Timeout(Duration),
    #[error("assistant reply could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// HTTP client for the assistant backend. The backend receives a
/// [`Request`] as JSON and answers with a [`Reply`].
#[derive(Debug, Clone)]
pub struct RemoteAssistant {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RemoteAssistant {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        RemoteAssistant {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            timeout,
        }
    }

    pub async fn ask(&self, request: &Request) -> Result<Reply, AssistantError> {
        match tokio::time::timeout(self.timeout, self.send(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AssistantError::Timeout(self.timeout)),
        }
    }

    async fn send(&self, request: &Request) -> Result<Reply, AssistantError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;
        if !resp.status().is_success() {
            return Err(AssistantError::Status(resp.status().as_u16()));
        }
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// One conversation: its history, the local grammar and the random source
/// the grammar draws decorative values from.
pub struct ChatSession {
    history: Vec<ChatMessage>,
    parser: IntentParser,
    rng: StdRng,
}

impl ChatSession {
    pub fn new(rng: StdRng) -> Self {
        ChatSession {
            history: Vec::new(),
            parser: IntentParser::default(),
            rng,
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The request the remote assistant should see for `message`.
    pub fn request(&self, message: &str) -> Request {
        Request {
            message: message.to_string(),
            history: self.history.clone(),
        }
    }

    /// Settles the reply for `message`: the remote answer when there is one,
    /// otherwise the local grammar. Both turns are appended to the history.
    pub fn complete<Tz: TimeZone>(
        &mut self,
        message: &str,
        remote: Option<Result<Reply, AssistantError>>,
        now: DateTime<Tz>,
    ) -> Reply
    where
        Tz::Offset: Display,
    {
        let reply = match remote {
            Some(Ok(reply)) => reply,
            Some(Err(err)) => {
                log::warn!("{err}; answering locally");
                self.local_reply(message, now)
            }
            None => self.local_reply(message, now),
        };
        self.history.push(ChatMessage::user(message));
        self.history.push(ChatMessage::assistant(reply.message.clone()));
        reply
    }

    pub async fn respond<Tz: TimeZone>(
        &mut self,
        message: &str,
        remote: Option<&RemoteAssistant>,
        now: DateTime<Tz>,
    ) -> Reply
    where
        Tz::Offset: Display,
    {
        let outcome = match remote {
            Some(remote) => Some(remote.ask(&self.request(message)).await),
            None => None,
        };
        self.complete(message, outcome, now)
    }

    fn local_reply<Tz: TimeZone>(&mut self, message: &str, now: DateTime<Tz>) -> Reply
    where
        Tz::Offset: Display,
    {
        let dates = DateResolver::new(now);
        let mut ctx = ParseContext {
            dates: &dates,
            rng: &mut self.rng,
        };
        self.parser.parse(message, &self.history, &mut ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Action, Sender};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use rand::SeedableRng;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 14, 30, 0).unwrap()
    }

    fn session() -> ChatSession {
        ChatSession::new(StdRng::seed_from_u64(1))
    }

    /// Serves exactly one HTTP response, or never answers when `body` is None.
    async fn serve_once(status: &'static str, body: Option<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64 * 1024];
            let mut read = 0;
            loop {
                let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                read += n;
                if request_complete(&buf[..read]) {
                    break;
                }
            }
            let Some(body) = body else {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                return;
            };
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/chat")
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(split) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..split]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= split + 4 + length
    }

    #[test]
    fn request_carries_prior_turns_only() {
        let mut chat = session();
        chat.complete("hello", None, now());
        let request = chat.request("add task: call mom");
        assert_eq!(request.message, "add task: call mom");
        assert_eq!(request.history.len(), 2);
        assert_eq!(request.history[0], ChatMessage::user("hello"));
        assert_eq!(request.history[1].sender, Sender::Assistant);
    }

    #[test]
    fn remote_reply_is_used_verbatim() {
        let mut chat = session();
        let remote = Reply::with_action(
            "On it",
            Action::AddTodo {
                title: "from remote".into(),
            },
        );
        let reply = chat.complete("anything", Some(Ok(remote.clone())), now());
        assert_eq!(reply, remote);
        assert_eq!(chat.history()[1], ChatMessage::assistant("On it"));
    }

    #[test]
    fn remote_failure_falls_back_to_local_grammar() {
        let mut chat = session();
        let failed = Err(AssistantError::Timeout(Duration::from_secs(10)));
        let reply = chat.complete("add task: buy groceries", Some(failed), now());
        assert_eq!(
            reply.action,
            Some(Action::AddTodo {
                title: "buy groceries".into()
            })
        );
    }

    #[tokio::test]
    async fn respond_without_remote_parses_locally() {
        let mut chat = session();
        let reply = chat
            .respond("schedule lunch with Amy on tomorrow", None, now())
            .await;
        match reply.action {
            Some(Action::AddEvent { title, date, .. }) => {
                assert_eq!(title, "lunch with Amy");
                assert_eq!(date, now() + ChronoDuration::days(1));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[tokio::test]
    async fn remote_answer_is_decoded() {
        let body = r#"{"message":"Added!","action":{"type":"ADD_TODO","data":{"title":"water plants"}}}"#;
        let endpoint = serve_once("200 OK", Some(body.to_string())).await;
        let remote = RemoteAssistant::new(endpoint, Some("k".into()), Duration::from_secs(5));
        let reply = remote.ask(&session().request("water the plants")).await.unwrap();
        assert_eq!(reply.message, "Added!");
        assert_eq!(
            reply.action,
            Some(Action::AddTodo {
                title: "water plants".into()
            })
        );
    }

    #[tokio::test]
    async fn remote_error_status_is_reported() {
        let endpoint = serve_once("503 Service Unavailable", Some("{}".into())).await;
        let remote = RemoteAssistant::new(endpoint, None, Duration::from_secs(5));
        let err = remote.ask(&session().request("hi")).await.unwrap_err();
        assert!(matches!(err, AssistantError::Status(503)));
    }

    #[tokio::test]
    async fn slow_remote_times_out_and_falls_back() {
        let endpoint = serve_once("200 OK", None).await;
        let remote = RemoteAssistant::new(endpoint, None, Duration::from_millis(100));
        let mut chat = session();
        let reply = chat
            .respond("add todo: renew passport", Some(&remote), now())
            .await;
        assert_eq!(
            reply.action,
            Some(Action::AddTodo {
                title: "renew passport".into()
            })
        );
        assert_eq!(chat.history().len(), 2);
    }
}
