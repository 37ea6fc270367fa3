//! Server-sent event plumbing shared by the HTTP providers.

use futures::StreamExt;
use reqwest::RequestBuilder;
use reqwest_eventsource::{Event, EventSource};
use serde_json::Value;

use super::{ChunkStream, LlmError, StreamChunk};

/// Turn a streaming request into a stream of JSON chunks.
///
/// `is_done` recognises a provider's end-of-stream sentinel from the event
/// name and data. The event source is closed after the first error or the
/// end of the stream so it never reconnects on its own.
pub(crate) fn json_event_stream(
    provider: &'static str,
    request: RequestBuilder,
    is_done: fn(&str, &str) -> bool,
) -> Result<ChunkStream, LlmError> {
    let mut source =
        EventSource::new(request).map_err(|e| LlmError::Stream(format!("{}: {}", provider, e)))?;

    let stream = async_stream::stream! {
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {
                    tracing::debug!(provider, "Model stream opened");
                }
                Ok(Event::Message(message)) => {
                    if is_done(&message.event, &message.data) {
                        break;
                    }
                    match serde_json::from_str::<Value>(&message.data) {
                        Ok(payload) => yield Ok(StreamChunk::new(payload)),
                        Err(e) => {
                            yield Err(LlmError::Stream(format!(
                                "{} sent invalid JSON: {}",
                                provider, e
                            )));
                            break;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    yield Err(LlmError::Api {
                        provider,
                        status: status.as_u16(),
                        body,
                    });
                    break;
                }
                Err(e) => {
                    yield Err(LlmError::Stream(format!("{}: {}", provider, e)));
                    break;
                }
            }
        }
        source.close();
    };

    Ok(Box::pin(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn stops_at_sentinel_event() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: delta\ndata: {\"n\":1}\n\n",
            "event: stop\ndata: {}\n\n",
            "event: delta\ndata: {\"n\":2}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let request = reqwest::Client::new().post(server.uri());
        let chunks: Vec<_> = json_event_stream("Test", request, |event, _| event == "stop")
            .expect("stream opens")
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        let chunk = chunks[0].as_ref().expect("chunk parses");
        assert_eq!(chunk.payload["n"], 1);
    }

    #[tokio::test]
    async fn invalid_json_ends_the_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("data: not json\n\ndata: {}\n\n", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let request = reqwest::Client::new().post(server.uri());
        let chunks: Vec<_> = json_event_stream("Test", request, |_, data| data == "[DONE]")
            .expect("stream opens")
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        assert!(matches!(chunks[0], Err(LlmError::Stream(ref msg)) if msg.contains("invalid JSON")));
    }
}
