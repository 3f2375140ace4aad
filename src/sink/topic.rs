use super::{CallbackClient, ResultSink};
use crate::counter::WindowResult;
use crate::error::DeliveryError;
use async_trait::async_trait;
use serde::Serialize;

const KAFKA_JSON_V2: &str = "application/vnd.kafka.json.v2+json";

#[derive(Serialize)]
struct ProduceRequest<'a> {
    records: [Record<'a>; 1],
}

#[derive(Serialize)]
struct Record<'a> {
    value: &'a WindowResult,
}

/// Publishes window results to a topic through a Kafka REST proxy.
#[derive(Debug, Clone)]
pub struct TopicSink {
    client: CallbackClient,
    url: String,
    topic: String,
}

impl TopicSink {
    pub fn new(client: CallbackClient, proxy_url: &str, topic: &str) -> Self {
        let url = format!("{}/topics/{}", proxy_url.trim_end_matches('/'), topic);
        Self {
            client,
            url,
            topic: topic.to_string(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ResultSink for TopicSink {
    async fn deliver(&self, result: &WindowResult) -> Result<(), DeliveryError> {
        let request = ProduceRequest {
            records: [Record { value: result }],
        };
        self.client.post_json(&self.url, KAFKA_JSON_V2, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    #[test]
    fn test_url_joins_proxy_and_topic() {
        let client = CallbackClient::new(Duration::from_millis(100)).unwrap();
        let sink = TopicSink::new(client, "http://kafka-rest:8082/", "flow.unique.entries");
        assert_eq!(sink.url(), "http://kafka-rest:8082/topics/flow.unique.entries");
        assert_eq!(sink.topic(), "flow.unique.entries");
    }

    #[test]
    fn test_produce_request_shape() {
        let timestamp = DateTime::parse_from_rfc3339("2024-03-01T10:15:30Z")
            .unwrap()
            .with_timezone(&Utc);
        let result = WindowResult::new(timestamp, 42);
        let request = ProduceRequest {
            records: [Record { value: &result }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "records": [{"value": {"timestamp": "2024-03-01T10:15:30Z", "unique_count": 42}}]
            })
        );
    }
}
