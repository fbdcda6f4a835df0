//! Request and reply types of the queue protocol.

use relay_core::{AppError, AppResult};

/// A message as delivered by the broker, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Raw message body, expected to be UTF-8 text
    pub body: Vec<u8>,

    /// Reply destination from the message metadata
    pub reply_to: Option<String>,

    /// Correlation token from the message metadata
    pub correlation_id: Option<String>,

    /// Broker-assigned tag used to acknowledge this delivery
    pub delivery_tag: u64,

    /// The broker has delivered this message before
    pub redelivered: bool,
}

impl InboundMessage {
    pub fn new(body: impl Into<Vec<u8>>, delivery_tag: u64) -> Self {
        Self {
            body: body.into(),
            reply_to: None,
            correlation_id: None,
            delivery_tag,
            redelivered: false,
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn redelivered(mut self) -> Self {
        self.redelivered = true;
        self
    }
}

/// A decoded, routable request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub correlation_id: Option<String>,
    pub reply_to: String,
}

impl Query {
    /// Decode the body and read the routing metadata.
    ///
    /// Fails with `MalformedMessage` if the body is not UTF-8 or blank, and
    /// with `UnroutableRequest` if no reply destination is set.
    pub fn decode(message: &InboundMessage) -> AppResult<Self> {
        let text = std::str::from_utf8(&message.body)
            .map_err(|e| {
                AppError::MalformedMessage(format!(
                    "Body of delivery {} is not UTF-8: {}",
                    message.delivery_tag, e
                ))
            })?
            .to_string();

        if text.trim().is_empty() {
            return Err(AppError::MalformedMessage(format!(
                "Delivery {} has an empty body",
                message.delivery_tag
            )));
        }

        let reply_to = message
            .reply_to
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                AppError::UnroutableRequest(format!(
                    "Delivery {} has no reply-to destination",
                    message.delivery_tag
                ))
            })?
            .to_string();

        Ok(Self {
            text,
            correlation_id: message.correlation_id.clone(),
            reply_to,
        })
    }

    /// The reply carrying `text` back to this query's destination.
    pub fn reply(&self, text: String) -> Reply {
        Reply {
            text,
            correlation_id: self.correlation_id.clone(),
            destination: self.reply_to.clone(),
        }
    }
}

/// An answer addressed to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub correlation_id: Option<String>,
    pub destination: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_routable_message() {
        let message = InboundMessage::new("What is 2+2?", 7)
            .with_reply_to("amq.gen-reply")
            .with_correlation_id("abc-123");

        let query = Query::decode(&message).unwrap();
        assert_eq!(query.text, "What is 2+2?");
        assert_eq!(query.reply_to, "amq.gen-reply");
        assert_eq!(query.correlation_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_reply_copies_correlation_and_destination() {
        let query = Query {
            text: "q".to_string(),
            correlation_id: Some("abc-123".to_string()),
            reply_to: "replies".to_string(),
        };

        let reply = query.reply("4".to_string());
        assert_eq!(reply.correlation_id, query.correlation_id);
        assert_eq!(reply.destination, "replies");
        assert_eq!(reply.text, "4");
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let message = InboundMessage::new(vec![0xff, 0xfe, 0x00], 1).with_reply_to("replies");
        let err = Query::decode(&message).unwrap_err();
        assert!(matches!(err, AppError::MalformedMessage(_)));
    }

    #[test]
    fn test_decode_rejects_blank_body() {
        for body in ["", "   \n\t"] {
            let message = InboundMessage::new(body, 5).with_reply_to("replies");
            let err = Query::decode(&message).unwrap_err();
            assert!(matches!(err, AppError::MalformedMessage(_)));
            assert!(err.is_drop());
        }
    }

    #[test]
    fn test_decode_rejects_missing_reply_to() {
        let message = InboundMessage::new("hello", 2).with_correlation_id("c");
        let err = Query::decode(&message).unwrap_err();
        assert!(matches!(err, AppError::UnroutableRequest(_)));

        let message = InboundMessage::new("hello", 3).with_reply_to("");
        assert!(matches!(
            Query::decode(&message),
            Err(AppError::UnroutableRequest(_))
        ));
    }

    #[test]
    fn test_missing_correlation_id_is_tolerated() {
        let message = InboundMessage::new("hello", 4).with_reply_to("replies");
        let query = Query::decode(&message).unwrap();
        assert_eq!(query.reply("hi".to_string()).correlation_id, None);
    }
}
