//! JSON encoding of span batches as messages.

use crate::error::CodecError;
use crate::message::{Message, APPLICATION_JSON, CONTENT_TYPE};
use crate::span::SpanBatch;

/// Encodes `batch` as a JSON message.
pub fn encode(batch: &SpanBatch) -> Result<Message, CodecError> {
    let payload = serde_json::to_vec(batch)?;
    Ok(Message::new(payload).with_header(CONTENT_TYPE, APPLICATION_JSON))
}

/// Decodes a span batch. A message without a content type is assumed to be JSON.
pub fn decode(message: &Message) -> Result<SpanBatch, CodecError> {
    if let Some(content_type) = message.content_type() {
        // Ignore parameters such as `;charset=UTF-8`
        let media_type = content_type.split(';').next().unwrap_or_default().trim();
        if !media_type.eq_ignore_ascii_case(APPLICATION_JSON) {
            return Err(CodecError::UnsupportedContentType(content_type.to_string()));
        }
    }
    Ok(serde_json::from_slice(message.payload())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{Host, Span};

    fn batch() -> SpanBatch {
        SpanBatch::with_spans(
            Host::new("zipkin-client", "10.0.0.7", 8080),
            vec![Span::new(7, 1, None, "new_span")
                .with_tag("lc", "unknown")
                .with_times(1_000, 2_000)],
        )
    }

    #[test]
    fn test_encode_sets_content_type() {
        let batch = batch();
        let message = encode(&batch).unwrap();
        assert_eq!(message.content_type(), Some(APPLICATION_JSON));

        let decoded = decode(&message).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_missing_content_type_is_json() {
        let (_, payload) = encode(&batch()).unwrap().into_parts();
        let decoded = decode(&Message::new(payload)).unwrap();
        assert_eq!(decoded.host.service_name, "zipkin-client");
    }

    #[test]
    fn test_content_type_parameters() {
        let (_, payload) = encode(&batch()).unwrap().into_parts();
        let message = Message::new(payload).with_header(CONTENT_TYPE, "application/json;charset=UTF-8");
        assert!(decode(&message).is_ok());
    }

    #[test]
    fn test_rejects_other_content_types() {
        let message = Message::new("<spans/>").with_header(CONTENT_TYPE, "application/xml");
        assert!(matches!(
            decode(&message),
            Err(CodecError::UnsupportedContentType(ct)) if ct == "application/xml"
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        let message = Message::new("not json").with_header(CONTENT_TYPE, APPLICATION_JSON);
        assert!(matches!(decode(&message), Err(CodecError::Serialization(_))));
    }
}
