use serde::{Deserialize, Serialize};

/// A normalized inbound chat event, already stripped of any transport
/// framing by the channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Phone-like customer identity (`+` and digits).
    pub identity: String,
    pub kind: EventKind,
    /// Free text for `Text`, the selected row/choice id for `Selection`.
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Text,
    Selection,
}

impl InboundEvent {
    pub fn text(identity: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            kind: EventKind::Text,
            payload: payload.into(),
        }
    }

    pub fn selection(identity: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            kind: EventKind::Selection,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_round_trips() {
        let event: InboundEvent = serde_json::from_str(
            r#"{"identity":"+5491112345678","kind":"selection","payload":"14:00"}"#,
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::Selection);
        assert_eq!(event.payload, "14:00");

        let encoded = serde_json::to_string(&InboundEvent::text("+5491112345678", "hola")).unwrap();
        assert!(encoded.contains(r#""kind":"text""#), "{}", encoded);
    }
}
