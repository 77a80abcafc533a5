/// Panic containment for inbound message handlers.
///
/// Every handler the sync loop dispatches runs through
/// [`safely_handle_message`], so a bug triggered by one peer's message costs
/// that message and nothing else.
use std::any::Any;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use crate::types::P2pMessage;

/// Rendered in place of the payload when a message carries no data.
pub const NO_DATA_MARKER: &str = "message contains no data";

/// Result of running a handler under [`safely_handle_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The handler returned normally.
    Handled,
    /// The handler panicked; the panic was logged and swallowed.
    Recovered { panic: String },
}

impl HandleOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, HandleOutcome::Recovered { .. })
    }
}

/// Run `handler` on `message`, recovering from any panic it raises.
///
/// On panic the payload is logged together with a debug rendering of the
/// message data (or [`NO_DATA_MARKER`]), and the message span is marked as
/// failed when it is being recorded.
pub fn safely_handle_message<T, F>(handler: F, message: &P2pMessage<T>) -> HandleOutcome
where
    T: Debug,
    F: FnOnce(&P2pMessage<T>),
{
    let _entered = message.span.enter();

    match panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
        Ok(()) => HandleOutcome::Handled,
        Err(payload) => {
            let panic = panic_message(payload.as_ref());
            let printed = match &message.data {
                Some(data) => format!("{data:?}"),
                None => NO_DATA_MARKER.to_owned(),
            };

            error!(
                r = %panic,
                msg = %printed,
                peer = %message.peer,
                "Panicked when handling p2p message! Recovering..."
            );

            if !message.span.is_disabled() {
                message.span.record("otel.status_code", "ERROR");
                message.span.record("error", format!("Panic: {panic}").as_str());
            }

            HandleOutcome::Recovered { panic }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BeaconBlockResponse;
    use containers::{Block, Slot};
    use libp2p_identity::PeerId;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing::field::{Field, Visit};
    use tracing::span::{Id, Record};
    use tracing::Subscriber;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_test::traced_test;

    /// Collects every field recorded on a span after it was created.
    #[derive(Clone, Default)]
    struct RecordedFields(Arc<Mutex<Vec<(String, String)>>>);

    impl RecordedFields {
        fn get(&self, name: &str) -> Option<String> {
            self.0
                .lock()
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value.clone())
        }
    }

    impl Visit for RecordedFields {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.lock().push((field.name().to_owned(), value.to_owned()));
        }

        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            self.0
                .lock()
                .push((field.name().to_owned(), format!("{value:?}")));
        }
    }

    impl<S: Subscriber> Layer<S> for RecordedFields {
        fn on_record(&self, _span: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
            values.record(&mut self.clone());
        }
    }

    fn block_message() -> P2pMessage<BeaconBlockResponse> {
        P2pMessage::new(
            PeerId::random(),
            BeaconBlockResponse {
                block: Block {
                    slot: Slot(3),
                    ..Block::default()
                },
            },
        )
    }

    #[test]
    #[traced_test]
    fn test_safely_handle_message() {
        let outcome = safely_handle_message(|_| panic!("bad!"), &block_message());

        assert_eq!(
            outcome,
            HandleOutcome::Recovered {
                panic: "bad!".to_owned()
            }
        );
        assert!(logs_contain("Panicked when handling p2p message!"));
        assert!(logs_contain("slot: Slot(3)"));
    }

    #[test]
    #[traced_test]
    fn test_safely_handle_message_no_data() {
        let message = P2pMessage::<BeaconBlockResponse>::empty(PeerId::random());
        let outcome = safely_handle_message(|_| panic!("bad!"), &message);

        assert!(outcome.is_recovered());
        assert!(logs_contain(NO_DATA_MARKER));
    }

    #[test]
    fn test_panic_marks_span_failed() {
        let fields = RecordedFields::default();
        let subscriber = tracing_subscriber::registry().with(fields.clone());

        tracing::subscriber::with_default(subscriber, || {
            let message = block_message();
            let outcome = safely_handle_message(|_| panic!("bad!"), &message);
            assert!(outcome.is_recovered());
        });

        assert_eq!(fields.get("otel.status_code").as_deref(), Some("ERROR"));
        assert_eq!(fields.get("error").as_deref(), Some("Panic: bad!"));
    }

    #[test]
    fn test_clean_run_leaves_span_untouched() {
        let fields = RecordedFields::default();
        let subscriber = tracing_subscriber::registry().with(fields.clone());

        tracing::subscriber::with_default(subscriber, || {
            safely_handle_message(|_| {}, &block_message());
        });

        assert_eq!(fields.get("otel.status_code"), None);
        assert_eq!(fields.get("error"), None);
    }

    #[test]
    fn test_formatted_panic_payload() {
        let outcome = safely_handle_message(
            |message: &P2pMessage<BeaconBlockResponse>| {
                let slot = message.data.as_ref().map(|data| data.block.slot.0);
                panic!("unexpected slot {slot:?}");
            },
            &block_message(),
        );

        assert_eq!(
            outcome,
            HandleOutcome::Recovered {
                panic: "unexpected slot Some(3)".to_owned()
            }
        );
    }

    #[test]
    fn test_handler_runs_normally() {
        let mut seen = None;
        let outcome = safely_handle_message(
            |message: &P2pMessage<BeaconBlockResponse>| {
                seen = message.data.as_ref().map(|data| data.block.slot);
            },
            &block_message(),
        );

        assert_eq!(outcome, HandleOutcome::Handled);
        assert_eq!(seen, Some(Slot(3)));
    }
}
