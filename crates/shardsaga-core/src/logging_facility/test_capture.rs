//! In-memory event capture for log assertions in tests
//!
//! Tests run in parallel against one global subscriber, so every query on
//! [`TestCapture`] is scoped to a saga id.

use shardsaga_core_types::schema::{FIELD_EVENT, FIELD_OP, FIELD_SAGA_ID};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// One recorded event, every field rendered to text
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn op(&self) -> Option<&str> {
        self.field(FIELD_OP)
    }

    /// Canonical event name (`start`, `end`, `retry`, `transition`, ...)
    pub fn event(&self) -> Option<&str> {
        self.field(FIELD_EVENT)
    }

    pub fn saga_id(&self) -> Option<&str> {
        self.field(FIELD_SAGA_ID)
    }

    /// True if any field, the message included, contains `needle`
    pub fn mentions(&self, needle: &str) -> bool {
        self.fields.values().any(|v| v.contains(needle))
    }
}

#[derive(Default)]
struct FieldRecorder(BTreeMap<String, String>);

impl FieldRecorder {
    fn put(&mut self, field: &Field, value: String) {
        self.0.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldRecorder {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.to_string());
    }
}

struct CaptureLayer {
    sink: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        let captured = CapturedEvent {
            level: *event.metadata().level(),
            fields: recorder.0,
        };
        if let Ok(mut sink) = self.sink.lock() {
            sink.push(captured);
        }
    }
}

/// Shared handle onto everything captured so far
#[derive(Clone)]
pub struct TestCapture {
    sink: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl TestCapture {
    /// Events logged with the given saga id, in emission order
    pub fn for_saga(&self, saga_id: &str) -> Vec<CapturedEvent> {
        self.sink
            .lock()
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.saga_id() == Some(saga_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// How many of a saga's events carry `event`, optionally for one `op`
    pub fn count(&self, saga_id: &str, op: Option<&str>, event: &str) -> usize {
        self.for_saga(saga_id)
            .iter()
            .filter(|e| e.event() == Some(event))
            .filter(|e| op.is_none() || e.op() == op)
            .count()
    }

    /// How many captured events, from any saga, satisfy `predicate`
    pub fn count_where(&self, predicate: impl Fn(&CapturedEvent) -> bool) -> usize {
        self.sink
            .lock()
            .map(|events| events.iter().filter(|e| predicate(e)).count())
            .unwrap_or_default()
    }
}

static CAPTURE: OnceLock<TestCapture> = OnceLock::new();

/// Install the capture layer as the global subscriber (once) and return the
/// shared handle
///
/// ```
/// use shardsaga_core::logging_facility::init_test_capture;
/// use shardsaga_core::log_op_start;
///
/// let capture = init_test_capture();
/// log_op_start!("saga_execute", saga_id = "doc-saga");
/// assert_eq!(capture.count("doc-saga", Some("saga_execute"), "start"), 1);
/// ```
pub fn init_test_capture() -> TestCapture {
    CAPTURE
        .get_or_init(|| {
            let sink = Arc::new(Mutex::new(Vec::new()));
            let layer = CaptureLayer {
                sink: Arc::clone(&sink),
            };
            // Another subscriber may already be installed in this process
            let _ = tracing_subscriber::registry().with(layer).try_init();
            TestCapture { sink }
        })
        .clone()
}
