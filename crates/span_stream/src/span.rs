use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// A closed distributed tracing span.
///
/// Spans are produced by [`Tracer::close`](crate::Tracer::close) and are
/// immutable from then on; the builder-style `with_*` methods consume the span
/// and are meant for assembling fixtures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Trace identifier (128-bit, hex on the wire)
    #[serde(with = "hex_u128")]
    trace_id: u128,
    /// Span identifier (64-bit, hex on the wire)
    #[serde(with = "hex_u64")]
    span_id: u64,
    /// Parent span identifier (absent for a trace root)
    #[serde(with = "hex_u64_opt", default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<u64>,
    /// Operation name
    name: String,
    /// Span start time (Unix nanoseconds)
    start_time: u64,
    /// Span end time (Unix nanoseconds)
    end_time: u64,
    /// Key-value annotations
    #[serde(default)]
    tags: BTreeMap<String, String>,
    /// Timestamped events recorded while the span was open
    #[serde(default)]
    logs: Vec<Log>,
    /// Whether the sampler selected this span for export
    exportable: bool,
}

/// A timestamped event inside a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Event time (Unix nanoseconds)
    pub timestamp: u64,
    /// Event name, e.g. `cs` / `sr` for client-send / server-receive
    pub event: String,
}

/// Identity of a span, enough to create children of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanContext {
    pub trace_id: u128,
    pub span_id: u64,
    pub parent_id: Option<u64>,
    pub sampled: bool,
}

/// The process a batch of spans came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub service_name: String,
    pub address: String,
    pub port: u16,
}

/// Spans bundled for a single publish operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanBatch {
    /// Emitting process
    pub host: Host,
    /// Spans in export order
    pub spans: Vec<Span>,
}

impl Span {
    /// Creates a closed span that starts and ends now.
    pub fn new(trace_id: u128, span_id: u64, parent_id: Option<u64>, name: impl Into<String>) -> Self {
        let now = now_nanos();
        Self {
            trace_id,
            span_id,
            parent_id,
            name: name.into(),
            start_time: now,
            end_time: now,
            tags: BTreeMap::new(),
            logs: Vec::new(),
            exportable: true,
        }
    }

    pub(crate) fn closed(
        context: SpanContext,
        name: String,
        start_time: u64,
        tags: BTreeMap<String, String>,
        logs: Vec<Log>,
    ) -> Self {
        Self {
            trace_id: context.trace_id,
            span_id: context.span_id,
            parent_id: context.parent_id,
            name,
            start_time,
            end_time: now_nanos().max(start_time),
            tags,
            logs,
            exportable: context.sampled,
        }
    }

    /// Adds a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Overrides start and end times.
    pub fn with_times(mut self, start_time: u64, end_time: u64) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Marks the span as exportable or not.
    pub fn with_exportable(mut self, exportable: bool) -> Self {
        self.exportable = exportable;
        self
    }

    pub fn trace_id(&self) -> u128 {
        self.trace_id
    }

    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    pub fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn end_time(&self) -> u64 {
        self.end_time
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    pub fn is_exportable(&self) -> bool {
        self.exportable
    }

    /// Duration of the span in nanoseconds
    pub fn duration_nanos(&self) -> u64 {
        self.end_time.saturating_sub(self.start_time)
    }

    /// Context of this span, e.g. to continue the trace elsewhere.
    pub fn context(&self) -> SpanContext {
        SpanContext {
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_id: self.parent_id,
            sampled: self.exportable,
        }
    }
}

impl Host {
    pub fn new(service_name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            address: address.into(),
            port,
        }
    }

    /// Loopback host for the given service.
    pub fn local(service_name: impl Into<String>) -> Self {
        Self::new(service_name, "127.0.0.1", 0)
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::local("unknown")
    }
}

impl SpanBatch {
    /// Creates a new empty span batch
    pub fn new(host: Host) -> Self {
        Self {
            host,
            spans: Vec::new(),
        }
    }

    /// Creates a batch with the given spans
    pub fn with_spans(host: Host, spans: Vec<Span>) -> Self {
        Self { host, spans }
    }

    /// Adds a span to the batch
    pub fn add(&mut self, span: Span) {
        self.spans.push(span);
    }

    /// Returns the number of spans in the batch
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Returns true if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Returns the first span called `name`, if any.
    pub fn find_by_name(&self, name: &str) -> Option<&Span> {
        self.spans.iter().find(|s| s.name == name)
    }
}

/// Current time as Unix nanoseconds (0 if the clock is before the epoch).
pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

mod hex_u128 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:032x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        u128::from_str_radix(&s, 16).map_err(D::Error::custom)
    }
}

mod hex_u64 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:016x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        u64::from_str_radix(&s, 16).map_err(D::Error::custom)
    }
}

mod hex_u64_opt {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&format!("{v:016x}")),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| u64::from_str_radix(&s, 16).map_err(D::Error::custom))
            .transpose()
    }
}
