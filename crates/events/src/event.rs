use chrono::{DateTime, Utc};

/// A domain event: an immutable fact about one aggregate instance.
///
/// Each aggregate defines a closed enum of events; `EVENT_TYPES` lists every
/// tag that enum can produce so readers can tell an unknown tag (newer writer,
/// wrong stream) apart from a corrupt payload.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// All type tags this event enum accepts.
    const EVENT_TYPES: &'static [&'static str];

    /// Stable event name/type identifier (e.g. "org.employee.hired").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Whether `event_type` belongs to this event enum.
    fn is_known_type(event_type: &str) -> bool {
        Self::EVENT_TYPES.contains(&event_type)
    }
}
