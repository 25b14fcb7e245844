//! Client-facing protocol error kinds.
//!
//! Internal inconsistencies (an `OutputRemoved` for an unknown id, a
//! request referencing an unknown client) are not modeled here — they're
//! plain diagnostic strings carried on `CoreOutput::CoreError`, since
//! they're reported to logs/telemetry rather than to the offending client.

/// An error reported back to a client via `Event::Error`. The request that
/// triggered it is dropped; state is left unmutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClientProtocolError {
    #[error("operation referenced an unknown surface")]
    BadSurface,
    #[error("operation referenced a window that is not mapped")]
    BadWindow,
}
