//! Pluggable blacklist hook, consulted at seed/add time when enabled.

use crate::request::RequestRecord;

/// Predicate over a normalized request record. A blacklisted record is
/// skipped exactly like a malformed URI: logged, never enqueued.
pub trait Blacklist: Send + Sync {
    fn is_blacklisted(&self, record: &RequestRecord) -> bool;
}

/// Default hook: nothing is blacklisted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBlacklist;

impl Blacklist for NoBlacklist {
    fn is_blacklisted(&self, _record: &RequestRecord) -> bool {
        false
    }
}

impl<F> Blacklist for F
where
    F: Fn(&RequestRecord) -> bool + Send + Sync,
{
    fn is_blacklisted(&self, record: &RequestRecord) -> bool {
        self(record)
    }
}
