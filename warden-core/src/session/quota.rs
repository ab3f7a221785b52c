//! Per-address session quota

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use super::state::SessionId;

/// Maps client address to the sessions counted against it (queued and active)
#[derive(Debug)]
pub struct IpQuotaTracker {
    limit: usize,
    entries: HashMap<IpAddr, HashSet<SessionId>>,
    seen: HashSet<IpAddr>,
}

impl IpQuotaTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Reserve a slot for `session` if `client` is under its cap.
    ///
    /// On refusal nothing changes.
    pub fn try_reserve(&mut self, client: IpAddr, session: SessionId) -> bool {
        self.seen.insert(client);
        let reserved = self.entries.entry(client).or_default();
        if reserved.len() >= self.limit {
            if reserved.is_empty() {
                self.entries.remove(&client);
            }
            return false;
        }
        reserved.insert(session);
        true
    }

    /// Release a reservation; unknown ids are ignored
    pub fn release(&mut self, client: IpAddr, session: SessionId) -> bool {
        let Some(reserved) = self.entries.get_mut(&client) else {
            return false;
        };
        let removed = reserved.remove(&session);
        if reserved.is_empty() {
            self.entries.remove(&client);
        }
        removed
    }

    /// Sessions currently counted against `client`
    pub fn count(&self, client: &IpAddr) -> usize {
        self.entries.get(client).map_or(0, HashSet::len)
    }

    /// Distinct addresses that ever attempted a session
    pub fn distinct_clients(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 0, last))
    }

    #[test]
    fn reserves_up_to_limit() {
        let mut quota = IpQuotaTracker::new(2);
        assert!(quota.try_reserve(addr(1), SessionId::new()));
        assert!(quota.try_reserve(addr(1), SessionId::new()));
        assert!(!quota.try_reserve(addr(1), SessionId::new()));
        assert_eq!(quota.count(&addr(1)), 2);
    }

    #[test]
    fn addresses_are_independent() {
        let mut quota = IpQuotaTracker::new(1);
        assert!(quota.try_reserve(addr(1), SessionId::new()));
        assert!(quota.try_reserve(addr(2), SessionId::new()));
        assert!(!quota.try_reserve(addr(1), SessionId::new()));
    }

    #[test]
    fn release_frees_a_slot() {
        let mut quota = IpQuotaTracker::new(1);
        let id = SessionId::new();
        assert!(quota.try_reserve(addr(1), id));
        assert!(quota.release(addr(1), id));
        assert_eq!(quota.count(&addr(1)), 0);
        assert!(quota.try_reserve(addr(1), SessionId::new()));
    }

    #[test]
    fn release_is_idempotent() {
        let mut quota = IpQuotaTracker::new(2);
        let id = SessionId::new();
        let other = SessionId::new();
        quota.try_reserve(addr(1), id);
        quota.try_reserve(addr(1), other);

        assert!(quota.release(addr(1), id));
        assert!(!quota.release(addr(1), id));
        assert!(!quota.release(addr(9), id));
        assert_eq!(quota.count(&addr(1)), 1);
    }

    #[test]
    fn zero_limit_rejects_everything() {
        let mut quota = IpQuotaTracker::new(0);
        assert!(!quota.try_reserve(addr(1), SessionId::new()));
        assert_eq!(quota.count(&addr(1)), 0);
    }

    #[test]
    fn distinct_clients_counts_rejected_addresses_too() {
        let mut quota = IpQuotaTracker::new(1);
        quota.try_reserve(addr(1), SessionId::new());
        quota.try_reserve(addr(1), SessionId::new());
        quota.try_reserve(addr(2), SessionId::new());
        assert_eq!(quota.distinct_clients(), 2);
    }
}
