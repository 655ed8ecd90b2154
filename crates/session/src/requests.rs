//! Client-side bookkeeping of chunk requests in flight.

use std::collections::BTreeMap;

use starhaven_world::ChunkPosition;

/// One outstanding request per chunk position, stamped with the local clock.
///
/// A position is only asked for again once its request is older than the
/// timeout, unless the caller forces it.
#[derive(Debug, Clone, Default)]
pub struct OutstandingChunkRequests {
    sent_at: BTreeMap<ChunkPosition, f64>,
    timeout: f64,
}

impl OutstandingChunkRequests {
    pub fn new(timeout: f32) -> Self {
        Self {
            sent_at: BTreeMap::new(),
            timeout: timeout.max(0.0) as f64,
        }
    }

    /// Pick the positions that should go out now and stamp them with `now`.
    /// Requests that went unanswered past the timeout are dropped first.
    pub fn claim(&mut self, positions: &[ChunkPosition], now: f64, force: bool) -> Vec<ChunkPosition> {
        let timeout = self.timeout;
        self.sent_at.retain(|_, sent| now - *sent < timeout);
        let mut claimed = Vec::new();
        for &pos in positions {
            let due = force || !self.sent_at.contains_key(&pos);
            if due && !claimed.contains(&pos) {
                self.sent_at.insert(pos, now);
                claimed.push(pos);
            }
        }
        claimed
    }

    /// A reply arrived. Returns whether the position was outstanding.
    pub fn complete(&mut self, pos: ChunkPosition) -> bool {
        self.sent_at.remove(&pos).is_some()
    }

    pub fn is_outstanding(&self, pos: ChunkPosition) -> bool {
        self.sent_at.contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.sent_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent_at.is_empty()
    }

    /// Forget requests that can no longer be answered, e.g. after travel.
    pub fn clear(&mut self) {
        self.sent_at.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POS: ChunkPosition = ChunkPosition::new(4, 7);

    #[test]
    fn duplicate_requests_are_suppressed_until_timeout() {
        let mut requests = OutstandingChunkRequests::new(3.0);
        assert_eq!(requests.claim(&[POS], 0.0, false), vec![POS]);
        assert!(requests.claim(&[POS], 1.0, false).is_empty());
        assert!(requests.claim(&[POS], 2.9, false).is_empty());
        assert_eq!(requests.claim(&[POS], 3.1, false), vec![POS]);
        // Timer was reset by the re-request.
        assert!(requests.claim(&[POS], 4.0, false).is_empty());
    }

    #[test]
    fn force_bypasses_the_cooldown() {
        let mut requests = OutstandingChunkRequests::new(3.0);
        requests.claim(&[POS], 0.0, false);
        assert_eq!(requests.claim(&[POS], 0.5, true), vec![POS]);
    }

    #[test]
    fn completion_frees_the_position() {
        let mut requests = OutstandingChunkRequests::new(3.0);
        requests.claim(&[POS], 0.0, false);
        assert!(requests.complete(POS));
        assert!(!requests.complete(POS));
        assert_eq!(requests.claim(&[POS], 0.1, false), vec![POS]);
    }

    #[test]
    fn repeated_positions_in_one_call_go_out_once() {
        let mut requests = OutstandingChunkRequests::new(3.0);
        let other = ChunkPosition::new(0, 0);
        assert_eq!(requests.claim(&[POS, other, POS], 0.0, true), vec![POS, other]);
        assert_eq!(requests.len(), 2);
    }

    #[test]
    fn unanswered_requests_expire() {
        let mut requests = OutstandingChunkRequests::new(3.0);
        let stale = [ChunkPosition::new(0, 0), ChunkPosition::new(1, 0), ChunkPosition::new(2, 0)];
        requests.claim(&stale, 0.0, false);
        assert_eq!(requests.len(), 3);
        requests.claim(&[POS], 10.0, false);
        assert_eq!(requests.len(), 1);
        assert!(stale.iter().all(|&pos| !requests.is_outstanding(pos)));
        assert!(requests.is_outstanding(POS));
    }
}
