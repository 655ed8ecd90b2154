//! Ping-location strings and one-way latency estimation.
//!
//! A ping location lists the measured round-trip time from a peer to a set
//! of named reference points (`"relay=ms,relay=ms"`). The round trip between
//! two peers is estimated through the best shared reference point; half of
//! it is the one-way latency used to compensate time-dependent fields.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Upper bound on a serialized ping location accepted from the wire.
pub const MAX_PING_LOCATION_LEN: usize = 512;

/// Latency estimates are clamped to this many seconds.
pub const MAX_COMPENSATION_SECONDS: f32 = 1.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PingLocationError {
    #[error("ping location too long ({0} bytes)")]
    TooLong(usize),
    #[error("malformed ping location entry: {0:?}")]
    Malformed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingLocation {
    relays: BTreeMap<String, u32>,
}

impl PingLocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the round trip to a reference point, keeping the best sample.
    pub fn with_relay(mut self, relay: impl Into<String>, round_trip_ms: u32) -> Self {
        self.set_relay(relay, round_trip_ms);
        self
    }

    pub fn set_relay(&mut self, relay: impl Into<String>, round_trip_ms: u32) {
        let entry = self.relays.entry(relay.into()).or_insert(round_trip_ms);
        *entry = (*entry).min(round_trip_ms);
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// Estimated round trip to `other` in milliseconds, through the shared
    /// reference point with the lowest combined time.
    pub fn estimate_round_trip_ms(&self, other: &PingLocation) -> Option<u32> {
        self.relays
            .iter()
            .filter_map(|(relay, ours)| other.relays.get(relay).map(|theirs| ours.saturating_add(*theirs)))
            .min()
    }

    /// One-way latency to `other` in seconds, or zero when the locations
    /// share no reference point.
    pub fn latency_seconds(&self, other: &PingLocation) -> f32 {
        self.estimate_round_trip_ms(other)
            .map(|rtt| (rtt as f32 / 2000.0).min(MAX_COMPENSATION_SECONDS))
            .unwrap_or(0.0)
    }

    /// Latency to a peer given its serialized location. Unparseable
    /// locations compensate nothing.
    pub fn latency_to(&self, remote: &str) -> f32 {
        match remote.parse::<PingLocation>() {
            Ok(location) => self.latency_seconds(&location),
            Err(err) => {
                tracing::debug!(%err, "ignoring unparseable ping location");
                0.0
            }
        }
    }
}

impl fmt::Display for PingLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (relay, ms)) in self.relays.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{relay}={ms}")?;
        }
        Ok(())
    }
}

impl FromStr for PingLocation {
    type Err = PingLocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_PING_LOCATION_LEN {
            return Err(PingLocationError::TooLong(s.len()));
        }
        let mut location = PingLocation::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (relay, ms) = entry
                .split_once('=')
                .ok_or_else(|| PingLocationError::Malformed(entry.to_string()))?;
            let ms = ms
                .trim()
                .parse::<u32>()
                .map_err(|_| PingLocationError::Malformed(entry.to_string()))?;
            let relay = relay.trim();
            if relay.is_empty() {
                return Err(PingLocationError::Malformed(entry.to_string()));
            }
            location.set_relay(relay, ms);
        }
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_roundtrip() {
        let location = PingLocation::new().with_relay("fra", 30).with_relay("ams", 12);
        let text = location.to_string();
        assert_eq!(text, "ams=12,fra=30");
        assert_eq!(text.parse::<PingLocation>().unwrap(), location);
        assert_eq!("".parse::<PingLocation>().unwrap(), PingLocation::new());
    }

    #[test]
    fn estimate_uses_best_shared_relay() {
        let a = PingLocation::new().with_relay("ams", 10).with_relay("fra", 40);
        let b = PingLocation::new().with_relay("ams", 70).with_relay("fra", 20).with_relay("lon", 5);
        assert_eq!(a.estimate_round_trip_ms(&b), Some(60));
        assert!((a.latency_seconds(&b) - 0.03).abs() < 1e-6);
        assert_eq!(a.estimate_round_trip_ms(&PingLocation::new().with_relay("nyc", 1)), None);
    }

    #[test]
    fn malformed_locations_compensate_nothing() {
        let local = PingLocation::new().with_relay("host", 0);
        assert!("host".parse::<PingLocation>().is_err());
        assert!("host=abc".parse::<PingLocation>().is_err());
        assert!("=4".parse::<PingLocation>().is_err());
        assert_eq!(local.latency_to("host=x"), 0.0);
        assert_eq!(local.latency_to("host=100"), 0.05);
    }

    #[test]
    fn latency_is_clamped() {
        let local = PingLocation::new().with_relay("host", 0);
        assert_eq!(local.latency_to("host=900000"), MAX_COMPENSATION_SECONDS);
        let long = "a=1,".repeat(200);
        assert!(matches!(long.parse::<PingLocation>(), Err(PingLocationError::TooLong(_))));
    }
}
