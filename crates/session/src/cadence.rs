//! Timers that pace outbound traffic.

/// What a server tick should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTick {
    /// Also send clock, entity, projectile and boss snapshots.
    pub non_player: bool,
}

/// Fixed-interval server tick with a repeating cycle of `max_count` ticks,
/// one of which is the non-player tick.
#[derive(Debug, Clone)]
pub struct UpdateCadence {
    interval: f32,
    max_count: u32,
    non_player_tick: u32,
    timer: f32,
    tick: u32,
}

impl UpdateCadence {
    pub fn new(interval: f32, max_count: u32, non_player_tick: u32) -> Self {
        let max_count = max_count.max(1);
        Self {
            interval: interval.max(f32::EPSILON),
            max_count,
            non_player_tick: non_player_tick % max_count,
            timer: 0.0,
            tick: 0,
        }
    }

    /// Advance by `dt`. At most one tick fires per call; a long frame does
    /// not queue up a burst of ticks.
    pub fn advance(&mut self, dt: f32) -> Option<ServerTick> {
        self.timer += dt;
        if self.timer < self.interval {
            return None;
        }
        self.timer = (self.timer - self.interval).min(self.interval);
        let tick = ServerTick {
            non_player: self.tick == self.non_player_tick,
        };
        self.tick = (self.tick + 1) % self.max_count;
        Some(tick)
    }
}

/// Coalesces bursts of changes into one send after a delay.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: f32,
    remaining: Option<f32>,
}

impl Debounce {
    pub fn new(delay: f32) -> Self {
        Self {
            delay: delay.max(0.0),
            remaining: None,
        }
    }

    /// Request a send. A send already pending keeps its deadline.
    pub fn queue(&mut self) {
        if self.remaining.is_none() {
            self.remaining = Some(self.delay);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.remaining.is_some()
    }

    pub fn cancel(&mut self) {
        self.remaining = None;
    }

    /// Returns true once when the delay has elapsed.
    pub fn advance(&mut self, dt: f32) -> bool {
        match self.remaining.as_mut() {
            Some(remaining) => {
                *remaining -= dt;
                if *remaining <= 0.0 {
                    self.remaining = None;
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_tick_in_each_cycle_carries_non_player_state() {
        let mut cadence = UpdateCadence::new(0.05, 4, 0);
        let ticks: Vec<ServerTick> = (0..8).filter_map(|_| cadence.advance(0.05)).collect();
        assert_eq!(ticks.len(), 8);
        let flagged: Vec<usize> = ticks
            .iter()
            .enumerate()
            .filter(|(_, tick)| tick.non_player)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(flagged, vec![0, 4]);
    }

    #[test]
    fn short_frames_accumulate() {
        let mut cadence = UpdateCadence::new(0.05, 4, 1);
        assert!(cadence.advance(0.02).is_none());
        assert!(cadence.advance(0.02).is_none());
        assert_eq!(cadence.advance(0.02), Some(ServerTick { non_player: false }));
    }

    #[test]
    fn long_frames_do_not_burst() {
        let mut cadence = UpdateCadence::new(0.05, 4, 0);
        assert!(cadence.advance(1.0).is_some());
        assert!(cadence.advance(0.0).is_some());
        assert!(cadence.advance(0.0).is_none());
    }

    #[test]
    fn debounce_coalesces_repeated_queues() {
        let mut debounce = Debounce::new(0.5);
        debounce.queue();
        assert!(!debounce.advance(0.3));
        debounce.queue();
        assert!(debounce.advance(0.3));
        assert!(!debounce.advance(1.0));
        assert!(!debounce.is_pending());
    }
}
