/// Two-threshold on/off decision with a dead band between `low` and `high`.
///
/// Starts disengaged. A reading at or below `low` engages the switch; it only
/// releases again once a reading climbs to `high` or above. Readings inside
/// the band keep the previous state, so a noisy sensor cannot chatter the
/// actuator. With `low == high` the band collapses to an equality-triggered
/// comparator, which is allowed.
#[derive(Debug, Clone)]
pub struct Hysteresis {
    low: f64,
    high: f64,
    engaged: bool,
}

impl Hysteresis {
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            low,
            high,
            engaged: false,
        }
    }

    /// Feeds one reading through the state machine and returns the
    /// post-transition state. At most one transition happens per call.
    pub fn set_value(&mut self, value: f64) -> bool {
        if !self.engaged && value <= self.low {
            self.engaged = true;
        } else if self.engaged && value >= self.high {
            self.engaged = false;
        }
        self.engaged
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }
}
