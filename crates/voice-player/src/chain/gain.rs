//! Master gain automation.
//!
//! Gain changes are never hard-set while audio plays: a [`GainRamp`] starts an exponential
//! approach toward its target at a device-clock instant, continuing from whatever value the
//! previous approach had reached at that instant.

/// A scheduled change of the master gain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainRamp {
    /// Value being approached.
    pub target: f32,
    /// Device-clock instant (seconds) the approach starts.
    pub at: f64,
    /// Time constant of the approach (seconds). Zero or negative jumps immediately.
    pub time_constant: f64,
}

#[derive(Clone, Copy, Debug)]
struct Approach {
    from: f32,
    target: f32,
    at: f64,
    time_constant: f64,
}

impl Approach {
    fn value_at(&self, t: f64) -> f32 {
        if t < self.at {
            return self.from;
        }
        if self.time_constant <= 0.0 {
            return self.target;
        }
        let decay = (-(t - self.at) / self.time_constant).exp() as f32;
        self.target + (self.from - self.target) * decay
    }

    /// After this many time constants the residual is below -80 dB of the step.
    fn settled_by(&self) -> f64 {
        self.at + self.time_constant.max(0.0) * 10.0
    }
}

/// Piecewise-exponential gain curve evaluated per output frame.
#[derive(Clone, Debug)]
pub struct GainAutomation {
    value: f32,
    approach: Option<Approach>,
}

impl GainAutomation {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            approach: None,
        }
    }

    pub fn value_at(&self, t: f64) -> f32 {
        match &self.approach {
            Some(a) => a.value_at(t),
            None => self.value,
        }
    }

    /// Target the curve is heading toward.
    pub fn target(&self) -> f32 {
        match &self.approach {
            Some(a) => a.target,
            None => self.value,
        }
    }

    pub fn apply(&mut self, ramp: GainRamp) {
        let from = self.value_at(ramp.at);
        self.approach = Some(Approach {
            from,
            target: ramp.target,
            at: ramp.at,
            time_constant: ramp.time_constant,
        });
    }

    /// Collapse a finished approach so the render loop stops evaluating `exp`.
    pub fn settle(&mut self, t: f64) {
        if let Some(a) = &self.approach {
            if t >= a.settled_by() {
                self.value = a.target;
                self.approach = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_value_until_ramp_starts() {
        let mut g = GainAutomation::new(1.0);
        g.apply(GainRamp {
            target: 2.0,
            at: 1.0,
            time_constant: 0.03,
        });
        assert_eq!(g.value_at(0.5), 1.0);
        assert_eq!(g.value_at(1.0), 1.0);
    }

    #[test]
    fn approaches_target_exponentially() {
        let mut g = GainAutomation::new(1.0);
        g.apply(GainRamp {
            target: 2.0,
            at: 0.0,
            time_constant: 0.03,
        });
        let one_tau = g.value_at(0.03);
        assert!((one_tau - (2.0 - (-1.0f32).exp())).abs() < 1e-4);
        assert!((g.value_at(1.0) - 2.0).abs() < 1e-4);
    }

    #[test]
    fn new_ramp_continues_from_current_value() {
        let mut g = GainAutomation::new(1.0);
        g.apply(GainRamp {
            target: 2.0,
            at: 0.0,
            time_constant: 0.03,
        });
        let mid = g.value_at(0.03);
        g.apply(GainRamp {
            target: 0.5,
            at: 0.03,
            time_constant: 0.03,
        });
        assert!((g.value_at(0.03) - mid).abs() < 1e-6);
        assert!(g.value_at(0.06) < mid);
    }

    #[test]
    fn settle_collapses_finished_approach() {
        let mut g = GainAutomation::new(1.0);
        g.apply(GainRamp {
            target: 0.5,
            at: 0.0,
            time_constant: 0.03,
        });
        g.settle(0.1);
        assert!(g.approach.is_some());
        g.settle(0.5);
        assert!(g.approach.is_none());
        assert_eq!(g.value_at(0.0), 0.5);
        assert_eq!(g.target(), 0.5);
    }
}
