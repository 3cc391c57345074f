/// A simulation clock stepping through one run at a fixed step size.
///
/// The `Clock` hands out step indices in order and converts them to a time
/// of day, wrapping at midnight.
///
/// # Examples
///
/// ```
/// use home_energy_sim::sim::clock::Clock;
///
/// let mut clock = Clock::new(3, 0.5);
/// let mut hours = Vec::new();
///
/// while let Some(step) = clock.tick() {
///     hours.push(clock.time_of_day(step));
/// }
/// assert_eq!(hours, vec![0.0, 0.5, 1.0]);
/// assert_eq!(clock.time_of_day(50), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    /// Next step to hand out
    current: usize,
    /// Total steps in the run
    total: usize,
    /// Step duration in hours
    dt_hours: f64,
}

impl Clock {
    /// Creates a clock for `total` steps of `dt_hours` each.
    pub fn new(total: usize, dt_hours: f64) -> Self {
        Self {
            current: 0,
            total,
            dt_hours,
        }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(step)` - The step number (starting from 0) before advancing
    /// * `None` - If the clock has handed out every step
    pub fn tick(&mut self) -> Option<usize> {
        if self.current < self.total {
            let step = self.current;
            self.current += 1;
            Some(step)
        } else {
            None
        }
    }

    /// Time of day at the start of `step` (hours, `0.0..24.0`).
    pub fn time_of_day(&self, step: usize) -> f64 {
        (step as f64 * self.dt_hours).rem_euclid(24.0)
    }
}

/// Hours from `time_h` until the next occurrence of `target_h`, wrapping
/// at 24 h. Returns 0 when both coincide.
pub fn hours_until(time_h: f64, target_h: f64) -> f64 {
    (target_h - time_h).rem_euclid(24.0)
}
