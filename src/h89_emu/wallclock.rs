//! Virtual wall clock, counted in CPU T-states.
//!
//! Nothing here is real time: the clock advances only when the CPU executes
//! (or when the 2 ms slice boundary rounds it up).  The machine fans the
//! same tick deltas out to the clock-driven peripherals.

/// Ticks per 2 ms slice at the stock 2.048 MHz clock.
pub const TICKS_PER_SLICE: u64 = 4096;

pub struct WallClock {
    /// Completed slices, in ticks.
    clock: u64,
    /// Ticks accumulated inside the current slice.
    slice_ticks: u64,
    ticks_per_second: u64,
}

impl WallClock {
    pub fn new(ticks_per_second: u64) -> Self {
        Self {
            clock: 0,
            slice_ticks: 0,
            ticks_per_second,
        }
    }

    pub fn add_ticks(&mut self, ticks: u32) {
        self.slice_ticks += ticks as u64;
    }

    /// Called on the real-time 2 ms boundary: fold the slice into the
    /// cumulative clock, rounding up to the slice size if the CPU under-ran
    /// it.  Virtual time stays monotone either way.
    pub fn add_timer_event(&mut self) {
        if self.slice_ticks > TICKS_PER_SLICE {
            self.clock += self.slice_ticks;
        } else {
            self.clock += TICKS_PER_SLICE;
        }
        self.slice_ticks = 0;
    }

    pub fn get_clock(&self) -> u64 {
        self.clock + self.slice_ticks
    }

    pub fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    /// The CPU speed switch changes the effective clock rate.
    pub fn set_ticks_per_second(&mut self, tps: u64) {
        self.ticks_per_second = tps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underrun_rounds_up_to_the_slice() {
        let mut clk = WallClock::new(2_048_000);
        clk.add_ticks(1000);
        assert_eq!(clk.get_clock(), 1000);
        clk.add_timer_event();
        assert_eq!(clk.get_clock(), TICKS_PER_SLICE);
    }

    #[test]
    fn overrun_keeps_the_extra_ticks() {
        let mut clk = WallClock::new(2_048_000);
        clk.add_ticks(5000);
        clk.add_timer_event();
        assert_eq!(clk.get_clock(), 5000);
    }

    #[test]
    fn monotone_across_slices() {
        let mut clk = WallClock::new(2_048_000);
        let mut last = 0;
        for i in 0..100 {
            clk.add_ticks(if i % 3 == 0 { 100 } else { 4500 });
            clk.add_timer_event();
            let now = clk.get_clock();
            assert!(now > last);
            last = now;
        }
    }

    #[test]
    fn clock_spans_slice_boundaries() {
        let mut clk = WallClock::new(2_048_000);
        clk.add_ticks(4100);
        let mark = clk.get_clock();
        clk.add_timer_event();
        clk.add_ticks(50);
        assert_eq!(clk.get_clock() - mark, 50);
    }
}
