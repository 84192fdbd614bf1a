//! Kernel timing utilities
//!
//! Wall-clock timing of node kernels and compilation stages, based on
//! `std::time::Instant`.

use std::time::{Duration, Instant};

/// Timer for one kernel execution.
///
/// # Example
///
/// ```rust
/// use cpuforge::profiling::KernelTimer;
///
/// let mut timer = KernelTimer::for_kernel("scale_shift");
/// timer.start();
/// // ... execute kernel ...
/// timer.stop();
///
/// if let Some(elapsed) = timer.elapsed() {
///     println!("Elapsed: {:?}", elapsed);
/// }
/// ```
#[derive(Debug)]
pub struct KernelTimer {
    /// Name of the kernel being timed
    name: String,
    start: Option<Instant>,
    /// Set by `stop()`
    elapsed: Option<Duration>,
}

impl KernelTimer {
    pub fn for_kernel(name: impl Into<String>) -> Self {
        KernelTimer {
            name: name.into(),
            start: None,
            elapsed: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start (or restart) timing.
    pub fn start(&mut self) {
        self.start = Some(Instant::now());
        self.elapsed = None;
    }

    /// Stop timing. Has no effect on a timer that was never started.
    pub fn stop(&mut self) {
        if let Some(start) = self.start {
            self.elapsed = Some(start.elapsed());
        }
    }

    /// Elapsed time, `None` until the timer is stopped.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Elapsed time in microseconds, zero until stopped.
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed
            .map(|d| d.as_micros().min(u64::MAX as u128) as u64)
            .unwrap_or(0)
    }

    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.elapsed.is_some()
    }
}

/// Timer that logs its elapsed time at debug level when dropped.
///
/// ```rust
/// use cpuforge::profiling::ScopedTimer;
///
/// {
///     let _timer = ScopedTimer::new("memory_plan");
///     // ... code to time ...
/// } // logs "memory_plan: x.xxx ms"
/// ```
#[derive(Debug)]
pub struct ScopedTimer {
    name: String,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(name: impl Into<String>) -> Self {
        ScopedTimer {
            name: name.into(),
            start: Instant::now(),
        }
    }

    /// Elapsed time in milliseconds
    pub fn elapsed(&self) -> f32 {
        self.start.elapsed().as_secs_f64() as f32 * 1000.0
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        tracing::debug!("{}: {:.3} ms", self.name, self.elapsed());
    }
}
