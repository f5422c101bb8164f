//! CPU and memory load generators behind `/stress/*`.
//!
//! Both run on their own OS threads so connection tasks on the runtime keep
//! being polled while the load is applied.

use std::time::{Duration, Instant};

/// Length of one busy/idle cycle for CPU load.
const DUTY_CYCLE: Duration = Duration::from_millis(100);

const PAGE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StressError {
    #[error("CPU percentage must be between 0 and 100")]
    Percent,
    #[error("Duration must be non-negative")]
    Duration,
    #[error("Memory must be a whole number of MiB, at most {max_mb}")]
    Memory { max_mb: u64 },
    #[error("Failed to start load generator")]
    Spawn,
}

/// Parse `cpu_percent`.
pub fn parse_percent(value: Option<&str>) -> Result<u8, StressError> {
    value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|p| *p <= 100)
        .ok_or(StressError::Percent)
}

/// Parse `duration` in whole seconds.
pub fn parse_duration(value: Option<&str>) -> Result<Duration, StressError> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .ok_or(StressError::Duration)
}

/// Parse `memory_mb`, capped at `max_mb`.
pub fn parse_memory_mb(value: Option<&str>, max_mb: u64) -> Result<u64, StressError> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|mb| *mb <= max_mb)
        .ok_or(StressError::Memory { max_mb })
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Number of busy threads used for `percent` of the machine.
pub fn cpu_threads(percent: u8, cores: usize) -> usize {
    if percent == 0 {
        return 0;
    }
    (cores * percent as usize / 100).max(1)
}

/// Keep `percent` of the cores busy for `duration`. Returns the thread count.
pub fn spawn_cpu_stress(percent: u8, duration: Duration) -> Result<usize, StressError> {
    let threads = cpu_threads(percent, available_cores());
    if duration.is_zero() {
        return Ok(0);
    }

    for i in 0..threads {
        std::thread::Builder::new()
            .name(format!("cpu-stress-{i}"))
            .spawn(move || burn(percent, duration))
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to spawn CPU stress thread");
                StressError::Spawn
            })?;
    }

    tracing::info!(percent, threads, duration = ?duration, "CPU stress started");
    Ok(threads)
}

fn burn(percent: u8, duration: Duration) {
    let end = Instant::now() + duration;
    let busy = DUTY_CYCLE * percent as u32 / 100;
    let idle = DUTY_CYCLE - busy;

    while Instant::now() < end {
        let cycle = Instant::now();
        let mut x: u64 = 1;
        while cycle.elapsed() < busy {
            x = std::hint::black_box(x.wrapping_mul(6364136223846793005).wrapping_add(1));
        }
        if !idle.is_zero() {
            std::thread::sleep(idle);
        }
    }
}

/// Hold `megabytes` MiB of resident memory for `duration`.
pub fn spawn_memory_stress(megabytes: u64, duration: Duration) -> Result<(), StressError> {
    if megabytes == 0 || duration.is_zero() {
        return Ok(());
    }

    std::thread::Builder::new()
        .name("memory-stress".into())
        .spawn(move || {
            let bytes = megabytes as usize * 1024 * 1024;
            let mut block = vec![0u8; bytes];
            // Touch every page so the allocation is actually resident.
            for i in (0..bytes).step_by(PAGE) {
                block[i] = 1;
            }
            std::hint::black_box(&block);
            std::thread::sleep(duration);
            drop(block);
            tracing::info!(megabytes, "Memory stress released");
        })
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to spawn memory stress thread");
            StressError::Spawn
        })?;

    tracing::info!(megabytes, duration = ?duration, "Memory stress started");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_bounds() {
        assert_eq!(parse_percent(Some("0")), Ok(0));
        assert_eq!(parse_percent(Some("100")), Ok(100));
        assert_eq!(parse_percent(Some("101")), Err(StressError::Percent));
        assert_eq!(parse_percent(Some("-1")), Err(StressError::Percent));
        assert_eq!(parse_percent(None), Err(StressError::Percent));
    }

    #[test]
    fn duration_must_be_whole_seconds() {
        assert_eq!(parse_duration(Some("3")), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration(Some("1.5")), Err(StressError::Duration));
    }

    #[test]
    fn memory_is_capped() {
        assert_eq!(parse_memory_mb(Some("64"), 128), Ok(64));
        assert_eq!(parse_memory_mb(Some("256"), 128), Err(StressError::Memory { max_mb: 128 }));
    }

    #[test]
    fn thread_count_scales_with_percent() {
        assert_eq!(cpu_threads(0, 8), 0);
        assert_eq!(cpu_threads(1, 8), 1);
        assert_eq!(cpu_threads(50, 8), 4);
        assert_eq!(cpu_threads(100, 8), 8);
    }

    #[test]
    fn zero_duration_starts_nothing() {
        assert_eq!(spawn_cpu_stress(50, Duration::ZERO), Ok(0));
        assert_eq!(spawn_memory_stress(1, Duration::ZERO), Ok(()));
    }
}
