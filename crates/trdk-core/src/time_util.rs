//! Microsecond clocks.
//!
//! Order events are stamped with [`now_us`] (wall clock) when their read
//! pass starts. Processing time is measured with [`monotonic_us`], which
//! never jumps with NTP adjustments. On Linux both read `clock_gettime`
//! directly; elsewhere they fall back to `SystemTime` and `Instant`.

const US_PER_SEC: u64 = 1_000_000;
const NS_PER_US: u64 = 1_000;

#[cfg(target_os = "linux")]
#[inline]
fn read_clock_us(clock: libc::clockid_t) -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `ts` is a valid out-pointer and both clock ids exist on Linux.
    // On failure `ts` stays zeroed.
    unsafe {
        libc::clock_gettime(clock, &mut ts);
    }
    ts.tv_sec as u64 * US_PER_SEC + ts.tv_nsec as u64 / NS_PER_US
}

/// Wall-clock time in microseconds since the Unix epoch.
#[cfg(target_os = "linux")]
#[inline]
pub fn now_us() -> u64 {
    read_clock_us(libc::CLOCK_REALTIME)
}

/// Monotonic time in microseconds from an arbitrary origin.
#[cfg(target_os = "linux")]
#[inline]
pub fn monotonic_us() -> u64 {
    read_clock_us(libc::CLOCK_MONOTONIC_RAW)
}

#[cfg(not(target_os = "linux"))]
pub fn now_us() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    since_epoch.as_secs() * US_PER_SEC + u64::from(since_epoch.subsec_nanos()) / NS_PER_US
}

#[cfg(not(target_os = "linux"))]
pub fn monotonic_us() -> u64 {
    use std::{sync::LazyLock, time::Instant};
    static ORIGIN: LazyLock<Instant> = LazyLock::new(Instant::now);
    ORIGIN.elapsed().as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_never_goes_back() {
        let mut last = monotonic_us();
        for _ in 0..1_000 {
            let now = monotonic_us();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn wall_clock_is_in_microseconds() {
        // 2020-01-01T00:00:00Z and 2100-01-01T00:00:00Z.
        let now = now_us();
        assert!(now > 1_577_836_800_000_000);
        assert!(now < 4_102_444_800_000_000);
    }
}
