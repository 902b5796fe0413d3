//! Latency window for read-pass processing time.
//!
//! The reader task of each connection records how long one pass took, from
//! the moment bytes arrived until every decoded event was applied and the
//! books were flushed. At the configured print interval the window is taken:
//! its summary is returned and recording starts over.
//!
//! Samples land in a log-linear histogram: values below 32µs are exact, larger
//! ones fall into 16 buckets per power of two, so any reported percentile is
//! within 1/16 of the true sample.

/// Values below this are stored exactly.
const LINEAR_LIMIT: u64 = 32;
/// Buckets per power of two above [`LINEAR_LIMIT`].
const SUB_BUCKETS: u64 = 16;
const SUB_BITS: u32 = SUB_BUCKETS.trailing_zeros();
/// Index of the first bit above the linear range.
const FIRST_LOG_BIT: u32 = LINEAR_LIMIT.trailing_zeros();
const BUCKETS: usize = (LINEAR_LIMIT + (64 - FIRST_LOG_BIT as u64) * SUB_BUCKETS) as usize;

fn bucket_of(us: u64) -> usize {
    if us < LINEAR_LIMIT {
        return us as usize;
    }
    let msb = 63 - us.leading_zeros();
    let mantissa = us >> (msb - SUB_BITS);
    (LINEAR_LIMIT + (msb - FIRST_LOG_BIT) as u64 * SUB_BUCKETS + (mantissa - SUB_BUCKETS)) as usize
}

/// Smallest value that falls into `bucket`.
fn bucket_floor(bucket: usize) -> u64 {
    let bucket = bucket as u64;
    if bucket < LINEAR_LIMIT {
        return bucket;
    }
    let k = bucket - LINEAR_LIMIT;
    let msb = (k / SUB_BUCKETS) as u32 + FIRST_LOG_BIT;
    (k % SUB_BUCKETS + SUB_BUCKETS) << (msb - SUB_BITS)
}

/// Summary of one latency window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub samples: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
}

impl std::fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n={} min={}µs p50={}µs p90={}µs p99={}µs max={}µs mean={:.1}µs",
            self.samples, self.min_us, self.p50_us, self.p90_us, self.p99_us, self.max_us, self.mean_us,
        )
    }
}

/// Not thread-safe — owned by a single reader task.
#[derive(Debug)]
pub struct LatencyWindow {
    buckets: Box<[u64]>,
    samples: u64,
    total_us: u128,
    min_us: u64,
    max_us: u64,
}

impl LatencyWindow {
    pub fn new() -> Self {
        Self {
            buckets: vec![0; BUCKETS].into_boxed_slice(),
            samples: 0,
            total_us: 0,
            min_us: u64::MAX,
            max_us: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, us: u64) {
        self.buckets[bucket_of(us)] += 1;
        self.samples += 1;
        self.total_us += u128::from(us);
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Summarize the window. `None` if nothing was recorded.
    pub fn summary(&self) -> Option<LatencySummary> {
        if self.samples == 0 {
            return None;
        }
        let [p50_us, p90_us, p99_us] = self.quantiles([0.50, 0.90, 0.99]);
        Some(LatencySummary {
            samples: self.samples,
            min_us: self.min_us,
            max_us: self.max_us,
            mean_us: self.total_us as f64 / self.samples as f64,
            p50_us,
            p90_us,
            p99_us,
        })
    }

    /// Summarize the window and start a new one.
    pub fn take(&mut self) -> Option<LatencySummary> {
        let summary = self.summary();
        self.buckets.fill(0);
        self.samples = 0;
        self.total_us = 0;
        self.min_us = u64::MAX;
        self.max_us = 0;
        summary
    }

    /// Quantiles in ascending order, computed in a single bucket walk.
    fn quantiles<const N: usize>(&self, qs: [f64; N]) -> [u64; N] {
        let mut out = [self.max_us; N];
        let mut next = 0;
        let mut seen = 0u64;
        for (bucket, &count) in self.buckets.iter().enumerate() {
            if count == 0 {
                continue;
            }
            seen += count;
            while next < N && seen as f64 >= (self.samples as f64 * qs[next]).ceil() {
                out[next] = bucket_floor(bucket).clamp(self.min_us, self.max_us);
                next += 1;
            }
            if next == N {
                break;
            }
        }
        out
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new()
    }
}
