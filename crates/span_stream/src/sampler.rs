//! Sampling decisions for new traces.

use rand::Rng;

/// Decides whether a new trace is recorded for export.
///
/// Only trace roots consult the sampler; child spans inherit the decision of
/// their parent so that a trace is exported whole or not at all.
pub trait Sampler: Send + Sync {
    fn is_sampled(&self) -> bool;
}

/// Samples every trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSampler;

impl Sampler for AlwaysSampler {
    fn is_sampled(&self) -> bool {
        true
    }
}

/// Samples nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverSampler;

impl Sampler for NeverSampler {
    fn is_sampled(&self) -> bool {
        false
    }
}

/// Samples a fixed fraction of traces.
#[derive(Debug, Clone, Copy)]
pub struct PercentageSampler {
    percentage: f64,
}

impl PercentageSampler {
    /// `percentage` is clamped into `0.0..=1.0`.
    pub fn new(percentage: f64) -> Self {
        let percentage = if percentage.is_nan() { 0.0 } else { percentage.clamp(0.0, 1.0) };
        Self { percentage }
    }

    pub fn percentage(&self) -> f64 {
        self.percentage
    }
}

impl Sampler for PercentageSampler {
    fn is_sampled(&self) -> bool {
        if self.percentage >= 1.0 {
            return true;
        }
        if self.percentage <= 0.0 {
            return false;
        }
        rand::thread_rng().gen::<f64>() < self.percentage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_samplers() {
        assert!(AlwaysSampler.is_sampled());
        assert!(!NeverSampler.is_sampled());
    }

    #[test]
    fn test_percentage_bounds() {
        assert!((0..100).all(|_| PercentageSampler::new(1.0).is_sampled()));
        assert!((0..100).all(|_| !PercentageSampler::new(0.0).is_sampled()));
        assert_eq!(PercentageSampler::new(7.0).percentage(), 1.0);
        assert_eq!(PercentageSampler::new(-1.0).percentage(), 0.0);
        assert_eq!(PercentageSampler::new(f64::NAN).percentage(), 0.0);
    }

    #[test]
    fn test_percentage_is_roughly_respected() {
        let sampler = PercentageSampler::new(0.5);
        let sampled = (0..10_000).filter(|_| sampler.is_sampled()).count();
        assert!((4_000..6_000).contains(&sampled), "sampled {}", sampled);
    }
}
