//! Robust loss functions for outlier-aware optimization
//!
//! Both kernels saturate at the noise bound `c`, so residuals far beyond it
//! stop influencing the estimate. Each kernel also carries the surrogate
//! family used by Graduated Non-Convexity (GNC): a control parameter `mu`
//! starts where the surrogate is convex and is stepped towards the original
//! non-convex loss.
//!
//! Based on "Graduated Non-Convexity for Robust Spatial Perception" by Yang et al.

use serde::{Deserialize, Serialize};

/// Robust loss functions for optimization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RobustLoss {
    /// Geman-McClure: ρ(r) = (c² * r²) / (c² + r²)
    GemanMcClure { c: f64 },
    /// Truncated Least Squares (TLS): ρ(r) = { r² if r < c, c² otherwise }
    TruncatedLeastSquares { c: f64 },
}

impl RobustLoss {
    /// Evaluate the loss function ρ(r)
    pub fn evaluate(&self, residual: f64) -> f64 {
        let r = residual.abs();
        match self {
            RobustLoss::GemanMcClure { c } => {
                let c2 = c * c;
                (c2 * r * r) / (c2 + r * r)
            }
            RobustLoss::TruncatedLeastSquares { c } => {
                if r < *c {
                    r * r
                } else {
                    c * c
                }
            }
        }
    }

    /// Get the noise bound of the loss
    pub fn get_param(&self) -> f64 {
        match self {
            RobustLoss::GemanMcClure { c } => *c,
            RobustLoss::TruncatedLeastSquares { c } => *c,
        }
    }

    /// Initial GNC control parameter given the largest squared residual of
    /// the first (unweighted) solve.
    ///
    /// Returns `None` when every residual already lies inside the noise
    /// bound, in which case the unweighted solution is final.
    pub fn gnc_initial_control(&self, max_residual_sq: f64) -> Option<f64> {
        let c2 = self.bound_sq();
        match self {
            RobustLoss::TruncatedLeastSquares { .. } => {
                let mu = 1.0 / (2.0 * max_residual_sq / c2 - 1.0);
                (mu > 0.0).then_some(mu)
            }
            RobustLoss::GemanMcClure { .. } => {
                let mu = 2.0 * max_residual_sq / c2;
                (mu > 1.0).then_some(mu)
            }
        }
    }

    /// Advance the control parameter one GNC step.
    ///
    /// TLS surrogates become less convex as `mu` grows, Geman-McClure
    /// surrogates as `mu` shrinks towards 1.
    pub fn gnc_step(&self, control: f64, factor: f64) -> f64 {
        match self {
            RobustLoss::TruncatedLeastSquares { .. } => control * factor,
            RobustLoss::GemanMcClure { .. } => (control / factor).max(1.0),
        }
    }

    /// Whether the surrogate at `control` coincides with the original loss.
    pub fn gnc_finished(&self, control: f64) -> bool {
        match self {
            RobustLoss::TruncatedLeastSquares { .. } => false,
            RobustLoss::GemanMcClure { .. } => control <= 1.0,
        }
    }

    /// Closed-form weight of the GNC surrogate for one squared residual.
    pub fn gnc_weight(&self, residual_sq: f64, control: f64) -> f64 {
        let c2 = self.bound_sq();
        let mu = control;
        match self {
            RobustLoss::TruncatedLeastSquares { .. } => {
                let upper = (mu + 1.0) / mu * c2;
                let lower = mu / (mu + 1.0) * c2;
                if residual_sq >= upper {
                    0.0
                } else if residual_sq <= lower {
                    1.0
                } else {
                    (c2 * mu * (mu + 1.0) / residual_sq).sqrt() - mu
                }
            }
            RobustLoss::GemanMcClure { .. } => {
                let scaled = mu * c2;
                let w = scaled / (residual_sq + scaled);
                w * w
            }
        }
    }

    /// Surrogate cost contributed by one squared residual at its weight.
    pub fn gnc_cost(&self, residual_sq: f64, weight: f64, control: f64) -> f64 {
        match self {
            RobustLoss::TruncatedLeastSquares { .. } => weight * residual_sq,
            RobustLoss::GemanMcClure { .. } => {
                let penalty = weight.sqrt() - 1.0;
                weight * residual_sq + control * self.bound_sq() * penalty * penalty
            }
        }
    }

    fn bound_sq(&self) -> f64 {
        let c = self.get_param();
        (c * c).max(1e-16)
    }
}
