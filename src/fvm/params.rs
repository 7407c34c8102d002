//! Tuning constants shared by every cell of a neighbor graph and by the
//! radius pass on the finished tree.

use crate::error::{GreedyError, Result};

/// The four constants of Clarkson's algorithm on greedy tree nodes.
///
/// - `move_const` decides when a node may move to a new cell.
/// - `nbr_const` decides when a node may stay and how far apart neighbors are.
/// - `tidy_const` bounds how loose a cell's out-radius may be.
/// - `bucket_size` selects the bucket queue when above 1, the exact heap otherwise.
///
/// With every constant at 1 (the default) the output is an exact greedy
/// permutation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TreeParameters {
    pub move_const: f64,
    pub nbr_const: f64,
    pub tidy_const: f64,
    pub bucket_size: f64,
}

impl Default for TreeParameters {
    fn default() -> Self {
        TreeParameters {
            move_const: 1.0,
            nbr_const: 1.0,
            tidy_const: 1.0,
            bucket_size: 1.0,
        }
    }
}

/// `(move, nbr, tidy, bucket_size)`
impl From<(f64, f64, f64, f64)> for TreeParameters {
    fn from((move_const, nbr_const, tidy_const, bucket_size): (f64, f64, f64, f64)) -> Self {
        TreeParameters {
            move_const,
            nbr_const,
            tidy_const,
            bucket_size,
        }
    }
}

impl TreeParameters {
    pub fn with_move(mut self, move_const: f64) -> Self {
        self.move_const = move_const;
        self
    }

    pub fn with_nbr(mut self, nbr_const: f64) -> Self {
        self.nbr_const = nbr_const;
        self
    }

    pub fn with_tidy(mut self, tidy_const: f64) -> Self {
        self.tidy_const = tidy_const;
        self
    }

    pub fn with_bucket_size(mut self, bucket_size: f64) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    /// Checks `1 <= tidy <= move <= nbr` and `bucket_size > 0`.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| GreedyError::InvalidConstants {
            tidy: self.tidy_const,
            move_const: self.move_const,
            nbr: self.nbr_const,
            reason: reason.to_string(),
        };

        let all = [self.move_const, self.nbr_const, self.tidy_const, self.bucket_size];
        if all.iter().any(|c| !c.is_finite()) {
            return Err(invalid("constants must be finite"));
        }
        if self.nbr_const < self.move_const {
            return Err(invalid("the move constant must not be larger than the neighbor constant"));
        }
        if self.move_const < self.tidy_const {
            return Err(invalid("the tidy constant must not be larger than the move constant"));
        }
        if self.tidy_const < 1.0 {
            return Err(GreedyError::MissingTidyParameter(self.tidy_const));
        }
        if self.bucket_size <= 0.0 {
            return Err(invalid("the bucket size must be positive"));
        }
        Ok(())
    }

    pub fn uses_bucket_queue(&self) -> bool {
        self.bucket_size > 1.0
    }

    /// `move / (tidy * bucket_size)`
    pub fn scale(&self) -> f64 {
        self.move_const / (self.tidy_const * self.bucket_size)
    }

    /// `nbr * tidy * bucket_size`
    pub fn greedy_param(&self) -> f64 {
        self.nbr_const * self.tidy_const * self.bucket_size
    }

    pub fn radius_scale(&self) -> RadiusScale {
        RadiusScale {
            scale: self.scale(),
            greedy_param: self.greedy_param(),
        }
    }
}

/// Parameters of the approximate radius formula, shared by all nodes of one tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusScale {
    pub scale: f64,
    pub greedy_param: f64,
}

impl RadiusScale {
    /// Approximate radii are only defined for `scale > 1`.
    pub fn is_approximate(&self) -> bool {
        self.scale > 1.0
    }

    /// `scale * gp / (scale - 1)`, the factor applied to the distance between
    /// a node's center and its right child's center.
    pub fn bound_factor(&self) -> Result<f64> {
        if !self.is_approximate() || !self.greedy_param.is_finite() {
            return Err(GreedyError::MissingScaleParameters {
                scale: self.scale,
                greedy_param: self.greedy_param,
            });
        }
        Ok(self.scale * self.greedy_param / (self.scale - 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid_and_exact() {
        let params = TreeParameters::default();
        assert!(params.validate().is_ok());
        assert!(!params.uses_bucket_queue());
        assert!(!params.radius_scale().is_approximate());
    }

    #[test]
    fn test_move_above_nbr_is_rejected() {
        let params = TreeParameters::default().with_move(2.0).with_nbr(1.0);
        assert!(matches!(params.validate(), Err(GreedyError::InvalidConstants { .. })));
    }

    #[test]
    fn test_tidy_above_move_is_rejected() {
        let params = TreeParameters::from((1.5, 2.0, 1.8, 1.0));
        assert!(matches!(params.validate(), Err(GreedyError::InvalidConstants { .. })));
    }

    #[test]
    fn test_tidy_below_one_is_rejected() {
        let params = TreeParameters::default().with_tidy(0.5);
        assert_eq!(params.validate(), Err(GreedyError::MissingTidyParameter(0.5)));
    }

    #[test]
    fn test_scale_and_greedy_param() {
        let params = TreeParameters::from((4.0, 6.0, 1.0, 2.0));
        assert!(params.validate().is_ok());
        assert!((params.scale() - 2.0).abs() < 1e-12);
        assert!((params.greedy_param() - 12.0).abs() < 1e-12);
        let factor = params.radius_scale().bound_factor().unwrap();
        assert!((factor - 24.0).abs() < 1e-12);
    }

    #[test]
    fn test_bound_factor_needs_scale_above_one() {
        let scale = TreeParameters::default().radius_scale();
        assert!(matches!(
            scale.bound_factor(),
            Err(GreedyError::MissingScaleParameters { .. })
        ));
    }
}
