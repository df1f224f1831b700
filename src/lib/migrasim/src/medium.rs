use serde::{Deserialize, Serialize};

use crate::error::MigrationError;

/// The food/storage side the multilayer is in contact with.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Medium {
    /// Food volume [m³], > 0 (use 1.0 when irrelevant, e.g. pure setoff runs)
    pub volume: f64,
    /// Contact area [m²], ≥ 0
    pub area: f64,
    /// Convective mass-transfer coefficient on the food side [m/s], ≥ 0.
    /// `None` selects the fully periodic (setoff) boundary mode instead of
    /// a food reservoir; `Some(0.0)` is a food side that is impervious but
    /// still a distinct node (CF stays at CF0, flux stays at 0).
    pub h: Option<f64>,
    /// Food-side Henry-like coefficient [dimensionless], > 0
    pub k0: f64,
    /// Initial food concentration [same unit as layer C0], ≥ 0
    pub cf0: f64,
    /// Target contact time t★ [s], > 0
    pub contact_time: f64,
    /// Contact temperature [K]
    pub temperature: f64,
}

impl Medium {
    pub fn new(volume: f64, area: f64, h: Option<f64>, k0: f64, cf0: f64, contact_time: f64, temperature: f64) -> Self {
        Medium {
            volume,
            area,
            h,
            k0,
            cf0,
            contact_time,
            temperature,
        }
    }

    /// True when this medium selects the fully periodic (setoff) boundary.
    pub fn is_pbc(&self) -> bool {
        self.h.is_none()
    }

    pub(crate) fn validate(&self) -> Result<(), MigrationError> {
        if !(self.volume > 0.0 && self.volume.is_finite()) {
            return Err(MigrationError::InvalidInput(format!(
                "medium volume V must be positive and finite, got {}",
                self.volume
            )));
        }
        if !(self.area >= 0.0 && self.area.is_finite()) {
            return Err(MigrationError::InvalidInput(format!(
                "medium area A must be non-negative and finite, got {}",
                self.area
            )));
        }
        if let Some(h) = self.h {
            if !(h >= 0.0 && h.is_finite()) {
                return Err(MigrationError::InvalidInput(format!(
                    "medium mass-transfer coefficient h must be non-negative and finite, got {h}"
                )));
            }
        }
        if !(self.k0 > 0.0 && self.k0.is_finite()) {
            return Err(MigrationError::InvalidInput(format!(
                "medium Henry coefficient K0 must be positive and finite, got {}",
                self.k0
            )));
        }
        if !(self.cf0 >= 0.0 && self.cf0.is_finite()) {
            return Err(MigrationError::InvalidInput(format!(
                "medium initial concentration CF0 must be non-negative and finite, got {}",
                self.cf0
            )));
        }
        if !(self.contact_time > 0.0 && self.contact_time.is_finite()) {
            return Err(MigrationError::InvalidInput(format!(
                "medium contact time t* must be positive and finite, got {}",
                self.contact_time
            )));
        }
        Ok(())
    }
}
