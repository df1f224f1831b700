use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, WarningKind, Warnings};
use crate::layer::Multilayer;
use crate::medium::Medium;
use crate::options::RunOptions;
use crate::postprocess::Profile;

/// Linear interpolation with linear extrapolation beyond the sample range,
/// used for the time interpolants (`CF(t)`, `Cx(t)`).
fn lerp_extrapolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len();
    if n == 1 {
        return ys[0];
    }
    if x <= xs[0] {
        let t = (x - xs[0]) / (xs[1] - xs[0]);
        return ys[0] + t * (ys[1] - ys[0]);
    }
    if x >= xs[n - 1] {
        let t = (x - xs[n - 2]) / (xs[n - 1] - xs[n - 2]);
        return ys[n - 2] + t * (ys[n - 1] - ys[n - 2]);
    }
    let idx = xs.partition_point(|&v| v <= x).saturating_sub(1).min(n - 2);
    let t = (x - xs[idx]) / (xs[idx + 1] - xs[idx]);
    ys[idx] + t * (ys[idx + 1] - ys[idx])
}

/// Linear interpolation with endpoint clamping, used for spatial profile
/// re-interpolation (`ProfileMismatch`): extrapolating a concentration
/// profile past its measured support is not physically meaningful, so the
/// nearest endpoint value is held instead.
fn lerp_clamp(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len();
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }
    let idx = xs.partition_point(|&v| v <= x).saturating_sub(1).min(n - 2);
    let t = (x - xs[idx]) / (xs[idx + 1] - xs[idx]);
    ys[idx] + t * (ys[idx + 1] - ys[idx])
}

/// Re-sample `profile` onto `x_new`, clamping outside its support and
/// recording a warning when that clamp actually had to fire.
pub fn interp_profile_onto(profile: &Profile, x_new: &[f64], warnings: &mut Warnings) -> Vec<f64> {
    let lo = profile.x[0];
    let hi = profile.x[profile.x.len() - 1];
    if x_new.iter().any(|&x| x < lo || x > hi) {
        warnings.push(
            WarningKind::ProfileMismatch,
            "resumed profile spatial support does not cover the new mesh; clamping to endpoint values",
        );
    }
    x_new.iter().map(|&x| lerp_clamp(&profile.x, &profile.c, x)).collect()
}

/// Frozen inputs plus the terminal state of a run, enabling bit-consistent
/// continuation without holding a live reference to the run that produced
/// it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RestartSnapshot {
    pub multilayer: Multilayer,
    pub medium: Medium,
    pub options: RunOptions,
    pub t_target: f64,
    pub cf_target: f64,
    pub profile: Profile,
}

impl RestartSnapshot {
    pub fn freeze(
        multilayer: Multilayer,
        medium: Medium,
        options: RunOptions,
        t_target: f64,
        cf_target: f64,
        profile: Profile,
    ) -> Self {
        RestartSnapshot {
            multilayer,
            medium,
            options,
            t_target,
            cf_target,
            profile,
        }
    }
}

/// Overrides accepted by [`MigrationResult::resume`]; unset fields fall
/// back to the previous run's inputs, mirroring the reference
/// implementation's keyword-argument defaults.
#[derive(Clone, Debug, Default)]
pub struct ResumeOverrides {
    pub medium: Option<Medium>,
    pub cf0: Option<f64>,
    pub multilayer: Option<Multilayer>,
    pub rel_tol: Option<f64>,
    pub abs_tol: Option<f64>,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// The outcome of a single run: time series, the reconstructed profile
/// over time, target-time snapshots, and a restart snapshot for
/// continuation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationResult {
    pub name: String,
    pub description: String,

    /// Time \[s\], strictly increasing.
    pub t: Vec<f64>,
    pub cf: Vec<f64>,
    pub mean_concentration: Vec<f64>,
    pub flux: Vec<f64>,
    pub cumulative_flux: Vec<f64>,

    /// Fixed spatial support shared by every row of `cx` (3·N_tot points).
    pub x: Vec<f64>,
    /// Concentration profile over time, shape (t.len(), x.len()).
    #[serde(with = "array2_serde")]
    pub cx: Array2<f64>,

    pub t_target: f64,
    pub cf_target: f64,
    pub cx_target: Vec<f64>,

    pub c0eq: f64,
    pub warnings: Warnings,
    pub restart: RestartSnapshot,
}

mod array2_serde {
    use ndarray::Array2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(a: &Array2<f64>, s: S) -> Result<S::Ok, S::Error> {
        let (rows, cols) = a.dim();
        let flat: Vec<f64> = a.iter().copied().collect();
        (rows, cols, flat).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Array2<f64>, D::Error> {
        let (rows, cols, flat): (usize, usize, Vec<f64>) = Deserialize::deserialize(d)?;
        Array2::from_shape_vec((rows, cols), flat).map_err(serde::de::Error::custom)
    }
}

impl MigrationResult {
    /// Time interpolant: linear in t, extrapolated beyond the sample range.
    pub fn cf_at(&self, t_query: f64) -> f64 {
        lerp_extrapolate(&self.t, &self.cf, t_query)
    }

    /// Time interpolant over the whole profile: linear in t per spatial
    /// point, extrapolated beyond the sample range.
    pub fn cx_at(&self, t_query: f64) -> Vec<f64> {
        let n = self.t.len();
        if n == 1 {
            return self.cx.row(0).to_vec();
        }
        let (i0, i1, w) = if t_query <= self.t[0] {
            (0, 1, (t_query - self.t[0]) / (self.t[1] - self.t[0]))
        } else if t_query >= self.t[n - 1] {
            (
                n - 2,
                n - 1,
                (t_query - self.t[n - 2]) / (self.t[n - 1] - self.t[n - 2]),
            )
        } else {
            let idx = self.t.partition_point(|&v| v <= t_query).saturating_sub(1).min(n - 2);
            (idx, idx + 1, (t_query - self.t[idx]) / (self.t[idx + 1] - self.t[idx]))
        };
        self.cx
            .row(i0)
            .iter()
            .zip(self.cx.row(i1).iter())
            .map(|(&a, &b)| a + w * (b - a))
            .collect()
    }

    pub fn flux_at(&self, t_query: f64) -> f64 {
        lerp_extrapolate(&self.t, &self.flux, t_query)
    }

    pub fn cumulative_flux_at(&self, t_query: f64) -> f64 {
        lerp_extrapolate(&self.t, &self.cumulative_flux, t_query)
    }

    /// Resume this run: the new medium is the previous one with CF0 set to
    /// this run's CF★ (or any caller override), and the new mesh's initial
    /// cell concentrations come from interpolating Cx★ onto its centres.
    pub fn resume(&self, t_new: Option<f64>, overrides: ResumeOverrides) -> Result<MigrationResult, MigrationError> {
        let mut medium = overrides.medium.unwrap_or(self.restart.medium);
        medium.cf0 = overrides.cf0.unwrap_or(self.cf_target);

        let multilayer = overrides.multilayer.unwrap_or_else(|| self.restart.multilayer.clone());

        let mut options = self.restart.options.clone();
        options.prev_profile = Some(self.restart.profile.clone());
        options.t_end = t_new.or(options.t_end);
        if let Some(rel_tol) = overrides.rel_tol {
            options.rel_tol = rel_tol;
        }
        if let Some(abs_tol) = overrides.abs_tol {
            options.abs_tol = abs_tol;
        }
        if let Some(name) = overrides.name {
            options.name = name;
        }
        if let Some(description) = overrides.description {
            options.description = description;
        }

        crate::run(&multilayer, &medium, options)
    }

    /// Chain this run's terminal state into a fresh run against `new_medium`,
    /// keeping the same multilayer. `result >> medium` sugar calls this.
    pub fn contact(&self, new_medium: &Medium) -> Result<MigrationResult, MigrationError> {
        self.resume(
            None,
            ResumeOverrides {
                medium: Some(*new_medium),
                ..Default::default()
            },
        )
    }

    /// Concatenate two sequential runs: `self` runs first, `other` is
    /// shifted so it starts at `self.t_target`. `other`'s spatial profile is
    /// interpolated onto `self`'s grid when the grids differ.
    pub fn add(&self, other: &MigrationResult) -> Result<MigrationResult, MigrationError> {
        if self.x.is_empty() || other.x.is_empty() {
            return Err(MigrationError::CompositionError(
                "cannot add results with an empty spatial grid".into(),
            ));
        }

        let cut = self.t.partition_point(|&t| t <= self.t_target);
        let mut t: Vec<f64> = self.t[..cut].to_vec();
        let mut cf: Vec<f64> = self.cf[..cut].to_vec();
        let mut mean_concentration: Vec<f64> = self.mean_concentration[..cut].to_vec();
        let mut flux: Vec<f64> = self.flux[..cut].to_vec();
        let mut cumulative_flux: Vec<f64> = self.cumulative_flux[..cut].to_vec();

        let fc_offset = cumulative_flux.last().copied().unwrap_or(0.0);

        let same_grid = self.x.len() == other.x.len()
            && self.x.iter().zip(&other.x).all(|(a, b)| (a - b).abs() < 1e-9);

        let mut cx_rows: Vec<Vec<f64>> = self.cx.outer_iter().take(cut).map(|r| r.to_vec()).collect();

        for (row_idx, ot) in other.t.iter().enumerate() {
            t.push(ot + self.t_target);
            cf.push(other.cf[row_idx]);
            mean_concentration.push(other.mean_concentration[row_idx]);
            flux.push(other.flux[row_idx]);
            cumulative_flux.push(other.cumulative_flux[row_idx] + fc_offset);

            let other_row = other.cx.row(row_idx);
            if same_grid {
                cx_rows.push(other_row.to_vec());
            } else {
                let profile = Profile {
                    x: other.x.clone(),
                    c: other_row.to_vec(),
                };
                let mut scratch = Warnings::new();
                cx_rows.push(interp_profile_onto(&profile, &self.x, &mut scratch));
            }
        }

        let n_rows = cx_rows.len();
        let n_cols = self.x.len();
        let flat: Vec<f64> = cx_rows.into_iter().flatten().collect();
        let cx = Array2::from_shape_vec((n_rows, n_cols), flat)
            .map_err(|e| MigrationError::CompositionError(e.to_string()))?;

        let cx_target = if same_grid {
            other.cx_target.clone()
        } else {
            let profile = Profile {
                x: other.x.clone(),
                c: other.cx_target.clone(),
            };
            let mut scratch = Warnings::new();
            interp_profile_onto(&profile, &self.x, &mut scratch)
        };

        let mut warnings = self.warnings.clone();
        warnings.extend(other.warnings.clone());

        Ok(MigrationResult {
            name: other.name.clone(),
            description: other.description.clone(),
            t,
            cf,
            mean_concentration,
            flux,
            cumulative_flux,
            x: self.x.clone(),
            cx,
            t_target: self.t_target + other.t_target,
            cf_target: other.cf_target,
            cx_target,
            c0eq: other.c0eq,
            warnings,
            restart: RestartSnapshot {
                t_target: self.t_target + other.t_target,
                ..other.restart.clone()
            },
        })
    }
}

impl std::ops::Add<&MigrationResult> for &MigrationResult {
    type Output = Result<MigrationResult, MigrationError>;
    fn add(self, rhs: &MigrationResult) -> Self::Output {
        MigrationResult::add(self, rhs)
    }
}

impl std::ops::Shr<&Medium> for &MigrationResult {
    type Output = Result<MigrationResult, MigrationError>;
    fn shr(self, medium: &Medium) -> Self::Output {
        self.contact(medium)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_extrapolate_is_identity_inside_range() {
        let xs = vec![0.0, 1.0, 2.0];
        let ys = vec![0.0, 10.0, 20.0];
        assert_eq!(lerp_extrapolate(&xs, &ys, 0.5), 5.0);
    }

    #[test]
    fn lerp_extrapolate_continues_the_edge_slope() {
        let xs = vec![0.0, 1.0];
        let ys = vec![0.0, 10.0];
        assert_eq!(lerp_extrapolate(&xs, &ys, 2.0), 20.0);
    }

    #[test]
    fn lerp_clamp_holds_endpoint_values() {
        let xs = vec![0.0, 1.0];
        let ys = vec![3.0, 7.0];
        assert_eq!(lerp_clamp(&xs, &ys, -5.0), 3.0);
        assert_eq!(lerp_clamp(&xs, &ys, 5.0), 7.0);
    }
}
