//! One-dimensional mass-transfer simulator for chemical migration from
//! multilayer packaging into a contacting food (or gas/storage) medium.
//!
//! The entry point is [`run`]: given a [`Multilayer`], a [`Medium`], and
//! [`RunOptions`], it meshes, assembles the sparse transition operator,
//! integrates the resulting stiff ODE, and post-processes the trajectory
//! into a [`MigrationResult`].

pub mod assemble;
pub mod conductance;
pub mod error;
pub mod integrate;
pub mod layer;
pub mod medium;
pub mod mesh;
pub mod options;
pub mod postprocess;
pub mod result;

use nalgebra::DVector;
use ndarray::Array2;

pub use error::{MigrationError, Warning, WarningKind, Warnings};
pub use layer::{Layer, Multilayer};
pub use medium::Medium;
pub use mesh::Mesh;
pub use options::{RunOptions, TimeScale};
pub use postprocess::Profile;
pub use result::{MigrationResult, ResumeOverrides, RestartSnapshot};

/// Run one simulation: mesh, assemble, integrate, post-process.
///
/// A run is a pure function of its three arguments; it holds no state of
/// its own once it returns.
pub fn run(multilayer: &Multilayer, medium: &Medium, options: RunOptions) -> Result<MigrationResult, MigrationError> {
    medium.validate()?;

    let mut warnings = Warnings::new();

    let mesh = Mesh::build(multilayer, options.n_cells, options.n_cells_min)?;
    let scaling = postprocess::compute_scaling(multilayer, medium);
    let (d_norm, k_norm) = postprocess::per_cell_d_k_norm(&mesh, multilayer, &scaling, medium);
    let cond = conductance::build(&mesh, medium, &d_norm, &k_norm, scaling.biot);
    let delta: Vec<f64> = mesh.dw.iter().zip(&mesh.de).map(|(w, e)| w + e).collect();

    let pbc = medium.is_pbc();
    let n = mesh.n_total();

    let y0 = initial_condition(&mesh, multilayer, medium, &options, &scaling, pbc, n, &mut warnings);

    let a = if pbc {
        assemble::build_pbc(&mesh, &cond, &k_norm, &delta)
    } else {
        assemble::build_non_pbc(&mesh, &cond, &k_norm, &delta, scaling.l_load)
    };

    let t_end = options.t_end.unwrap_or(2.0 * medium.contact_time);
    let t_eval_s = if options.autotime {
        auto_time_grid(t_end, medium.contact_time, options.n_out, options.timescale)
    } else {
        let mut grid = options
            .t_eval
            .clone()
            .ok_or_else(|| MigrationError::InvalidInput("t_eval must be supplied when autotime is false".into()))?;
        normalize_time_grid(&mut grid, medium.contact_time, &mut warnings);
        grid
    };
    let tau_eval: Vec<f64> = t_eval_s.iter().map(|&t| t / scaling.tau_scale).collect();

    let integration = integrate::integrate(&a, &y0, &tau_eval, options.rel_tol, options.abs_tol, options.max_steps)?;

    let mut t = Vec::with_capacity(integration.tau.len());
    let mut cf = Vec::with_capacity(integration.tau.len());
    let mut mean_concentration = Vec::with_capacity(integration.tau.len());
    let mut flux = Vec::with_capacity(integration.tau.len());
    let mut x_shared: Vec<f64> = Vec::new();
    let mut cx_rows: Vec<Vec<f64>> = Vec::with_capacity(integration.tau.len());

    for (k, &tau) in integration.tau.iter().enumerate() {
        let y = &integration.y[k];
        t.push(tau * scaling.tau_scale);

        let profile = if pbc {
            postprocess::reconstruct_pbc(y, &mesh, &cond, &d_norm, &k_norm, scaling.c0eq, 0.0)
        } else {
            postprocess::reconstruct_non_pbc(y, &mesh, &cond, &d_norm, &k_norm, scaling.c0eq, 0.0)
        };

        if pbc {
            cf.push(medium.cf0);
            flux.push(0.0);
        } else {
            cf.push(y[0] * scaling.c0eq);
            flux.push(postprocess::flux_non_pbc(y[0], y[1], cond.hw[0], scaling.c0eq));
        }
        mean_concentration.push(postprocess::spatial_integral(&profile));
        if x_shared.is_empty() {
            x_shared = profile.x.clone();
        }
        cx_rows.push(profile.c);
    }

    let cumulative_flux = postprocess::cumulative_trapezoid(&t, &flux);

    let n_rows = cx_rows.len();
    let n_cols = x_shared.len();
    let flat: Vec<f64> = cx_rows.into_iter().flatten().collect();
    let cx = Array2::from_shape_vec((n_rows, n_cols), flat).expect("every profile row has the same length");

    let tau_target = medium.contact_time / scaling.tau_scale;
    let y_target = interpolate_state(&integration.tau, &integration.y, tau_target);
    let target_exact = if pbc {
        postprocess::reconstruct_pbc(&y_target, &mesh, &cond, &d_norm, &k_norm, scaling.c0eq, 0.0)
    } else {
        postprocess::reconstruct_non_pbc(&y_target, &mesh, &cond, &d_norm, &k_norm, scaling.c0eq, 0.0)
    };
    let target_interp = if pbc {
        postprocess::reconstruct_pbc(&y_target, &mesh, &cond, &d_norm, &k_norm, scaling.c0eq, 1e-4)
    } else {
        postprocess::reconstruct_non_pbc(&y_target, &mesh, &cond, &d_norm, &k_norm, scaling.c0eq, 1e-4)
    };
    let cf_target = if pbc { medium.cf0 } else { y_target[0] * scaling.c0eq };

    Ok(MigrationResult {
        name: options.name.clone(),
        description: options.description.clone(),
        t,
        cf,
        mean_concentration,
        flux,
        cumulative_flux,
        x: x_shared,
        cx,
        t_target: medium.contact_time,
        cf_target,
        cx_target: target_exact.c,
        c0eq: scaling.c0eq,
        warnings,
        restart: RestartSnapshot::freeze(
            multilayer.clone(),
            *medium,
            options,
            medium.contact_time,
            cf_target,
            target_interp,
        ),
    })
}

fn initial_condition(
    mesh: &Mesh,
    multilayer: &Multilayer,
    medium: &Medium,
    options: &RunOptions,
    scaling: &postprocess::Scaling,
    pbc: bool,
    n: usize,
    warnings: &mut Warnings,
) -> DVector<f64> {
    let mut y0 = DVector::<f64>::zeros(if pbc { n } else { n + 1 });

    let cell_concentrations: Vec<f64> = if let Some(prev) = &options.prev_profile {
        result::interp_profile_onto(prev, &mesh.x_centre, warnings)
    } else {
        mesh.layer_index.iter().map(|&li| multilayer.layers()[li].c0).collect()
    };

    for (i, &c) in cell_concentrations.iter().enumerate() {
        let idx = if pbc { i } else { i + 1 };
        y0[idx] = c / scaling.c0eq;
    }
    if !pbc {
        y0[0] = medium.cf0 / scaling.c0eq;
    }
    y0
}

/// Interpolate a sequence of state vectors (linear in τ) at `tau_q`.
fn interpolate_state(tau: &[f64], ys: &[DVector<f64>], tau_q: f64) -> DVector<f64> {
    let n = tau.len();
    if n == 1 {
        return ys[0].clone();
    }
    let (i0, i1, w) = if tau_q <= tau[0] {
        (0, 1, 0.0)
    } else if tau_q >= tau[n - 1] {
        (n - 2, n - 1, 1.0)
    } else {
        let idx = tau.partition_point(|&v| v <= tau_q).saturating_sub(1).min(n - 2);
        (idx, idx + 1, (tau_q - tau[idx]) / (tau[idx + 1] - tau[idx]))
    };
    &ys[i0] * (1.0 - w) + &ys[i1] * w
}

/// Auto-generated evaluation grid: either uniform in τ or uniform in √τ
/// (the default, since early transients are sharp).
fn auto_time_grid(t_end: f64, t_star: f64, n_out: usize, timescale: TimeScale) -> Vec<f64> {
    let n = n_out.max(2);
    let mut grid = match timescale {
        TimeScale::Linear => (0..n).map(|i| t_end * i as f64 / (n - 1) as f64).collect::<Vec<_>>(),
        TimeScale::Sqrt => {
            let t_min = t_end * 1e-9;
            let s_min = t_min.sqrt();
            let s_max = t_end.sqrt();
            let mut g: Vec<f64> = (0..n)
                .map(|i| {
                    let s = s_min + (s_max - s_min) * i as f64 / (n - 1) as f64;
                    s * s
                })
                .collect();
            g[0] = 0.0;
            g
        }
    };
    let mut ignored = Warnings::new();
    extend_to_reach_target(&mut grid, t_star, &mut ignored);
    grid
}

/// Normalize a caller-supplied time grid: sort, dedupe, prepend 0 if
/// missing, and make sure it reaches `t_star` plus a little padding past
/// it, warning if anything had to change.
fn normalize_time_grid(grid: &mut Vec<f64>, t_star: f64, warnings: &mut Warnings) {
    let was_sorted = grid.windows(2).all(|w| w[0] < w[1]);
    let had_zero = grid.first() == Some(&0.0);
    if !was_sorted || !had_zero {
        warnings.push(
            WarningKind::InconsistentGrid,
            "user time grid was not monotonically increasing from 0; normalized",
        );
    }
    if !grid.contains(&0.0) {
        grid.push(0.0);
    }
    extend_to_reach_target(grid, t_star, warnings);
}

fn extend_to_reach_target(grid: &mut Vec<f64>, t_star: f64, warnings: &mut Warnings) {
    let reaches_target = grid.iter().any(|&t| (t - t_star).abs() < 1e-9 * t_star.max(1.0));
    if !reaches_target {
        warnings.push(
            WarningKind::InconsistentGrid,
            "user time grid did not include the target contact time; t* and padding inserted",
        );
    }
    grid.push(t_star);
    grid.push(1.05 * t_star);
    grid.push(1.1 * t_star);
    grid.push(1.2 * t_star);
    grid.sort_by(|a, b| a.partial_cmp(b).expect("time values are never NaN"));
    grid.dedup_by(|a, b| (*a - *b).abs() < 1e-9 * t_star.max(1.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_layer_ldpe() -> (Multilayer, Medium) {
        let ml = Multilayer::new(vec![
            Layer::new(100e-6, 1e-14, 1.0, 1000.0, 298.15),
            Layer::new(100e-6, 1e-14, 1.0, 0.0, 298.15),
        ])
        .unwrap();
        let medium = Medium::new(1e-3, 0.06, Some(1e-3), 1.0, 0.0, 10.0 * 86400.0, 298.15);
        (ml, medium)
    }

    #[test]
    fn food_concentration_rises_but_stays_below_equilibrium() {
        let (ml, medium) = two_layer_ldpe();
        let mut opts = RunOptions::default();
        opts.n_cells = 120;
        let result = run(&ml, &medium, opts).unwrap();
        assert!(result.cf_target > 0.0);

        let c0_total: f64 = ml.layers().iter().map(|l| l.c0 * l.l).sum();
        let l_sum: f64 = ml.thickness();
        let equilibrium_upper_bound = c0_total / l_sum * ml.thickness() * medium.area / medium.volume + medium.cf0;
        assert!(result.cf_target <= equilibrium_upper_bound + 1.0);
    }

    #[test]
    fn mean_packaging_concentration_decreases_monotonically() {
        let (ml, medium) = two_layer_ldpe();
        let mut opts = RunOptions::default();
        opts.n_cells = 120;
        let result = run(&ml, &medium, opts).unwrap();
        for w in result.mean_concentration.windows(2) {
            assert!(w[1] <= w[0] + 1e-6 * w[0].abs().max(1.0));
        }
    }

    #[test]
    fn pbc_food_concentration_is_constant() {
        let ml = Multilayer::new(vec![
            Layer::new(500e-6, 1e-14, 1.0, 0.0, 298.15),
            Layer::new(300e-6, 1e-14, 1.0, 5000.0, 298.15),
        ])
        .unwrap();
        let medium = Medium::new(1.0, 0.0, None, 1.0, 1234.5, 10.0 * 86400.0, 298.15);
        let mut opts = RunOptions::default();
        opts.n_cells = 80;
        let result = run(&ml, &medium, opts).unwrap();
        for &cf in &result.cf {
            assert_relative_eq!(cf, 1234.5);
        }
        for &f in &result.flux {
            assert_eq!(f, 0.0);
        }
    }

    #[test]
    fn impervious_food_keeps_cf_at_initial_value() {
        let (ml, _) = two_layer_ldpe();
        let medium = Medium::new(1e-3, 0.06, Some(0.0), 1.0, 0.0, 10.0 * 86400.0, 298.15);
        let mut opts = RunOptions::default();
        opts.n_cells = 80;
        let result = run(&ml, &medium, opts).unwrap();
        for &cf in &result.cf {
            assert_relative_eq!(cf, 0.0, epsilon = 1e-9);
        }
        for &f in &result.flux {
            assert_relative_eq!(f, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn resume_with_zero_additional_time_matches_target_state() {
        let (ml, medium) = two_layer_ldpe();
        let mut opts = RunOptions::default();
        opts.n_cells = 80;
        let first = run(&ml, &medium, opts).unwrap();

        let resumed = first.resume(Some(0.0), ResumeOverrides::default()).unwrap();
        assert_relative_eq!(resumed.cf_target, first.cf_target, epsilon = 1e-3 * first.cf_target.max(1.0));
    }

    #[test]
    fn invalid_multilayer_is_rejected_before_meshing() {
        let bad = Layer::new(-1.0, 1e-14, 1.0, 0.0, 298.15);
        assert!(Multilayer::new(vec![bad]).is_err());
    }

    #[test]
    fn auto_time_grid_starts_at_zero_and_reaches_the_end() {
        let grid = auto_time_grid(100.0, 50.0, 10, TimeScale::Sqrt);
        assert_eq!(grid[0], 0.0);
        assert!(grid.iter().any(|&t| t >= 100.0 - 1e-6));
    }
}
