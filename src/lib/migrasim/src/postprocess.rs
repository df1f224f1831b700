use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::conductance::Conductances;
use crate::layer::Multilayer;
use crate::medium::Medium;
use crate::mesh::Mesh;

/// Length, time, and concentration scales derived once per run, plus the
/// two loading factors (Biot number and food-row coupling) that depend on
/// them.
pub struct Scaling {
    pub l_ref: f64,
    pub d_ref: f64,
    pub tau_scale: f64,
    pub c0eq: f64,
    pub biot: f64,
    pub l_load: f64,
}

/// Reference layer, Biot number, food-row loading factor and the
/// equilibrium concentration scale C0eq, with a zero-numerator fallback
/// to 1.0 (neutral scaling).
pub fn compute_scaling(multilayer: &Multilayer, medium: &Medium) -> Scaling {
    let iref = multilayer.reference_layer_index();
    let reference = &multilayer.layers()[iref];
    let l_ref = reference.l;
    let d_ref = reference.d;
    let tau_scale = l_ref * l_ref / d_ref;

    let l_sum = multilayer.thickness();
    let biot = medium.h.map(|h| h * l_ref / d_ref).unwrap_or(0.0);
    let l_load = (medium.area * l_sum / medium.volume) * (l_ref / l_sum);

    let mut numerator = medium.cf0;
    let mut denominator = 1.0;
    for layer in multilayer.layers() {
        let li = (layer.l / l_ref) * l_load;
        numerator += li * layer.c0;
        denominator += (1.0 / layer.k) * li;
    }
    let c0eq = if numerator == 0.0 { 1.0 } else { numerator / denominator };

    Scaling {
        l_ref,
        d_ref,
        tau_scale,
        c0eq,
        biot,
        l_load,
    }
}

/// Per-cell dimensionless diffusivity (D_i/D_ref) and partition coefficient
/// (K_i/K0), broadcast from the owning layer onto every cell of the mesh.
pub fn per_cell_d_k_norm(mesh: &Mesh, multilayer: &Multilayer, scaling: &Scaling, medium: &Medium) -> (Vec<f64>, Vec<f64>) {
    let layers = multilayer.layers();
    let d_norm = mesh.layer_index.iter().map(|&li| layers[li].d / scaling.d_ref).collect();
    let k_norm = mesh.layer_index.iter().map(|&li| layers[li].k / medium.k0).collect();
    (d_norm, k_norm)
}

/// A reconstructed concentration profile at a single instant: 3·N_tot
/// positions (west face, centre, east face of every cell) and the matching
/// dimensional concentrations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    pub x: Vec<f64>,
    pub c: Vec<f64>,
}

/// Reconstruct west/east interface values around each cell-centred value,
/// using the same conductance relations the assembler uses, so the profile
/// reproduces the interface jump and the cell value exactly.
///
/// `xreltol` nudges west/east positions inward by that fraction of the
/// half-width so the 3·N_tot positions are strictly increasing (used to
/// build a monotonic-x interpolant); `xreltol = 0.0` gives the exact
/// plotting positions instead, where adjacent cells share an interface
/// position.
pub fn reconstruct_non_pbc(
    y: &DVector<f64>,
    mesh: &Mesh,
    cond: &Conductances,
    d_norm: &[f64],
    k_norm: &[f64],
    c0eq: f64,
    xreltol: f64,
) -> Profile {
    let n = mesh.n_total();
    // y[0] is CF, y[i+1] is cell i; CF acts as a virtual "cell -1" with K
    // normalized to 1, so the general interface formula applies uniformly.
    let k_prev = |i: usize| if i == 0 { 1.0 } else { k_norm[i - 1] };

    let mut x = Vec::with_capacity(3 * n);
    let mut c = Vec::with_capacity(3 * n);

    for i in 0..n {
        let c_centre = y[i + 1];
        let prev_val = y[i]; // CF when i == 0, else cell i-1's value

        let cw = c_centre
            + mesh.dw[i] * cond.hw[i] * (k_prev(i) / k_norm[i] * prev_val - c_centre) / d_norm[i];

        let ce = if i == n - 1 {
            c_centre
        } else {
            c_centre
                - mesh.de[i] * cond.he[i] * (k_norm[i] / k_norm[i + 1] * c_centre - y[i + 2]) / d_norm[i]
        };

        let xw = mesh.x_centre[i] - mesh.dw[i] * (1.0 - xreltol);
        let xc = mesh.x_centre[i];
        let xe = mesh.x_centre[i] + mesh.de[i] * (1.0 - xreltol);

        x.push(xw);
        x.push(xc);
        x.push(xe);
        c.push(cw * c0eq);
        c.push(c_centre * c0eq);
        c.push(ce * c0eq);
    }

    Profile { x, c }
}

pub fn reconstruct_pbc(
    y: &DVector<f64>,
    mesh: &Mesh,
    cond: &Conductances,
    d_norm: &[f64],
    k_norm: &[f64],
    c0eq: f64,
    xreltol: f64,
) -> Profile {
    let n = mesh.n_total();
    let mut x = Vec::with_capacity(3 * n);
    let mut c = Vec::with_capacity(3 * n);

    for i in 0..n {
        let w = if i == 0 { n - 1 } else { i - 1 };
        let e = if i == n - 1 { 0 } else { i + 1 };
        let c_centre = y[i];

        let cw = c_centre + mesh.dw[i] * cond.hw[i] * (k_norm[w] / k_norm[i] * y[w] - c_centre) / d_norm[i];
        let ce = c_centre - mesh.de[i] * cond.he[i] * (k_norm[i] / k_norm[e] * c_centre - y[e]) / d_norm[i];

        let xw = mesh.x_centre[i] - mesh.dw[i] * (1.0 - xreltol);
        let xc = mesh.x_centre[i];
        let xe = mesh.x_centre[i] + mesh.de[i] * (1.0 - xreltol);

        x.push(xw);
        x.push(xc);
        x.push(xe);
        c.push(cw * c0eq);
        c.push(c_centre * c0eq);
        c.push(ce * c0eq);
    }

    Profile { x, c }
}

/// Instantaneous food-side flux at a single instant; zero under PBC.
pub fn flux_non_pbc(cf_dimless: f64, c0_dimless: f64, hw0: f64, c0eq: f64) -> f64 {
    hw0 * (cf_dimless - c0_dimless) * c0eq
}

/// Cumulative flux via the trapezoidal rule over the (dimensional) time
/// vector.
pub fn cumulative_trapezoid(t: &[f64], f: &[f64]) -> Vec<f64> {
    let mut fc = Vec::with_capacity(t.len());
    let mut acc = 0.0;
    fc.push(0.0);
    for i in 1..t.len() {
        acc += 0.5 * (f[i] + f[i - 1]) * (t[i] - t[i - 1]);
        fc.push(acc);
    }
    fc
}

/// Spatial integral of a reconstructed profile over the packaging span,
/// using Simpson's rule on each cell's (west, centre, east) triad — exact
/// for the piecewise-linear reconstruction even when dw ≠ de.
pub fn spatial_integral(profile: &Profile) -> f64 {
    let mut total = 0.0;
    for triad in profile.x.chunks_exact(3).zip(profile.c.chunks_exact(3)) {
        let (xs, cs) = triad;
        let h0 = xs[1] - xs[0];
        let h1 = xs[2] - xs[1];
        if h0 <= 0.0 || h1 <= 0.0 {
            continue;
        }
        total += (h0 + h1) / 6.0
            * ((2.0 - h1 / h0) * cs[0] + (h0 + h1).powi(2) / (h0 * h1) * cs[1] + (2.0 - h0 / h1) * cs[2]);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use approx::assert_relative_eq;

    #[test]
    fn c0eq_falls_back_to_one_when_numerator_is_zero() {
        let ml = Multilayer::new(vec![Layer::new(100e-6, 1e-14, 1.0, 0.0, 298.15)]).unwrap();
        let medium = Medium::new(1e-3, 0.06, Some(1e-3), 1.0, 0.0, 864000.0, 298.15);
        let scaling = compute_scaling(&ml, &medium);
        assert_relative_eq!(scaling.c0eq, 1.0);
    }

    #[test]
    fn reconstruction_reproduces_cell_centre_exactly() {
        let ml = Multilayer::new(vec![
            Layer::new(100e-6, 1e-14, 1.0, 1000.0, 298.15),
            Layer::new(100e-6, 1e-14, 1.0, 0.0, 298.15),
        ])
        .unwrap();
        let medium = Medium::new(1e-3, 0.06, Some(1e-3), 1.0, 0.0, 864000.0, 298.15);
        let scaling = compute_scaling(&ml, &medium);
        let mesh = Mesh::build(&ml, 40, 10).unwrap();
        let (d_norm, k_norm) = per_cell_d_k_norm(&mesh, &ml, &scaling, &medium);
        let cond = crate::conductance::build(&mesh, &medium, &d_norm, &k_norm, scaling.biot);

        let n = mesh.n_total();
        let mut y = DVector::<f64>::zeros(n + 1);
        y[0] = 0.2;
        for i in 0..n {
            y[i + 1] = 0.5 + 0.01 * i as f64;
        }
        let profile = reconstruct_non_pbc(&y, &mesh, &cond, &d_norm, &k_norm, scaling.c0eq, 0.0);
        for i in 0..n {
            assert_relative_eq!(profile.c[3 * i + 1], y[i + 1] * scaling.c0eq, epsilon = 1e-12);
        }
    }

    #[test]
    fn cumulative_trapezoid_of_constant_flux_is_linear() {
        let t = vec![0.0, 1.0, 2.0, 3.0];
        let f = vec![2.0, 2.0, 2.0, 2.0];
        let fc = cumulative_trapezoid(&t, &f);
        assert_relative_eq!(fc[3], 6.0, epsilon = 1e-12);
    }
}
