use sprs::{CsMat, TriMatI};

use crate::conductance::Conductances;
use crate::mesh::Mesh;

/// Assembles the sparse transition operator A so that dy/dτ = A·y.
///
/// All arguments are already dimensionless: `d_norm[i] = D_i/D_ref`,
/// `k_norm[i] = K_i/K0` (so the food coefficient is 1), `l_load = (A·l_sum/V)
/// ·(l_ref/l_sum)` is the food-row loading factor. `delta[i] = dw_i + de_i`
/// is each cell's dimensionless width.
pub fn build_non_pbc(mesh: &Mesh, cond: &Conductances, k_norm: &[f64], delta: &[f64], l_load: f64) -> CsMat<f64> {
    let n = mesh.n_total();
    let size = n + 1;

    let mut rows = Vec::with_capacity(3 * size);
    let mut cols = Vec::with_capacity(3 * size);
    let mut vals = Vec::with_capacity(3 * size);

    // Food row (y[0] = CF): dy[0]/dτ = L·hw_0·(y[1] - y[0]/K_0).
    let hw0 = cond.hw[0];
    rows.push(0);
    cols.push(0);
    vals.push(-l_load * hw0 / k_norm[0]);
    rows.push(0);
    cols.push(1);
    vals.push(l_load * hw0);

    for i in 0..n {
        let row = i + 1;
        let hw = cond.hw[i];
        let he = cond.he[i];
        let d = delta[i];

        // West neighbour: food node for i=0, else cell i-1.
        if i == 0 {
            rows.push(row);
            cols.push(0);
            vals.push(hw / k_norm[0] / d);
        } else {
            rows.push(row);
            cols.push(row - 1);
            vals.push(hw * (k_norm[i - 1] / k_norm[i]) / d);
        }

        let mut diag = -hw / d;
        if i < n - 1 {
            diag -= he * (k_norm[i] / k_norm[i + 1]) / d;
            rows.push(row);
            cols.push(row + 1);
            vals.push(he / d);
        }
        rows.push(row);
        cols.push(row);
        vals.push(diag);
    }

    let mut tri = TriMatI::<f64, usize>::new((size, size));
    for idx in 0..vals.len() {
        tri.add_triplet(rows[idx], cols[idx], vals[idx]);
    }
    tri.to_csr()
}

/// Fully periodic variant: no food node, tridiagonal plus the two corner
/// entries enforcing the wrap-around.
pub fn build_pbc(mesh: &Mesh, cond: &Conductances, k_norm: &[f64], delta: &[f64]) -> CsMat<f64> {
    let n = mesh.n_total();

    let mut rows = Vec::with_capacity(3 * n);
    let mut cols = Vec::with_capacity(3 * n);
    let mut vals = Vec::with_capacity(3 * n);

    for i in 0..n {
        let w = if i == 0 { n - 1 } else { i - 1 };
        let e = if i == n - 1 { 0 } else { i + 1 };
        let hw = cond.hw[i];
        let he = cond.he[i];
        let d = delta[i];

        rows.push(i);
        cols.push(w);
        vals.push(hw * (k_norm[w] / k_norm[i]) / d);

        rows.push(i);
        cols.push(i);
        vals.push((-hw - he * (k_norm[i] / k_norm[e])) / d);

        rows.push(i);
        cols.push(e);
        vals.push(he / d);
    }

    let mut tri = TriMatI::<f64, usize>::new((n, n));
    for idx in 0..vals.len() {
        tri.add_triplet(rows[idx], cols[idx], vals[idx]);
    }
    tri.to_csr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Layer, Multilayer};
    use crate::medium::Medium;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn mat_mul_vec(a: &CsMat<f64>, x: &DVector<f64>) -> DVector<f64> {
        let n = a.rows();
        let mut y = DVector::<f64>::zeros(n);
        for (row, vec) in a.outer_iterator().enumerate() {
            let mut sum = 0.0;
            for (&col, &val) in vec.indices().iter().zip(vec.data().iter()) {
                sum += val * x[col];
            }
            y[row] = sum;
        }
        y
    }

    #[test]
    fn non_pbc_rows_sum_to_zero_except_food_exchange() {
        // Each interior row's off-diagonal K-weighted coefficients balance its
        // own diagonal when K is uniform: A·1 should vanish on cells whose
        // neighbours are also interior (no flux with a uniform field).
        let ml = Multilayer::new(vec![
            Layer::new(100e-6, 1e-14, 1.0, 1000.0, 298.15),
            Layer::new(100e-6, 1e-14, 1.0, 0.0, 298.15),
        ])
        .unwrap();
        let mesh = Mesh::build(&ml, 40, 10).unwrap();
        let n = mesh.n_total();
        let d_norm = vec![1.0; n];
        let k_norm = vec![1.0; n];
        let medium = Medium::new(1e-3, 0.06, Some(1e-3), 1.0, 0.0, 864000.0, 298.15);
        let cond = crate::conductance::build(&mesh, &medium, &d_norm, &k_norm, 1.0);
        let delta: Vec<f64> = mesh.dw.iter().zip(&mesh.de).map(|(w, e)| w + e).collect();
        let a = build_non_pbc(&mesh, &cond, &k_norm, &delta, 1.0);

        let ones = DVector::from_element(n + 1, 1.0);
        let ay = mat_mul_vec(&a, &ones);
        // The food row and the two layer-0/outer-boundary rows see the
        // boundary terms; interior rows should see zero net flux.
        for row in 2..n - 1 {
            assert_relative_eq!(ay[row], 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn pbc_uniform_field_has_zero_time_derivative() {
        let ml = Multilayer::new(vec![
            Layer::new(500e-6, 1e-14, 1.0, 0.0, 298.15),
            Layer::new(300e-6, 1e-14, 1.0, 5000.0, 298.15),
        ])
        .unwrap();
        let mesh = Mesh::build(&ml, 40, 10).unwrap();
        let n = mesh.n_total();
        let d_norm = vec![1.0; n];
        let k_norm = vec![1.0; n];
        let medium = Medium::new(1.0, 0.0, None, 1.0, 0.0, 864000.0, 298.15);
        let cond = crate::conductance::build(&mesh, &medium, &d_norm, &k_norm, 1.0);
        let delta: Vec<f64> = mesh.dw.iter().zip(&mesh.de).map(|(w, e)| w + e).collect();
        let a = build_pbc(&mesh, &cond, &k_norm, &delta);

        let ones = DVector::from_element(n, 1.0);
        let ay = mat_mul_vec(&a, &ones);
        for row in 0..n {
            assert_relative_eq!(ay[row], 0.0, epsilon = 1e-9);
        }
    }
}
