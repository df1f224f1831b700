use crate::medium::Medium;
use crate::mesh::Mesh;

/// Interface conductances: one west-face and one east-face value per cell.
/// These bake in both diffusive resistance and the partition (K) jump
/// across each interface; they are the only place K appears in the
/// assembled operator.
pub struct Conductances {
    pub hw: Vec<f64>,
    pub he: Vec<f64>,
}

/// Build the conductance arrays on the dimensionless mesh: `d_norm[i]` and
/// `k_norm[i]` are the cell's diffusivity/l_ref²·τ_scale... already scaled
/// by D_ref and K0 respectively (see `assemble::DimensionlessInputs`).
pub fn build(
    mesh: &Mesh,
    medium: &Medium,
    d_norm: &[f64],
    k_norm: &[f64],
    biot: f64,
) -> Conductances {
    let n = mesh.n_total();
    let pbc = medium.is_pbc();

    let mut hw = vec![0.0; n];
    if pbc {
        for i in 0..n {
            let prev = if i == 0 { n - 1 } else { i - 1 };
            hw[i] = 1.0
                / ((mesh.de[prev] / d_norm[prev]) * (k_norm[prev] / k_norm[i])
                    + mesh.dw[i] / d_norm[i]);
        }
    } else {
        // Food-facing west face of cell 0: Robin coupling via the Biot number.
        hw[0] = 1.0 / ((1.0 / k_norm[0]) / biot + mesh.dw[0] / d_norm[0]);
        for i in 1..n {
            hw[i] = 1.0
                / ((mesh.de[i - 1] / d_norm[i - 1]) * (k_norm[i - 1] / k_norm[i])
                    + mesh.dw[i] / d_norm[i]);
        }
    }

    let mut he = vec![0.0; n];
    for i in 0..n - 1 {
        he[i] = hw[i + 1];
    }
    he[n - 1] = if pbc { hw[0] } else { 0.0 };

    Conductances { hw, he }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Layer, Multilayer};
    use crate::medium::Medium;
    use approx::assert_relative_eq;

    #[test]
    fn identical_layers_give_symmetric_interior_conductance() {
        let ml = Multilayer::new(vec![
            Layer::new(100e-6, 1e-14, 1.0, 1000.0, 298.15),
            Layer::new(100e-6, 1e-14, 1.0, 0.0, 298.15),
        ])
        .unwrap();
        let mesh = Mesh::build(&ml, 20, 10).unwrap();
        let d_norm = vec![1.0; mesh.n_total()];
        let k_norm = vec![1.0; mesh.n_total()];
        let medium = Medium::new(1e-3, 0.06, Some(1e-3), 1.0, 0.0, 864000.0, 298.15);
        let cond = build(&mesh, &medium, &d_norm, &k_norm, 1.0);
        let mid = mesh.n_total() / 2;
        assert_relative_eq!(cond.he[mid - 1], cond.hw[mid], epsilon = 1e-12);
    }

    #[test]
    fn non_pbc_outer_face_is_impervious() {
        let ml = Multilayer::new(vec![Layer::new(100e-6, 1e-14, 1.0, 1000.0, 298.15)]).unwrap();
        let mesh = Mesh::build(&ml, 20, 10).unwrap();
        let d_norm = vec![1.0; mesh.n_total()];
        let k_norm = vec![1.0; mesh.n_total()];
        let medium = Medium::new(1e-3, 0.06, Some(1e-3), 1.0, 0.0, 864000.0, 298.15);
        let cond = build(&mesh, &medium, &d_norm, &k_norm, 1.0);
        assert_eq!(*cond.he.last().unwrap(), 0.0);
    }

    #[test]
    fn pbc_wraps_east_face_to_west_face_of_first_cell() {
        let ml = Multilayer::new(vec![
            Layer::new(500e-6, 1e-14, 1.0, 0.0, 298.15),
            Layer::new(300e-6, 1e-14, 1.0, 5000.0, 298.15),
        ])
        .unwrap();
        let mesh = Mesh::build(&ml, 20, 10).unwrap();
        let d_norm = vec![1.0; mesh.n_total()];
        let k_norm = vec![1.0; mesh.n_total()];
        let medium = Medium::new(1.0, 0.0, None, 1.0, 0.0, 864000.0, 298.15);
        let cond = build(&mesh, &medium, &d_norm, &k_norm, 1.0);
        assert_relative_eq!(*cond.he.last().unwrap(), cond.hw[0], epsilon = 1e-12);
    }
}
