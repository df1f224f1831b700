use crate::error::MigrationError;
use crate::layer::Multilayer;

/// Per-cell arrays produced by [`Mesh::build`], concatenated in layer order.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Cell-centre positions [m], measured from the food-contact face.
    pub x_centre: Vec<f64>,
    /// West half-width of each cell [m].
    pub dw: Vec<f64>,
    /// East half-width of each cell [m].
    pub de: Vec<f64>,
    /// Index into `Multilayer::layers()` that owns each cell.
    pub layer_index: Vec<usize>,
}

impl Mesh {
    pub fn n_total(&self) -> usize {
        self.x_centre.len()
    }

    /// Build a non-uniform mesh sized so each layer gets a number of cells
    /// proportional to its permeability times thickness, which makes
    /// steady-state flux exact on the resulting grid.
    pub fn build(multilayer: &Multilayer, n_target: usize, n_min: usize) -> Result<Mesh, MigrationError> {
        let layers = multilayer.layers();
        let n_layers = layers.len();

        // Seed X_0 = 1; X_i = X_{i-1} * (P_{i-1}*l_i) / (P_i*l_{i-1}).
        let mut x = vec![0.0f64; n_layers];
        x[0] = 1.0;
        for i in 1..n_layers {
            let p_prev = layers[i - 1].permeability();
            let p_here = layers[i].permeability();
            x[i] = x[i - 1] * (p_prev * layers[i].l) / (p_here * layers[i - 1].l);
        }
        let x_sum: f64 = x.iter().sum();

        let raw: Vec<f64> = x.iter().map(|&xi| (n_target as f64) * xi / x_sum).collect();
        let n_cells = distribute_cells(&raw, n_target, n_min);

        let mut x_centre = Vec::with_capacity(n_target.max(n_layers * n_min));
        let mut dw = Vec::with_capacity(x_centre.capacity());
        let mut de = Vec::with_capacity(x_centre.capacity());
        let mut layer_index = Vec::with_capacity(x_centre.capacity());

        let mut offset = 0.0;
        for (li, layer) in layers.iter().enumerate() {
            let n = n_cells[li];
            let dx = layer.l / n as f64;
            for c in 0..n {
                x_centre.push(offset + (c as f64 + 0.5) * dx);
                dw.push(dx / 2.0);
                de.push(dx / 2.0);
                layer_index.push(li);
            }
            offset += layer.l;
        }

        Ok(Mesh {
            x_centre,
            dw,
            de,
            layer_index,
        })
    }
}

/// Round `raw` ideal cell counts to integers ≥ `n_min` that sum exactly to
/// `n_target`, adjusting deterministically by layer order so runs are
/// reproducible.
fn distribute_cells(raw: &[f64], n_target: usize, n_min: usize) -> Vec<usize> {
    let n = raw.len();
    let mut counts: Vec<usize> = raw.iter().map(|&r| (r.ceil() as usize).max(n_min)).collect();
    let mut total: i64 = counts.iter().map(|&c| c as i64).sum();
    let target = n_target.max(n * n_min) as i64;

    while total > target {
        let idx = (0..n)
            .filter(|&i| counts[i] > n_min)
            .max_by(|&a, &b| counts[a].cmp(&counts[b]).then(b.cmp(&a)))
            .expect("total > target implies some layer is above its minimum");
        counts[idx] -= 1;
        total -= 1;
    }
    while total < target {
        let idx = (0..n)
            .max_by(|&a, &b| raw[a].partial_cmp(&raw[b]).unwrap().then(b.cmp(&a)))
            .expect("raw is non-empty for a validated multilayer");
        counts[idx] += 1;
        total += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use approx::assert_relative_eq;

    fn two_layer() -> Multilayer {
        Multilayer::new(vec![
            Layer::new(100e-6, 1e-14, 1.0, 1000.0, 298.15),
            Layer::new(100e-6, 1e-14, 1.0, 0.0, 298.15),
        ])
        .unwrap()
    }

    #[test]
    fn total_cells_matches_target() {
        let ml = two_layer();
        let mesh = Mesh::build(&ml, 600, 20).unwrap();
        assert_eq!(mesh.n_total(), 600);
    }

    #[test]
    fn equal_layers_get_equal_cells() {
        let ml = two_layer();
        let mesh = Mesh::build(&ml, 600, 20).unwrap();
        let n0 = mesh.layer_index.iter().filter(|&&li| li == 0).count();
        let n1 = mesh.layer_index.iter().filter(|&&li| li == 1).count();
        assert_eq!(n0, n1);
    }

    #[test]
    fn cell_centres_span_the_full_thickness() {
        let ml = two_layer();
        let mesh = Mesh::build(&ml, 600, 20).unwrap();
        let l_sum = ml.thickness();
        assert_relative_eq!(
            mesh.x_centre[0] - mesh.dw[0],
            0.0,
            epsilon = 1e-12
        );
        let last = mesh.n_total() - 1;
        assert_relative_eq!(
            mesh.x_centre[last] + mesh.de[last],
            l_sum,
            epsilon = 1e-9
        );
    }

    #[test]
    fn per_layer_minimum_is_respected_even_for_a_tiny_target() {
        let ml = two_layer();
        let mesh = Mesh::build(&ml, 10, 20).unwrap();
        let n0 = mesh.layer_index.iter().filter(|&&li| li == 0).count();
        let n1 = mesh.layer_index.iter().filter(|&&li| li == 1).count();
        assert!(n0 >= 20);
        assert!(n1 >= 20);
    }
}
