use serde::{Deserialize, Serialize};

use crate::error::MigrationError;

/// A single packaging material, food-to-outer contact order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Layer {
    /// Thickness [m], > 0
    pub l: f64,
    /// Diffusivity [m²/s], > 0
    pub d: f64,
    /// Partition coefficient [dimensionless], > 0. Ratio of this layer's
    /// equilibrium concentration to a common reference.
    pub k: f64,
    /// Initial concentration [arbitrary consistent unit], ≥ 0
    pub c0: f64,
    /// Contact temperature [K]. Not used by the solver core itself; carried
    /// through for property providers upstream of this crate.
    pub temperature: f64,
    /// Density [kg/m³], if known. Unused by the solver core.
    pub rho: Option<f64>,
    /// Free-form material label.
    pub label: Option<String>,
}

impl Layer {
    pub fn new(l: f64, d: f64, k: f64, c0: f64, temperature: f64) -> Self {
        Layer {
            l,
            d,
            k,
            c0,
            temperature,
            rho: None,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = Some(rho);
        self
    }

    fn validate(&self) -> Result<(), MigrationError> {
        if !(self.l > 0.0 && self.l.is_finite()) {
            return Err(MigrationError::InvalidInput(format!(
                "layer thickness l must be positive and finite, got {}",
                self.l
            )));
        }
        if !(self.d > 0.0 && self.d.is_finite()) {
            return Err(MigrationError::InvalidInput(format!(
                "layer diffusivity D must be positive and finite, got {}",
                self.d
            )));
        }
        if !(self.k > 0.0 && self.k.is_finite()) {
            return Err(MigrationError::InvalidInput(format!(
                "layer partition coefficient K must be positive and finite, got {}",
                self.k
            )));
        }
        if !(self.c0 >= 0.0 && self.c0.is_finite()) {
            return Err(MigrationError::InvalidInput(format!(
                "layer initial concentration C0 must be non-negative and finite, got {}",
                self.c0
            )));
        }
        Ok(())
    }

    /// Diffusive+partition resistance R_i = l_i·K_i/D_i, used to pick the
    /// reference layer and to size the mesh.
    pub fn resistance(&self) -> f64 {
        self.l * self.k / self.d
    }

    /// Permeability P_i = D_i / (l_i·K_i), used by the mesh builder.
    pub fn permeability(&self) -> f64 {
        self.d / (self.l * self.k)
    }
}

/// Ordered sequence of layers, index 0 in contact with the food.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Multilayer {
    layers: Vec<Layer>,
}

impl Multilayer {
    pub fn new(layers: Vec<Layer>) -> Result<Self, MigrationError> {
        if layers.is_empty() {
            return Err(MigrationError::InvalidInput(
                "multilayer must contain at least one layer".into(),
            ));
        }
        for layer in &layers {
            layer.validate()?;
        }
        Ok(Multilayer { layers })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Total thickness l_sum = Σ l_i.
    pub fn thickness(&self) -> f64 {
        self.layers.iter().map(|l| l.l).sum()
    }

    /// Append `other`'s layers after this stack's, food side first. Used by
    /// `MigrationResult::contact` to build the multilayer for a chained run.
    pub fn concat(mut self, other: Multilayer) -> Multilayer {
        self.layers.extend(other.layers);
        self
    }

    /// Index of the layer of maximum resistance R_i = l_i·K_i/D_i; ties
    /// broken by lowest index (first such layer, food-to-outer order).
    pub fn reference_layer_index(&self) -> usize {
        let mut best = 0;
        let mut best_r = f64::NEG_INFINITY;
        for (i, layer) in self.layers.iter().enumerate() {
            let r = layer.resistance();
            if r > best_r {
                best_r = r;
                best = i;
            }
        }
        best
    }

    pub fn reference_layer(&self) -> &Layer {
        &self.layers[self.reference_layer_index()]
    }
}
