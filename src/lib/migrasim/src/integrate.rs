use diffsol::{NalgebraLU, NalgebraMat, NalgebraVec, OdeBuilder, OdeSolverMethod, OdeSolverStopReason};
use nalgebra::DVector;
use sprs::CsMat;

use crate::error::MigrationError;

type M = NalgebraMat<f64>;
type LS = NalgebraLU<f64>;

/// Sparse matrix-vector multiply, reused by both the right-hand side and
/// the (exact, constant) Jacobian action since A is linear. Writes into
/// `y` in place, as diffsol's closures expect.
fn cs_mat_mul_vec_into(a: &CsMat<f64>, x: &NalgebraVec<f64>, y: &mut NalgebraVec<f64>, n: usize) {
    for i in 0..n {
        y[i] = 0.0;
    }
    for (row, vec) in a.outer_iterator().enumerate() {
        let mut sum = 0.0;
        for (&col, &val) in vec.indices().iter().zip(vec.data().iter()) {
            sum += val * x[col];
        }
        y[row] = sum;
    }
}

fn state_to_dvector(y: &NalgebraVec<f64>, n: usize) -> DVector<f64> {
    DVector::from_iterator(n, (0..n).map(|i| y[i]))
}

/// State at every requested dimensionless time.
pub struct IntegrationOutput {
    pub tau: Vec<f64>,
    pub y: Vec<DVector<f64>>,
}

/// Integrate dy/dτ = A·y over `tau_eval` with a stiff, A-stable (BDF)
/// method. A is linear and constant, so its action doubles as the exact
/// Jacobian-vector product; no numerical differencing is needed.
pub fn integrate(
    a: &CsMat<f64>,
    y0: &DVector<f64>,
    tau_eval: &[f64],
    rel_tol: f64,
    abs_tol: f64,
    max_steps: usize,
) -> Result<IntegrationOutput, MigrationError> {
    if tau_eval.is_empty() {
        return Err(MigrationError::InvalidInput(
            "tau_eval must contain at least one point".into(),
        ));
    }

    let n = y0.len();
    let a_rhs = a.clone();
    let a_jac = a.clone();
    let y0_owned: Vec<f64> = y0.iter().copied().collect();
    let t0 = tau_eval[0];

    let rhs = move |x: &NalgebraVec<f64>, _p: &NalgebraVec<f64>, _t: f64, y: &mut NalgebraVec<f64>| {
        cs_mat_mul_vec_into(&a_rhs, x, y, n);
    };
    let jac = move |_x: &NalgebraVec<f64>, _p: &NalgebraVec<f64>, _t: f64, v: &NalgebraVec<f64>, y: &mut NalgebraVec<f64>| {
        cs_mat_mul_vec_into(&a_jac, v, y, n);
    };
    let init = move |_y0: &NalgebraVec<f64>, _t: f64, y: &mut NalgebraVec<f64>| {
        for (i, &c) in y0_owned.iter().enumerate() {
            y[i] = c;
        }
    };

    let problem = OdeBuilder::<M>::new()
        .t0(t0)
        .rtol(rel_tol)
        .atol(vec![abs_tol; n])
        .rhs_implicit(rhs, jac)
        .init(init, n)
        .build()
        .map_err(|e| MigrationError::IntegratorFailure(e.to_string()))?;

    let mut solver = problem
        .bdf::<LS>()
        .map_err(|e| MigrationError::IntegratorFailure(e.to_string()))?;

    let mut tau = Vec::with_capacity(tau_eval.len());
    let mut y = Vec::with_capacity(tau_eval.len());

    tau.push(tau_eval[0]);
    y.push(state_to_dvector(&solver.state().y, n));

    let mut steps_taken = 0usize;
    for &t_target in &tau_eval[1..] {
        solver
            .set_stop_time(t_target)
            .map_err(|e| MigrationError::IntegratorFailure(e.to_string()))?;
        loop {
            if steps_taken >= max_steps {
                return Err(MigrationError::BudgetExceeded(format!(
                    "integrator exceeded its step budget of {max_steps} steps before reaching τ = {t_target}"
                )));
            }
            match solver.step() {
                Ok(OdeSolverStopReason::TstopReached) => break,
                Ok(_) => {
                    steps_taken += 1;
                    continue;
                }
                Err(e) => return Err(MigrationError::IntegratorFailure(e.to_string())),
            }
        }
        let state = state_to_dvector(&solver.state().y, n);
        if state.iter().any(|v| !v.is_finite()) {
            return Err(MigrationError::IntegratorFailure(format!(
                "integrator produced a non-finite state at τ = {t_target}"
            )));
        }
        tau.push(t_target);
        y.push(state);
    }

    Ok(IntegrationOutput { tau, y })
}
