use crate::calculus::{DifferentiableVectorFunction, VectorFunction};
use crate::{Real, SolverError};
use itertools::iterate;
use log::{debug, trace};
use nalgebra::{DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NewtonSettings<T> {
    pub max_iterations: Option<usize>,
    pub tolerance: T,
}

/// Summary of a converged Newton solve.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonOutcome<T> {
    pub iterations: usize,
    pub residual_norm: T,
}

#[derive(Debug)]
pub enum NewtonError {
    /// The procedure failed because the maximum number of iterations was reached.
    MaximumIterationsReached(usize),
    /// The residual became NaN or infinite after the given number of iterations.
    NonFiniteResidual(usize),
    /// The procedure failed because solving the Jacobian system failed.
    JacobianError(SolverError),
    /// The line search failed to produce a valid step direction.
    LineSearchError(SolverError),
}

impl Display for NewtonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            NewtonError::MaximumIterationsReached(maxit) => {
                write!(f, "Failed to converge within maximum number of iterations ({}).", maxit)
            }
            NewtonError::NonFiniteResidual(iter) => {
                write!(f, "Residual is not finite after {} iterations.", iter)
            }
            NewtonError::JacobianError(err) => {
                write!(f, "Failed to solve Jacobian system. Error: {}", err)
            }
            NewtonError::LineSearchError(err) => {
                write!(f, "Line search failed to produce valid step direction. Error: {}", err)
            }
        }
    }
}

impl Error for NewtonError {}

/// Attempts to solve the non-linear equation F(x) = 0.
///
/// No heap allocation is performed. The solution is said to have converged if
/// ```|F(x)|_2 <= tolerance```.
pub fn newton<'a, T, F>(
    function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
) -> Result<NewtonOutcome<T>, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    newton_line_search(function, x, f, dx, settings, &mut NoLineSearch)
}

/// Same as [`newton`], but allows specifying a line search.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn newton_line_search<'a, T, F>(
    mut function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
    line_search: &mut impl LineSearch<T, F>,
) -> Result<NewtonOutcome<T>, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    let mut x = x.into();
    let mut f = f.into();
    let mut minus_dx = dx.into();

    assert_eq!(x.nrows(), f.nrows());
    assert_eq!(minus_dx.nrows(), f.nrows());

    function.eval_into(&mut f, &DVectorView::from(&x));

    let mut iter = 0;
    let mut residual_norm = f.norm();

    while residual_norm > settings.tolerance {
        if !residual_norm.is_finite() {
            return Err(NewtonError::NonFiniteResidual(iter));
        }
        if settings.max_iterations.map_or(false, |max_iter| iter == max_iter) {
            return Err(NewtonError::MaximumIterationsReached(iter));
        }

        // Solve the system J dx = -f   <=>   J (-dx) = f
        function
            .solve_jacobian_system(&mut minus_dx, &DVectorView::from(&x), &DVectorView::from(&f))
            .map_err(NewtonError::JacobianError)?;

        // Flip sign to make it consistent with line search
        minus_dx *= -1.0;

        let step_length = line_search
            .step(
                &mut function,
                DVectorViewMut::from(&mut f),
                DVectorViewMut::from(&mut x),
                DVectorView::from(&minus_dx),
            )
            .map_err(NewtonError::LineSearchError)?;
        iter += 1;
        residual_norm = f.norm();
        trace!(
            "Newton iteration {}: step length {}, residual norm {}",
            iter,
            step_length,
            residual_norm
        );
    }

    Ok(NewtonOutcome {
        iterations: iter,
        residual_norm,
    })
}

pub trait LineSearch<T: Scalar, F: VectorFunction<T>> {
    /// Updates `x` along `direction` and stores the new residual in `f`.
    ///
    /// Returns the step length that was taken.
    fn step(
        &mut self,
        function: &mut F,
        f: DVectorViewMut<T>,
        x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, SolverError>;
}

/// Trivial implementation of line search. Equivalent to a single, full Newton step.
#[derive(Clone, Debug)]
pub struct NoLineSearch;

impl<T, F> LineSearch<T, F> for NoLineSearch
where
    T: Real,
    F: VectorFunction<T>,
{
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, SolverError> {
        x.axpy(T::one(), &direction, T::one());
        function.eval_into(&mut f, &DVectorView::from(&x));
        Ok(T::one())
    }
}

/// Backtracking line search using the Armijo condition on $g(x) = \frac{1}{2} |F(x)|^2$.
///
/// See Jorge & Nocedal (2006), Numerical Optimization, Chapter 3.1.
#[derive(Clone, Debug, PartialEq)]
pub struct BacktrackingLineSearch<T> {
    /// Sufficient decrease parameter in (0, 1).
    pub sufficient_decrease: T,
    /// The search fails once the step length drops below this value.
    pub min_step: T,
}

impl<T: Real> Default for BacktrackingLineSearch<T> {
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn default() -> Self {
        Self {
            sufficient_decrease: 1e-4,
            min_step: 1e-6,
        }
    }
}

impl<T, F> LineSearch<T, F> for BacktrackingLineSearch<T>
where
    T: Real,
    F: VectorFunction<T>,
{
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, SolverError> {
        // Assuming the direction p solves the Newton system, grad g^T p ~= -2 g(x), so the
        // sufficient decrease condition reads
        //  g(x + alpha p) <= (1 - c alpha) g(x).
        let c = self.sufficient_decrease;
        let g_initial = 0.5 * f.magnitude_squared();

        // Mild reductions first, then shrink geometrically.
        let mut alphas = [1.0, 0.75, 0.5]
            .into_iter()
            .chain(iterate(0.25, |alpha| 0.25 * *alpha));

        // x always holds x_0 + alpha_prev * p, so we only ever step by the difference.
        let mut alpha_prev = T::zero();
        loop {
            let alpha = alphas
                .next()
                .ok_or_else(|| SolverError::from("step length sequence exhausted"))?;
            x.axpy(alpha - alpha_prev, &direction, T::one());
            function.eval_into(&mut f, &DVectorView::from(&x));

            let g = 0.5 * f.magnitude_squared();
            if g <= (1.0 - c * alpha) * g_initial {
                return Ok(alpha);
            } else if alpha < self.min_step {
                return Err(SolverError::from(format!(
                    "Failed to produce valid step direction. \
                    Alpha {} is smaller than minimum allowed alpha {}.",
                    alpha, self.min_step
                )));
            }
            debug!("Rejected line search step length {}", alpha);
            alpha_prev = alpha;
        }
    }
}
