//! Bounded numerical minimizers and the fallback chain that strings them together.
//!
//! Every strategy coordinate lives in the same box `[lower, upper]`. The
//! objectives are non-convex and only piecewise smooth (absolute deviations
//! from the mean), so no single method is reliable on its own:
//!
//! 1. [`ProjectedGradient`]: finite-difference gradient projection with
//!    Armijo backtracking. Fast when the objective is smooth near the optimum.
//! 2. [`NelderMead`]: derivative-free simplex search with box projection.
//! 3. [`PatternSearch`]: compass search, slow but robust to kinks.
//! 4. [`DifferentialEvolution`]: global population-based search, the last resort.
//!
//! [`FallbackChain`] tries methods in order and returns the first success.

use std::fmt;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::solver::config::SolverConfig;

/// Objective function over a strategy vector.
pub type Objective<'a> = dyn Fn(&[f64]) -> f64 + Sync + 'a;

/// Relative step for finite differences (about the cube root of machine epsilon).
const FD_STEP: f64 = 6e-6;

/// Sufficient-decrease constant of the Armijo condition.
const ARMIJO: f64 = 1e-4;

/// Maximum halvings of a line-search step.
const MAX_BACKTRACKS: usize = 60;

/// Box constraint shared by every coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
}

impl Bounds {
    /// Create bounds; `upper` must not be below `lower`.
    pub fn new(lower: f64, upper: f64) -> Self {
        debug_assert!(upper >= lower, "bounds are inverted");
        Self { lower, upper }
    }

    /// Width of the box.
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Midpoint of the box.
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }

    /// Clamp one coordinate into the box.
    pub fn clamp(&self, x: f64) -> f64 {
        x.max(self.lower).min(self.upper)
    }

    /// Clamp every coordinate into the box.
    pub fn project(&self, x: &mut [f64]) {
        for xi in x.iter_mut() {
            *xi = self.clamp(*xi);
        }
    }
}

/// Stopping rules shared by all methods.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    /// Relative objective tolerance.
    pub tolerance: f64,
    /// Maximum iterations.
    pub max_iterations: usize,
    /// Abort after this instant.
    pub deadline: Option<Instant>,
}

impl Budget {
    /// Budget derived from a solver configuration and an optional deadline.
    pub fn from_config(config: &SolverConfig, deadline: Option<Instant>) -> Self {
        Self {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            deadline,
        }
    }

    /// Budget for one-coordinate best responses.
    ///
    /// The objective tolerance also sets the resolution of a located
    /// strategy, and a strategy off a kink by `dx` forfeits about
    /// `slope * dx` utility. The tolerance is therefore tightened so that
    /// forfeit stays well below `epsilon` on a box of this `width`. No
    /// deadline, so repeated checks of the same profile agree.
    pub fn best_response(config: &SolverConfig, width: f64) -> Self {
        let resolution = (config.epsilon * 1e-2 / width.max(1.0)).max(1e-15);
        Self {
            tolerance: config.tolerance.min(resolution),
            max_iterations: config.max_iterations,
            deadline: None,
        }
    }

    fn expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

/// A located minimum.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    /// Minimizer.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub value: f64,
    /// Iterations (or generations) used.
    pub iterations: usize,
}

/// Why a minimizer gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizeError {
    /// Zero-dimensional problem.
    EmptyProblem,
    /// The objective returned NaN or infinity where a value was needed.
    NonFinite {
        /// Method that hit it.
        method: &'static str,
    },
    /// Iteration limit reached before the convergence test passed.
    NotConverged {
        /// Method that hit it.
        method: &'static str,
        /// Iterations used.
        iterations: usize,
    },
    /// No step along the projected gradient made real progress.
    LineSearch {
        /// Method that hit it.
        method: &'static str,
        /// Iterations used.
        iterations: usize,
    },
    /// Wall-clock budget exhausted.
    DeadlineExceeded {
        /// Method that hit it.
        method: &'static str,
        /// Iterations used.
        iterations: usize,
    },
}

impl fmt::Display for OptimizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizeError::EmptyProblem => write!(f, "nothing to optimize"),
            OptimizeError::NonFinite { method } => {
                write!(f, "{}: objective is not finite", method)
            }
            OptimizeError::NotConverged { method, iterations } => {
                write!(f, "{}: no convergence after {} iterations", method, iterations)
            }
            OptimizeError::LineSearch { method, iterations } => {
                write!(f, "{}: line search failed at iteration {}", method, iterations)
            }
            OptimizeError::DeadlineExceeded { method, iterations } => {
                write!(f, "{}: time budget exhausted after {} iterations", method, iterations)
            }
        }
    }
}

impl std::error::Error for OptimizeError {}

/// A bounded minimization method.
pub trait Minimizer: Send + Sync {
    /// Short name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Minimize `f` over the box starting from `x0`.
    fn minimize(
        &self,
        f: &Objective<'_>,
        x0: &[f64],
        bounds: Bounds,
        budget: &Budget,
    ) -> Result<Minimum, OptimizeError>;
}

fn start_point(x0: &[f64], bounds: Bounds) -> Result<Vec<f64>, OptimizeError> {
    if x0.is_empty() {
        return Err(OptimizeError::EmptyProblem);
    }
    let mut x = x0.to_vec();
    bounds.project(&mut x);
    Ok(x)
}

fn finite(value: f64, method: &'static str) -> Result<f64, OptimizeError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(OptimizeError::NonFinite { method })
    }
}

/// Non-finite values rank last.
fn rank(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::INFINITY
    }
}

/// Gradient projection with finite differences and Armijo backtracking.
#[derive(Debug, Clone, Copy)]
pub struct ProjectedGradient {
    /// Stop when the projected gradient step is below this (max-norm).
    pub pg_tolerance: f64,
}

impl Default for ProjectedGradient {
    fn default() -> Self {
        Self { pg_tolerance: 1e-5 }
    }
}

impl ProjectedGradient {
    const NAME: &'static str = "projected-gradient";

    /// Central differences inside the box, one-sided at the bounds.
    fn gradient(
        f: &Objective<'_>,
        x: &[f64],
        fx: f64,
        bounds: Bounds,
    ) -> Result<Vec<f64>, OptimizeError> {
        let mut shifted = x.to_vec();
        let mut grad = Vec::with_capacity(x.len());

        for i in 0..x.len() {
            let h = FD_STEP * x[i].abs().max(1.0);
            let up = (x[i] + h).min(bounds.upper);
            let down = (x[i] - h).max(bounds.lower);

            shifted[i] = up;
            let f_up = if up > x[i] { f(&shifted) } else { fx };
            shifted[i] = down;
            let f_down = if down < x[i] { f(&shifted) } else { fx };
            shifted[i] = x[i];

            let span = up - down;
            let g = if span > 0.0 { (f_up - f_down) / span } else { 0.0 };
            grad.push(finite(g, Self::NAME)?);
        }

        Ok(grad)
    }
}

impl Minimizer for ProjectedGradient {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn minimize(
        &self,
        f: &Objective<'_>,
        x0: &[f64],
        bounds: Bounds,
        budget: &Budget,
    ) -> Result<Minimum, OptimizeError> {
        let mut x = start_point(x0, bounds)?;
        let mut fx = finite(f(&x), Self::NAME)?;
        let mut step = 1.0;
        let mut stalled = false;

        for iteration in 1..=budget.max_iterations {
            if budget.expired() {
                return Err(OptimizeError::DeadlineExceeded {
                    method: Self::NAME,
                    iterations: iteration,
                });
            }

            let grad = Self::gradient(f, &x, fx, bounds)?;

            let pg_norm = x
                .iter()
                .zip(&grad)
                .map(|(&xi, &gi)| (bounds.clamp(xi - gi) - xi).abs())
                .fold(0.0, f64::max);
            if pg_norm <= self.pg_tolerance {
                return Ok(Minimum {
                    x,
                    value: fx,
                    iterations: iteration,
                });
            }
            // A negligible decrease away from a stationary point means the
            // step is pinned at a kink, not converged.
            if stalled {
                return Err(OptimizeError::LineSearch {
                    method: Self::NAME,
                    iterations: iteration,
                });
            }

            let mut t = step;
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                let candidate: Vec<f64> = x
                    .iter()
                    .zip(&grad)
                    .map(|(&xi, &gi)| bounds.clamp(xi - t * gi))
                    .collect();
                let decrease: f64 = x
                    .iter()
                    .zip(&candidate)
                    .zip(&grad)
                    .map(|((&xi, &ci), &gi)| gi * (xi - ci))
                    .sum();
                let fc = f(&candidate);
                if fc.is_finite() && fc <= fx - ARMIJO * decrease {
                    accepted = Some((candidate, fc));
                    break;
                }
                t *= 0.5;
            }

            let (candidate, fc) = match accepted {
                Some(found) => found,
                None => {
                    return Err(OptimizeError::LineSearch {
                        method: Self::NAME,
                        iterations: iteration,
                    })
                }
            };

            let reduction = (fx - fc) / fx.abs().max(fc.abs()).max(1.0);
            x = candidate;
            fx = fc;
            step = (t * 2.0).min(1e6);
            stalled = reduction <= budget.tolerance;
        }

        Err(OptimizeError::NotConverged {
            method: Self::NAME,
            iterations: budget.max_iterations,
        })
    }
}

/// Nelder-Mead simplex search; every vertex is projected into the box.
#[derive(Debug, Clone, Copy, Default)]
pub struct NelderMead;

impl NelderMead {
    const NAME: &'static str = "nelder-mead";

    fn combine(a: &[f64], b: &[f64], coefficient: f64, bounds: Bounds) -> Vec<f64> {
        // a + coefficient * (a - b)
        a.iter()
            .zip(b)
            .map(|(&ai, &bi)| bounds.clamp(ai + coefficient * (ai - bi)))
            .collect()
    }
}

impl Minimizer for NelderMead {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn minimize(
        &self,
        f: &Objective<'_>,
        x0: &[f64],
        bounds: Bounds,
        budget: &Budget,
    ) -> Result<Minimum, OptimizeError> {
        let start = start_point(x0, bounds)?;
        let n = start.len();
        let delta = 0.05 * bounds.width().max(f64::MIN_POSITIVE);

        let mut simplex = vec![start.clone()];
        for i in 0..n {
            let mut vertex = start.clone();
            vertex[i] = if vertex[i] + delta <= bounds.upper {
                vertex[i] + delta
            } else {
                vertex[i] - delta
            };
            bounds.project(&mut vertex);
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex.iter().map(|v| rank(f(v))).collect();
        finite(values[0], Self::NAME)?;

        let x_tolerance = budget.tolerance.sqrt() * bounds.width().max(1.0);
        let max_iterations = budget.max_iterations.max(200 * n);

        for iteration in 1..=max_iterations {
            if budget.expired() {
                return Err(OptimizeError::DeadlineExceeded {
                    method: Self::NAME,
                    iterations: iteration,
                });
            }

            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            simplex = order.iter().map(|&k| simplex[k].clone()).collect();
            values = order.iter().map(|&k| values[k]).collect();

            let best = values[0];
            let worst = values[n];
            let diameter = simplex[1..]
                .iter()
                .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
                .fold(0.0, f64::max);
            if best.is_finite()
                && (worst - best).abs() <= budget.tolerance * best.abs().max(1.0)
                && diameter <= x_tolerance
            {
                return Ok(Minimum {
                    x: simplex[0].clone(),
                    value: best,
                    iterations: iteration,
                });
            }

            let mut centroid = vec![0.0; n];
            for vertex in &simplex[..n] {
                for (c, v) in centroid.iter_mut().zip(vertex) {
                    *c += v / n as f64;
                }
            }

            let reflected = Self::combine(&centroid, &simplex[n], 1.0, bounds);
            let f_reflected = rank(f(&reflected));

            if f_reflected < best {
                let expanded = Self::combine(&centroid, &simplex[n], 2.0, bounds);
                let f_expanded = rank(f(&expanded));
                if f_expanded < f_reflected {
                    simplex[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    simplex[n] = reflected;
                    values[n] = f_reflected;
                }
                continue;
            }

            if f_reflected < values[n - 1] {
                simplex[n] = reflected;
                values[n] = f_reflected;
                continue;
            }

            let (contracted, bar) = if f_reflected < worst {
                (Self::combine(&centroid, &reflected, -0.5, bounds), f_reflected)
            } else {
                (Self::combine(&centroid, &simplex[n], -0.5, bounds), worst)
            };
            let f_contracted = rank(f(&contracted));
            if f_contracted < bar {
                simplex[n] = contracted;
                values[n] = f_contracted;
                continue;
            }

            // shrink towards the best vertex
            let anchor = simplex[0].clone();
            for k in 1..=n {
                simplex[k] = Self::combine(&anchor, &simplex[k], -0.5, bounds);
                values[k] = rank(f(&simplex[k]));
            }
        }

        Err(OptimizeError::NotConverged {
            method: Self::NAME,
            iterations: max_iterations,
        })
    }
}

/// Compass search: try each coordinate in both directions, then the
/// all-coordinates diagonal, and halve the step when nothing improves.
///
/// The diagonal step shifts every coordinate together, which keeps the
/// deviations from the mean fixed and so crosses the `x_i = mean` kinks
/// that stop single-coordinate moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternSearch;

impl PatternSearch {
    const NAME: &'static str = "pattern-search";
}

impl Minimizer for PatternSearch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn minimize(
        &self,
        f: &Objective<'_>,
        x0: &[f64],
        bounds: Bounds,
        budget: &Budget,
    ) -> Result<Minimum, OptimizeError> {
        let mut x = start_point(x0, bounds)?;
        let mut fx = finite(f(&x), Self::NAME)?;
        let mut step = 0.25 * bounds.width();
        let min_step = budget.tolerance * bounds.width().max(1.0);

        if step <= min_step {
            return Ok(Minimum {
                x,
                value: fx,
                iterations: 0,
            });
        }

        for iteration in 1..=budget.max_iterations {
            if budget.expired() {
                return Err(OptimizeError::DeadlineExceeded {
                    method: Self::NAME,
                    iterations: iteration,
                });
            }

            let mut improved = false;
            for i in 0..x.len() {
                let current = x[i];
                for direction in [1.0, -1.0] {
                    let candidate = bounds.clamp(current + direction * step);
                    if candidate == current {
                        continue;
                    }
                    x[i] = candidate;
                    let fc = f(&x);
                    if fc.is_finite() && fc < fx {
                        fx = fc;
                        improved = true;
                        break;
                    }
                    x[i] = current;
                }
            }

            if !improved && x.len() > 1 {
                for direction in [1.0, -1.0] {
                    let candidate: Vec<f64> =
                        x.iter().map(|&xi| bounds.clamp(xi + direction * step)).collect();
                    if candidate == x {
                        continue;
                    }
                    let fc = f(&candidate);
                    if fc.is_finite() && fc < fx {
                        x = candidate;
                        fx = fc;
                        improved = true;
                        break;
                    }
                }
            }

            if !improved {
                step *= 0.5;
                if step < min_step {
                    return Ok(Minimum {
                        x,
                        value: fx,
                        iterations: iteration,
                    });
                }
            }
        }

        Err(OptimizeError::NotConverged {
            method: Self::NAME,
            iterations: budget.max_iterations,
        })
    }
}

/// Differential evolution (rand/1/bin with dithered scale factor).
///
/// The starting point is seeded into the initial population, the rest is
/// drawn uniformly from the box.
#[derive(Debug, Clone, Copy)]
pub struct DifferentialEvolution {
    /// Maximum generations.
    pub generations: usize,
    /// Population size per dimension.
    pub population_factor: usize,
    /// Crossover probability.
    pub crossover: f64,
    /// Range the scale factor is drawn from each generation.
    pub mutation: (f64, f64),
    /// Convergence tolerance on the spread of population values.
    pub spread_tolerance: f64,
    /// Random seed; entropy if `None`.
    pub seed: Option<u64>,
}

impl Default for DifferentialEvolution {
    fn default() -> Self {
        Self {
            generations: 300,
            population_factor: 15,
            crossover: 0.7,
            mutation: (0.5, 1.0),
            spread_tolerance: 0.01,
            seed: None,
        }
    }
}

impl DifferentialEvolution {
    const NAME: &'static str = "differential-evolution";

    /// Differential evolution sized from a solver configuration.
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            generations: config.global_generations,
            population_factor: config.global_population_factor,
            seed: config.seed,
            ..Default::default()
        }
    }

    fn distinct<R: Rng>(rng: &mut R, size: usize, exclude: usize) -> [usize; 3] {
        let mut picked = [exclude; 3];
        for k in 0..3 {
            loop {
                let candidate = rng.gen_range(0..size);
                if candidate != exclude && !picked[..k].contains(&candidate) {
                    picked[k] = candidate;
                    break;
                }
            }
        }
        picked
    }
}

impl Minimizer for DifferentialEvolution {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn minimize(
        &self,
        f: &Objective<'_>,
        x0: &[f64],
        bounds: Bounds,
        budget: &Budget,
    ) -> Result<Minimum, OptimizeError> {
        let start = start_point(x0, bounds)?;
        let n = start.len();
        let size = (self.population_factor * n).max(5);
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut population = vec![start];
        while population.len() < size {
            population.push(
                (0..n)
                    .map(|_| bounds.lower + rng.gen::<f64>() * bounds.width())
                    .collect(),
            );
        }
        let mut values: Vec<f64> = population.iter().map(|v| rank(f(v))).collect();

        let mut generations_used = 0;
        for generation in 1..=self.generations {
            if budget.expired() {
                return Err(OptimizeError::DeadlineExceeded {
                    method: Self::NAME,
                    iterations: generation,
                });
            }
            generations_used = generation;

            let scale = rng.gen_range(self.mutation.0..=self.mutation.1);
            for i in 0..size {
                let [a, b, c] = Self::distinct(&mut rng, size, i);
                let forced = rng.gen_range(0..n);
                let trial: Vec<f64> = (0..n)
                    .map(|j| {
                        if j == forced || rng.gen::<f64>() < self.crossover {
                            bounds.clamp(
                                population[a][j] + scale * (population[b][j] - population[c][j]),
                            )
                        } else {
                            population[i][j]
                        }
                    })
                    .collect();
                let f_trial = rank(f(&trial));
                if f_trial <= values[i] {
                    population[i] = trial;
                    values[i] = f_trial;
                }
            }

            if values.iter().all(|v| v.is_finite()) {
                let mean = values.iter().sum::<f64>() / size as f64;
                let variance =
                    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / size as f64;
                if variance.sqrt() <= self.spread_tolerance * mean.abs() {
                    break;
                }
            }
        }

        let best = (0..size)
            .min_by(|&a, &b| values[a].total_cmp(&values[b]))
            .unwrap_or(0);
        let value = finite(values[best], Self::NAME)?;

        Ok(Minimum {
            x: population.swap_remove(best),
            value,
            iterations: generations_used,
        })
    }
}

/// Result of running a fallback chain.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// Accepted minimum and the method that found it.
    pub minimum: Option<(Minimum, &'static str)>,
    /// Diagnostics of methods that failed before one succeeded.
    pub failures: Vec<String>,
}

/// Ordered list of minimizers tried until one succeeds.
pub struct FallbackChain {
    methods: Vec<Box<dyn Minimizer>>,
}

impl FallbackChain {
    /// Chain of arbitrary methods.
    pub fn new(methods: Vec<Box<dyn Minimizer>>) -> Self {
        Self { methods }
    }

    /// Full chain: three local methods, then the global search.
    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(vec![
            Box::new(ProjectedGradient::default()),
            Box::new(NelderMead),
            Box::new(PatternSearch),
            Box::new(DifferentialEvolution::from_config(config)),
        ])
    }

    /// Deterministic local chain used for one-coordinate best responses.
    pub fn local() -> Self {
        Self::new(vec![Box::new(ProjectedGradient::default()), Box::new(PatternSearch)])
    }

    /// Method names in order.
    pub fn method_names(&self) -> Vec<&'static str> {
        self.methods.iter().map(|m| m.name()).collect()
    }

    /// Try each method in turn.
    pub fn run(
        &self,
        f: &Objective<'_>,
        x0: &[f64],
        bounds: Bounds,
        budget: &Budget,
    ) -> ChainOutcome {
        let mut failures = Vec::new();

        for method in &self.methods {
            match method.minimize(f, x0, bounds, budget) {
                Ok(minimum) => {
                    log::debug!(
                        "{} converged after {} iterations (value {:.6})",
                        method.name(),
                        minimum.iterations,
                        minimum.value
                    );
                    return ChainOutcome {
                        minimum: Some((minimum, method.name())),
                        failures,
                    };
                }
                Err(e) => {
                    log::debug!("optimizer failed: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        ChainOutcome {
            minimum: None,
            failures,
        }
    }
}

impl fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackChain")
            .field("methods", &self.method_names())
            .finish()
    }
}
