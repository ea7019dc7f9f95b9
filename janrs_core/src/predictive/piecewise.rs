//! Piecewise-linear approximation of scalar functions and its encodings as MIP rows
//!
//! The function `g` is sampled at breakpoints `t_0 < ... < t_{n-1}` and linearly interpolated in
//! between. The interpolant is encoded on an input column `z` (restricted to `[t_0, t_{n-1}]`)
//! and an output column `p` so that `p = interp(z)`.
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::optimize::constraint::Relation;
use crate::optimize::problem::Column;
use crate::optimize::variable::VariableType;
use crate::predictive::lowering::LoweringContext;

/// How the interpolant is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiecewiseFormulation {
    /// Convex combination weights on the breakpoints, with binary interval variables forcing at
    /// most two adjacent non-zero weights. Exact for any function.
    #[default]
    Sos2,
    /// Binary selection of one interval, with big-M relaxed segment rows for all other intervals.
    /// Exact for any function.
    BigM,
    /// Convex combination weights only, no binaries. The result is an LP, but it only matches the
    /// interpolant when the optimization pushes `p` towards the interpolant (concave `g` with `p`
    /// pushed up, convex `g` with `p` pushed down).
    ConvexCombination,
}

impl Display for PiecewiseFormulation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PiecewiseFormulation::Sos2 => write!(f, "sos2"),
            PiecewiseFormulation::BigM => write!(f, "big_m"),
            PiecewiseFormulation::ConvexCombination => write!(f, "convex_combination"),
        }
    }
}

/// Shape of the interpolant through a set of sampled points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curvature {
    Affine,
    Convex,
    Concave,
    Mixed,
}

/// `n` equally spaced points from `lower` to `upper` (both included)
pub fn uniform_breakpoints(lower: f64, upper: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lower],
        _ => {
            let step = (upper - lower) / (n - 1) as f64;
            let mut points: Vec<f64> = (0..n).map(|k| lower + step * k as f64).collect();
            // avoid accumulated rounding at the far end
            points[n - 1] = upper;
            points
        }
    }
}

/// Evaluate the interpolant through `(breakpoints, values)` at `z`
///
/// Outside the breakpoint range the closest end value is returned.
pub fn interpolate(breakpoints: &[f64], values: &[f64], z: f64) -> f64 {
    debug_assert_eq!(breakpoints.len(), values.len());
    let n = breakpoints.len();
    if n == 0 {
        return f64::NAN;
    }
    if z <= breakpoints[0] {
        return values[0];
    }
    if z >= breakpoints[n - 1] {
        return values[n - 1];
    }
    let k = breakpoints.partition_point(|t| *t <= z).saturating_sub(1).min(n - 2);
    let width = breakpoints[k + 1] - breakpoints[k];
    let share = (z - breakpoints[k]) / width;
    values[k] + share * (values[k + 1] - values[k])
}

/// Classify the interpolant by the monotonicity of its segment slopes
pub fn curvature(breakpoints: &[f64], values: &[f64], tolerance: f64) -> Curvature {
    let slopes: Vec<f64> = breakpoints
        .windows(2)
        .zip(values.windows(2))
        .map(|(t, g)| (g[1] - g[0]) / (t[1] - t[0]))
        .collect();
    let mut increasing = true;
    let mut decreasing = true;
    let mut constant = true;
    for pair in slopes.windows(2) {
        let change = pair[1] - pair[0];
        if change > tolerance {
            decreasing = false;
            constant = false;
        } else if change < -tolerance {
            increasing = false;
            constant = false;
        }
    }
    match (constant, increasing, decreasing) {
        (true, _, _) => Curvature::Affine,
        (false, true, _) => Curvature::Convex,
        (false, _, true) => Curvature::Concave,
        _ => Curvature::Mixed,
    }
}

/// Add rows and columns enforcing `output = interp(input)` with the given formulation
///
/// The caller is responsible for bounding `input` to the breakpoint range. At least two
/// breakpoints are required.
pub(crate) fn encode(
    ctx: &mut LoweringContext<'_>,
    input: Column,
    output: Column,
    breakpoints: &[f64],
    values: &[f64],
    formulation: PiecewiseFormulation,
) {
    debug_assert!(breakpoints.len() >= 2);
    match formulation {
        PiecewiseFormulation::Sos2 => {
            let lambdas = encode_convex_combination(ctx, input, output, breakpoints, values);
            encode_adjacency(ctx, &lambdas);
        }
        PiecewiseFormulation::ConvexCombination => {
            let shape = curvature(breakpoints, values, ctx.tolerance());
            if shape == Curvature::Mixed {
                warn!(
                    variable = ctx.variable(),
                    "convex combination requested for an interpolant that is neither convex nor concave, the result may not follow the interpolant"
                );
            }
            encode_convex_combination(ctx, input, output, breakpoints, values);
        }
        PiecewiseFormulation::BigM => encode_big_m(ctx, input, output, breakpoints, values),
    }
}

/// Weights `lambda_k` in `[0, 1]` summing to one, with `input = sum(t_k lambda_k)` and
/// `output = sum(g_k lambda_k)`
fn encode_convex_combination(
    ctx: &mut LoweringContext<'_>,
    input: Column,
    output: Column,
    breakpoints: &[f64],
    values: &[f64],
) -> Vec<Column> {
    let lambdas: Vec<Column> = (0..breakpoints.len())
        .map(|k| ctx.add_column(&format!("lambda_{}", k), 0., 1., VariableType::Continuous))
        .collect();
    ctx.add_row(
        "lambda_sum",
        lambdas.iter().map(|l| (*l, 1.)).collect(),
        Relation::Equal,
        1.,
    );

    let mut input_terms = vec![(input, 1.)];
    input_terms.extend(lambdas.iter().zip(breakpoints).map(|(l, t)| (*l, -t)));
    ctx.add_row("input_link", input_terms, Relation::Equal, 0.);

    let mut output_terms = vec![(output, 1.)];
    output_terms.extend(lambdas.iter().zip(values).map(|(l, g)| (*l, -g)));
    ctx.add_row("output_link", output_terms, Relation::Equal, 0.);
    lambdas
}

/// Binary `y_k` per interval, exactly one chosen, and `lambda_k <= y_{k-1} + y_k`
fn encode_adjacency(ctx: &mut LoweringContext<'_>, lambdas: &[Column]) {
    let intervals = lambdas.len() - 1;
    let selectors: Vec<Column> = (0..intervals)
        .map(|k| ctx.add_column(&format!("interval_{}", k), 0., 1., VariableType::Binary))
        .collect();
    ctx.add_row(
        "interval_choice",
        selectors.iter().map(|y| (*y, 1.)).collect(),
        Relation::Equal,
        1.,
    );
    for (k, lambda) in lambdas.iter().enumerate() {
        let mut terms = vec![(*lambda, 1.)];
        if k > 0 {
            terms.push((selectors[k - 1], -1.));
        }
        if k < intervals {
            terms.push((selectors[k], -1.));
        }
        ctx.add_row(&format!("adjacency_{}", k), terms, Relation::LessEqual, 0.);
    }
}

/// Binary `y_k` per interval. When `y_k = 1`, `input` lies in interval k and `output` on its
/// segment. Otherwise the rows are relaxed by constants large enough to never bind.
fn encode_big_m(
    ctx: &mut LoweringContext<'_>,
    input: Column,
    output: Column,
    breakpoints: &[f64],
    values: &[f64],
) {
    let n = breakpoints.len();
    let lower = breakpoints[0];
    let upper = breakpoints[n - 1];
    let input_m = upper - lower;
    // segment k is output = slope * input + offset
    let segments: Vec<(f64, f64)> = (0..n - 1)
        .map(|k| {
            let slope = (values[k + 1] - values[k]) / (breakpoints[k + 1] - breakpoints[k]);
            (slope, values[k] - slope * breakpoints[k])
        })
        .collect();
    let at = |(slope, offset): (f64, f64), z: f64| slope * z + offset;

    let selectors: Vec<Column> = (0..n - 1)
        .map(|k| ctx.add_column(&format!("interval_{}", k), 0., 1., VariableType::Binary))
        .collect();
    ctx.add_row(
        "interval_choice",
        selectors.iter().map(|y| (*y, 1.)).collect(),
        Relation::Equal,
        1.,
    );

    for (k, (&segment, &y)) in segments.iter().zip(&selectors).enumerate() {
        // input - M y >= t_k - M
        ctx.add_row(
            &format!("interval_lower_{}", k),
            vec![(input, 1.), (y, -input_m)],
            Relation::GreaterEqual,
            breakpoints[k] - input_m,
        );
        // input + M y <= t_{k+1} + M
        ctx.add_row(
            &format!("interval_upper_{}", k),
            vec![(input, 1.), (y, input_m)],
            Relation::LessEqual,
            breakpoints[k + 1] + input_m,
        );

        // largest gap between this segment and any other over the input range
        let segment_m = segments
            .iter()
            .flat_map(|&other| {
                [lower, upper]
                    .into_iter()
                    .map(move |z| (at(other, z) - at(segment, z)).abs())
            })
            .fold(0., f64::max);
        let (slope, offset) = segment;
        ctx.add_row(
            &format!("segment_upper_{}", k),
            vec![(output, 1.), (input, -slope), (y, segment_m)],
            Relation::LessEqual,
            offset + segment_m,
        );
        ctx.add_row(
            &format!("segment_lower_{}", k),
            vec![(output, 1.), (input, -slope), (y, -segment_m)],
            Relation::GreaterEqual,
            offset - segment_m,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::objective::ObjectiveSense;
    use crate::optimize::problem::LinearProblem;
    use crate::predictive::sigmoid;

    #[test]
    fn breakpoints_span_the_interval() {
        let points = uniform_breakpoints(-2., 2., 5);
        assert_eq!(points, vec![-2., -1., 0., 1., 2.]);
        assert_eq!(uniform_breakpoints(1., 1., 1), vec![1.]);
        assert!(uniform_breakpoints(0., 1., 0).is_empty());
        let points = uniform_breakpoints(0.1, 0.7, 7);
        assert_eq!(*points.last().unwrap(), 0.7);
    }

    #[test]
    fn interpolation() {
        let t = [0., 1., 3.];
        let g = [0., 2., 0.];
        assert_eq!(interpolate(&t, &g, 0.5), 1.);
        assert_eq!(interpolate(&t, &g, 1.), 2.);
        assert_eq!(interpolate(&t, &g, 2.), 1.);
        assert_eq!(interpolate(&t, &g, -1.), 0.);
        assert_eq!(interpolate(&t, &g, 5.), 0.);
    }

    #[test]
    fn interpolation_error_shrinks_with_more_breakpoints() {
        let max_error = |n: usize| {
            let t = uniform_breakpoints(-4., 4., n);
            let g: Vec<f64> = t.iter().map(|z| sigmoid(*z)).collect();
            [-3.3, -1.7, -0.9, 0.35, 1.4, 2.6]
                .iter()
                .map(|z| (interpolate(&t, &g, *z) - sigmoid(*z)).abs())
                .fold(0., f64::max)
        };
        assert!(max_error(25) < max_error(5));
        assert!(max_error(25) < 2e-3);
    }

    #[test]
    fn curvature_classification() {
        let t = uniform_breakpoints(-3., 3., 7);
        let square: Vec<f64> = t.iter().map(|z| z * z).collect();
        let negated: Vec<f64> = square.iter().map(|v| -v).collect();
        let line: Vec<f64> = t.iter().map(|z| 2. * z + 1.).collect();
        let logistic: Vec<f64> = t.iter().map(|z| sigmoid(*z)).collect();
        assert_eq!(curvature(&t, &square, 1e-12), Curvature::Convex);
        assert_eq!(curvature(&t, &negated, 1e-12), Curvature::Concave);
        assert_eq!(curvature(&t, &line, 1e-9), Curvature::Affine);
        assert_eq!(curvature(&t, &logistic, 1e-12), Curvature::Mixed);
    }

    fn encoded(formulation: PiecewiseFormulation) -> LinearProblem {
        let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
        let z = problem.add_column("z", -1., 1., VariableType::Continuous, 0.);
        let p = problem.add_column("p", f64::NEG_INFINITY, f64::INFINITY, VariableType::Continuous, 1.);
        let t = uniform_breakpoints(-1., 1., 3);
        let g = [0., 1., 0.];
        let mut ctx = LoweringContext::new(&mut problem, "p", 1e-9);
        encode(&mut ctx, z, p, &t, &g, formulation);
        problem
    }

    #[test]
    fn sos2_encoding_size() {
        let problem = encoded(PiecewiseFormulation::Sos2);
        // z, p, 3 lambdas, 2 interval binaries
        assert_eq!(problem.num_columns(), 7);
        // lambda_sum, input_link, output_link, interval_choice, 3 adjacency rows
        assert_eq!(problem.num_rows(), 7);
        assert!(problem.has_integer_columns());
    }

    #[test]
    fn convex_combination_has_no_binaries() {
        let problem = encoded(PiecewiseFormulation::ConvexCombination);
        assert_eq!(problem.num_columns(), 5);
        assert_eq!(problem.num_rows(), 3);
        assert!(!problem.has_integer_columns());
    }

    #[test]
    fn big_m_rows_hold_on_the_interpolant() {
        let problem = encoded(PiecewiseFormulation::BigM);
        // z, p, 2 interval binaries
        assert_eq!(problem.num_columns(), 4);
        // interval_choice plus four rows per interval
        assert_eq!(problem.num_rows(), 9);
        // z = 0.5 lies in the second interval, p = interp(0.5) = 0.5
        let point = [0.5, 0.5, 0., 1.];
        assert!(problem.violated_rows(&point, 1e-9).is_empty());
        // a point off the interpolant violates a segment row
        let off = [0.5, 0.9, 0., 1.];
        assert!(!problem.violated_rows(&off, 1e-9).is_empty());
    }
}
