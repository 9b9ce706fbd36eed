//! Multivariate anomaly detection with an isolation forest.
//!
//! The numeric fields are combined into one feature matrix (missing cells
//! imputed with the column median, never altering the stored values) and an
//! ensemble of randomized partitioning trees is fit over it. A record's
//! anomaly score is derived from the average number of splits needed to
//! isolate it: points that separate quickly from the rest of the data score
//! close to 1. Tree construction is driven by a seeded RNG, so a fixed seed
//! reproduces the run exactly; varying the seed is an accepted source of
//! run-to-run variance.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use polars::prelude::AnyValue;

use ehrqa_model::finding::{Finding, MULTIVARIATE_FIELD};
use ehrqa_model::schema::{DetectorKind, FieldRule};

use crate::stats;
use crate::value::{is_missing, numeric_value, raw_value};

use super::{Detector, DetectorContext, DetectorOutput};

/// Subsample ceiling per tree, from the original isolation forest
/// construction.
const MAX_TREE_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Fit-then-score multivariate outlier detector. The forest is fit once per
/// run and never refit mid-run.
pub struct IsolationForestDetector;

impl Detector for IsolationForestDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::IsolationForest
    }

    fn evaluate(&self, ctx: &DetectorContext<'_>) -> DetectorOutput {
        let mut out = DetectorOutput::new();

        let fields: Vec<(&str, &FieldRule)> = ctx
            .schema
            .fields_enabling(self.kind())
            .into_iter()
            .filter(|(_, rule)| rule.is_numeric())
            .collect();

        if fields.len() < ctx.config.min_numeric_fields_for_model {
            out.skip(
                self.kind(),
                format!(
                    "{} numeric field(s) enabled, need {}; multivariate \
                     detection is meaningless on a single dimension",
                    fields.len(),
                    ctx.config.min_numeric_fields_for_model
                ),
            );
            return out;
        }
        if ctx.height() < 2 {
            out.skip(self.kind(), "fewer than 2 records".to_string());
            return out;
        }

        let rows = match feature_matrix(ctx, &fields) {
            Ok(rows) => rows,
            Err(message) => {
                out.fail_field(self.kind(), MULTIVARIATE_FIELD, message);
                return out;
            }
        };

        let forest = Forest::fit(
            &rows,
            ctx.config.isolation_forest_estimators,
            ctx.config.isolation_forest_seed,
        );
        let scores: Vec<f64> = rows.iter().map(|row| forest.score(row)).collect();

        let ranked = stats::sorted(scores.clone());
        let Some(threshold) =
            stats::quantile(&ranked, 1.0 - ctx.config.isolation_forest_contamination)
        else {
            return out;
        };

        for (idx, score) in scores.iter().enumerate() {
            if *score > threshold {
                out.findings.push(Finding::new(
                    idx,
                    MULTIVARIATE_FIELD,
                    self.kind(),
                    describe_record(ctx, &fields, idx),
                    *score,
                    format!(
                        "multivariate anomaly score {score:.3} above threshold {threshold:.3}"
                    ),
                ));
            }
        }
        out
    }
}

/// One row per record, one column per enabled numeric field, median-imputed.
fn feature_matrix(
    ctx: &DetectorContext<'_>,
    fields: &[(&str, &FieldRule)],
) -> Result<Vec<Vec<f64>>, String> {
    let height = ctx.height();
    let mut rows = vec![Vec::with_capacity(fields.len()); height];

    for (field, rule) in fields {
        let column = ctx
            .columns
            .column(field)
            .ok_or_else(|| format!("no column for field '{field}'"))?;
        let series = ctx
            .dataset
            .column(column)
            .map_err(|err| err.to_string())?;

        let mut cells: Vec<Option<f64>> = Vec::with_capacity(height);
        for idx in 0..height {
            let value = series.get(idx).unwrap_or(AnyValue::Null);
            if is_missing(&value, rule, ctx.config) {
                cells.push(None);
            } else {
                cells.push(numeric_value(&value));
            }
        }

        let present = stats::sorted(cells.iter().flatten().copied().collect());
        let fill = stats::median(&present).unwrap_or(0.0);
        for (idx, cell) in cells.into_iter().enumerate() {
            rows[idx].push(cell.unwrap_or(fill));
        }
    }
    Ok(rows)
}

/// Raw feature values of a flagged record, e.g. "age=400, glucose=92".
/// A joint anomaly has no single offending cell, so the finding embeds the
/// whole feature vector.
fn describe_record(ctx: &DetectorContext<'_>, fields: &[(&str, &FieldRule)], idx: usize) -> String {
    let mut parts = Vec::with_capacity(fields.len());
    for (field, _) in fields {
        let text = ctx
            .columns
            .column(field)
            .and_then(|column| ctx.dataset.column(column).ok())
            .map(|series| raw_value(&series.get(idx).unwrap_or(AnyValue::Null)))
            .unwrap_or_default();
        if text.is_empty() {
            parts.push(format!("{field}=null"));
        } else {
            parts.push(format!("{field}={text}"));
        }
    }
    parts.join(", ")
}

enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

struct Forest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl Forest {
    fn fit(rows: &[Vec<f64>], estimators: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let sample_size = rows.len().min(MAX_TREE_SAMPLES);
        let depth_limit = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..estimators)
            .map(|_| {
                let indices = sample_indices(rows.len(), sample_size, &mut rng);
                build_tree(rows, &indices, 0, depth_limit, &mut rng)
            })
            .collect();
        Self { trees, sample_size }
    }

    /// Normalized anomaly score in [0, 1]; higher is more anomalous.
    fn score(&self, row: &[f64]) -> f64 {
        let mean_path = self
            .trees
            .iter()
            .map(|tree| path_length(tree, row, 0.0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let normalizer = average_path_length(self.sample_size);
        if normalizer <= 0.0 {
            return 0.0;
        }
        2f64.powf(-mean_path / normalizer)
    }
}

/// Uniform subsample without replacement via partial Fisher-Yates.
fn sample_indices(n: usize, k: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n);
        pool.swap(i, j);
    }
    pool.truncate(k);
    pool
}

fn build_tree(
    rows: &[Vec<f64>],
    indices: &[usize],
    depth: usize,
    limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    // Only features with spread at this node can split it.
    let dims = rows[indices[0]].len();
    let mut candidates = Vec::new();
    for feature in 0..dims {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &i in indices {
            let v = rows[i][feature];
            min = min.min(v);
            max = max.max(v);
        }
        if max > min {
            candidates.push((feature, min, max));
        }
    }
    if candidates.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(min..max);
    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| rows[i][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(rows, &left, depth + 1, limit, rng)),
        right: Box::new(build_tree(rows, &right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, row: &[f64], depth: f64) -> f64 {
    match node {
        Node::Leaf { size } => depth + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] < *threshold {
                path_length(left, row, depth + 1.0)
            } else {
                path_length(right, row, depth + 1.0)
            }
        }
    }
}

/// Average path length of an unsuccessful binary search over n points, the
/// normalization constant c(n) from the isolation forest construction.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}
