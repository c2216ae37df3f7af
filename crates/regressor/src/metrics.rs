use std::fmt::Display;

use serde::Serialize;

/// Regression quality on one evaluation pass.
#[derive(Clone, Debug, Serialize)]
pub struct EvalMetrics {
    /// Mean squared error.
    pub mse: f32,
    /// Root-mean-squared error.
    pub rmse: f32,
    /// Coefficient of determination.
    pub r2: f32,
    /// Pearson correlation coefficient.
    pub pearson: f32,
}

impl Display for EvalMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MSE: {:.3}, RMSE: {:.3}, R²: {:.3}, Pearson: {:.3}",
            self.mse, self.rmse, self.r2, self.pearson,
        )
    }
}

fn mean(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        return f32::NAN;
    }
    xs.iter().copied().sum::<f32>() / (xs.len() as f32)
}

fn pearson_corr(xs: &[f32], ys: &[f32]) -> f32 {
    if xs.len() != ys.len() || xs.len() < 2 {
        return f32::NAN;
    }

    let mx = mean(xs);
    let my = mean(ys);

    let mut sxx = 0.0f32;
    let mut syy = 0.0f32;
    let mut sxy = 0.0f32;

    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    let denom = (sxx * syy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return f32::NAN;
    }
    sxy / denom
}

/// Errors are accumulated in f64. R² and Pearson are NaN for fewer than two points or a
/// constant target.
pub fn regression_metrics(preds: &[f32], labels: &[f32]) -> EvalMetrics {
    let n = preds.len().min(labels.len());
    if n == 0 {
        return EvalMetrics { mse: f32::NAN, rmse: f32::NAN, r2: f32::NAN, pearson: f32::NAN };
    }
    let (preds, labels) = (&preds[..n], &labels[..n]);

    let se_sum: f64 = preds
        .iter()
        .zip(labels)
        .map(|(p, y)| {
            let err = (p - y) as f64;
            err * err
        })
        .sum();
    let mse = se_sum / n as f64;

    let y_mean = mean(labels) as f64;
    let ss_tot: f64 = labels.iter().map(|&y| (y as f64 - y_mean).powi(2)).sum();
    let r2 = if n < 2 || ss_tot == 0.0 { f64::NAN } else { 1.0 - se_sum / ss_tot };

    EvalMetrics {
        mse: mse as f32,
        rmse: mse.sqrt() as f32,
        r2: r2 as f32,
        pearson: pearson_corr(preds, labels),
    }
}
