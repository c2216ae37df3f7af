//! Head training loop: AdamW with linear warmup/decay, global-norm clipping, per-epoch
//! evaluation and checkpointing, best checkpoint restored at the end.

use std::path::{Path, PathBuf};

use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use records::TrainingExample;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collator::DualEncoderCollator;
use crate::metrics::{regression_metrics, EvalMetrics};
use crate::network::DualEncoderRegressor;
use crate::{RegressorError, Result};

pub const HEAD_WEIGHTS_FILE: &str = "head.safetensors";
pub const TRAINER_STATE_FILE: &str = "trainer_state.json";

#[derive(Clone, Debug)]
pub struct TrainingArgs {
    pub output_dir: PathBuf,
    pub train_batch_size: usize,
    pub eval_batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub warmup_steps: usize,
    pub max_grad_norm: f64,
    pub logging_steps: usize,
    pub seed: u64,
}

impl Default for TrainingArgs {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            train_batch_size: 8,
            eval_batch_size: 8,
            epochs: 5,
            learning_rate: 5e-6,
            weight_decay: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            warmup_steps: 500,
            max_grad_norm: 1.0,
            logging_steps: 50,
            seed: 42,
        }
    }
}

impl TrainingArgs {
    /// Learning rate for the update at `step` (0-based): linear ramp over `warmup_steps`, then
    /// linear decay to zero at `total_steps`.
    pub fn lr_at(&self, step: usize, total_steps: usize) -> f64 {
        if step < self.warmup_steps {
            return self.learning_rate * step as f64 / self.warmup_steps as f64;
        }
        let remaining = total_steps.saturating_sub(step) as f64;
        let span = total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
        self.learning_rate * (remaining / span).max(0.0)
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct LogEntry {
    pub step: usize,
    pub epoch: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grad_norm: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval: Option<EvalMetrics>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct TrainerState {
    pub global_step: usize,
    pub epochs: usize,
    pub best_checkpoint: Option<PathBuf>,
    pub best_eval_rmse: Option<f32>,
    pub final_eval: Option<EvalMetrics>,
    pub log_history: Vec<LogEntry>,
}

impl TrainerState {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// Runs the model in inference mode over `examples`, `batch_size` at a time.
pub fn predict_batches(
    model: &DualEncoderRegressor,
    collator: &DualEncoderCollator,
    examples: &[TrainingExample],
    batch_size: usize,
) -> Result<Vec<f32>> {
    let mut preds = Vec::with_capacity(examples.len());
    for chunk in examples.chunks(batch_size.max(1)) {
        let batch = collator.collate(chunk)?;
        preds.extend(model.forward(&batch, false)?.to_vec1::<f32>()?);
    }
    Ok(preds)
}

pub struct Trainer {
    model: DualEncoderRegressor,
    varmap: VarMap,
    collator: DualEncoderCollator,
    args: TrainingArgs,
}

impl Trainer {
    /// `varmap` must be the map the model's head was built from.
    pub fn new(
        model: DualEncoderRegressor,
        varmap: VarMap,
        collator: DualEncoderCollator,
        args: TrainingArgs,
    ) -> Self {
        Self { model, varmap, collator, args }
    }

    pub fn model(&self) -> &DualEncoderRegressor {
        &self.model
    }

    pub fn evaluate(&self, examples: &[TrainingExample]) -> Result<EvalMetrics> {
        let preds = predict_batches(&self.model, &self.collator, examples, self.args.eval_batch_size)?;
        let labels: Vec<f32> = examples.iter().map(|e| e.label).collect();
        Ok(regression_metrics(&preds, &labels))
    }

    pub fn train(&mut self, train: &[TrainingExample], eval: &[TrainingExample]) -> Result<TrainerState> {
        if train.is_empty() {
            return Err(RegressorError::Config("training set is empty".into()));
        }
        let args = self.args.clone();
        std::fs::create_dir_all(&args.output_dir)?;

        let vars = self.varmap.all_vars();
        let mut opt = AdamW::new(
            vars.clone(),
            ParamsAdamW {
                lr: args.learning_rate,
                beta1: args.beta1,
                beta2: args.beta2,
                eps: args.eps,
                weight_decay: args.weight_decay,
            },
        )?;

        let batch_size = args.train_batch_size.max(1);
        let steps_per_epoch = train.len().div_ceil(batch_size);
        let total_steps = steps_per_epoch * args.epochs;
        info!(
            examples = train.len(),
            eval_examples = eval.len(),
            trainable = vars.iter().map(|v| v.elem_count()).sum::<usize>(),
            total_steps,
            "trainer: starting"
        );

        let mut rng = StdRng::seed_from_u64(args.seed);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut state = TrainerState { epochs: args.epochs, ..Default::default() };
        let mut step = 0usize;
        let mut running_loss = 0f32;
        let mut running_count = 0usize;

        for epoch in 1..=args.epochs {
            order.shuffle(&mut rng);

            for idx in order.chunks(batch_size) {
                let examples: Vec<TrainingExample> = idx.iter().map(|&i| train[i].clone()).collect();
                let batch = self.collator.collate(&examples)?;

                let preds = self.model.forward(&batch, true)?;
                let loss = candle_nn::loss::mse(&preds, &batch.labels)?;

                let lr = args.lr_at(step, total_steps);
                opt.set_learning_rate(lr);

                let mut grads = loss.backward()?;
                let grad_norm = clip_grad_norm(&vars, &mut grads, args.max_grad_norm)?;
                opt.step(&grads)?;
                step += 1;

                running_loss += loss.to_scalar::<f32>()?;
                running_count += 1;

                if args.logging_steps > 0 && step % args.logging_steps == 0 {
                    let avg = running_loss / running_count as f32;
                    info!(step, epoch, loss = avg, lr, grad_norm, "trainer: step");
                    state.log_history.push(LogEntry {
                        step,
                        epoch,
                        loss: Some(avg),
                        learning_rate: Some(lr),
                        grad_norm: Some(grad_norm),
                        eval: None,
                    });
                    running_loss = 0.0;
                    running_count = 0;
                }
            }

            let metrics = self.evaluate(eval)?;
            info!(epoch, step, %metrics, "trainer: eval");

            let checkpoint = args.output_dir.join(format!("checkpoint-{step}"));
            std::fs::create_dir_all(&checkpoint)?;
            let weights = checkpoint.join(HEAD_WEIGHTS_FILE);
            self.varmap.save(&weights)?;
            debug!(path = %weights.display(), "trainer: checkpoint saved");

            let improved = match state.best_eval_rmse {
                Some(best) => metrics.rmse < best,
                None => metrics.rmse.is_finite(),
            };
            if improved {
                state.best_eval_rmse = Some(metrics.rmse);
                state.best_checkpoint = Some(weights);
            }

            state.log_history.push(LogEntry { step, epoch, eval: Some(metrics), ..Default::default() });
        }
        state.global_step = step;

        match &state.best_checkpoint {
            Some(best) => {
                self.varmap.load(best)?;
                info!(path = %best.display(), rmse = ?state.best_eval_rmse, "trainer: best checkpoint restored");
            }
            None => warn!("trainer: no finite eval_rmse, keeping final weights"),
        }

        self.varmap.save(args.output_dir.join(HEAD_WEIGHTS_FILE))?;
        self.model.config().save(&args.output_dir)?;

        let final_eval = self.evaluate(eval)?;
        info!(metrics = %final_eval, "trainer: final eval");
        state.final_eval = Some(final_eval);

        state.write_json(&args.output_dir.join(TRAINER_STATE_FILE))?;
        Ok(state)
    }
}

/// Scales every gradient so the global L2 norm is at most `max_norm`; returns the norm before
/// clipping.
fn clip_grad_norm(vars: &[Var], grads: &mut candle_core::backprop::GradStore, max_norm: f64) -> Result<f32> {
    let mut sq_sum = 0f32;
    for var in vars {
        if let Some(g) = grads.get(var.as_tensor()) {
            sq_sum += g.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    let norm = sq_sum.sqrt();

    if max_norm > 0.0 && norm as f64 > max_norm {
        let scale = max_norm / (norm as f64 + 1e-6);
        for var in vars {
            if let Some(g) = grads.get(var.as_tensor()) {
                let scaled: Tensor = (g * scale)?;
                grads.insert(var.as_tensor(), scaled);
            }
        }
    }
    Ok(norm)
}
