use crate::dataset::{BatchSet, WindowBatch};
use crate::model::notes::NoteRow;
use crate::synthesizer::rows_from_predictions;
use anyhow::bail;
use log::info;
use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// The adversarial model behind the pipeline. The pipeline never looks
/// inside: it only hands over noise and real batches and gets losses and
/// generated sequences back. Generated output must be one row per noise
/// row, each row as wide as the training windows.
pub trait GanEngine {
    /// One discriminator update on a real pitch batch against `fake`
    /// sequences the pipeline already sampled. Returns the loss.
    fn train_discriminator_step(&mut self, real: &WindowBatch, fake: &Array2<f64>) -> anyhow::Result<f64>;

    /// One generator update from latent noise. Returns the loss.
    fn train_generator_step(&mut self, noise: &Array2<f64>) -> anyhow::Result<f64>;

    /// Generates sequences from latent noise, one per noise row.
    fn generate(&mut self, noise: &Array2<f64>) -> anyhow::Result<Array2<f64>>;
}

#[derive(Debug, Clone, Copy)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub latent_dim: usize,
    pub seed: u64,
    /// Log losses every this many epochs; zero disables loss logging.
    pub log_every: usize,
    /// Decode a sample every this many epochs; zero disables sampling.
    pub sample_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> TrainingConfig {
        TrainingConfig {
            epochs: 100,
            latent_dim: 256,
            seed: 42,
            log_every: 2,
            sample_every: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EpochLosses {
    pub epoch: usize,
    pub discriminator: f64,
    pub generator: f64,
}

/// Runs the adversarial loop over pre-assembled pitch batches: per epoch one
/// discriminator step on real-vs-generated and one generator step on fresh
/// noise. Periodically decodes a generated sequence into note rows and hands
/// it to `sample_sink` (which typically writes a MIDI file). Engine errors
/// abort the run; a failed sample decode does too, since it means the
/// generator left the pitch range entirely.
pub fn run_training<E, S>(
    engine: &mut E,
    batches: &[BatchSet],
    config: &TrainingConfig,
    mut sample_sink: S,
) -> anyhow::Result<Vec<EpochLosses>>
where
    E: GanEngine,
    S: FnMut(usize, Vec<NoteRow>) -> anyhow::Result<()>,
{
    if batches.is_empty() {
        bail!("No training batches supplied..!");
    }
    let window_len = batches[0].pitch.inputs.ncols();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        let real = &batches[epoch % batches.len()].pitch;
        let rows = real.inputs.nrows();

        let fake = engine.generate(&noise_batch(&mut rng, rows, config.latent_dim))?;
        if fake.dim() != (rows, window_len) {
            bail!(
                "Generator returned shape {:?}, expected ({}, {})..!",
                fake.dim(),
                rows,
                window_len
            );
        }
        let discriminator = engine.train_discriminator_step(real, &fake)?;
        let generator = engine.train_generator_step(&noise_batch(&mut rng, rows, config.latent_dim))?;

        if config.log_every > 0 && epoch % config.log_every == 0 {
            info!(
                "Epoch {}: d_loss {:.6}, g_loss {:.6}",
                epoch, discriminator, generator
            );
        }

        if config.sample_every > 0 && epoch % config.sample_every == 0 {
            let sample = engine.generate(&noise_batch(&mut rng, 1, config.latent_dim))?;
            if sample.nrows() == 0 {
                bail!("Generator returned an empty sample batch..!");
            }
            let rows = rows_from_predictions(&sample.row(0).to_vec())?;
            sample_sink(epoch, rows)?;
        }

        history.push(EpochLosses {
            epoch,
            discriminator,
            generator,
        });
    }

    Ok(history)
}

// Standard normal noise via Box-Muller, deterministic per training seed.
fn noise_batch(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> Array2<f64> {
    let len = rows * cols;
    let mut data = Vec::with_capacity(len + 1);
    while data.len() < len {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen_range(0.0..1.0);
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = std::f64::consts::TAU * u2;
        data.push(radius * theta.cos());
        data.push(radius * theta.sin());
    }
    data.truncate(len);
    Array2::from_shape_vec((rows, cols), data).expect("rows * cols matches the generated noise")
}
