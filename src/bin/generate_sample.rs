use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::Array3;
use parquet::arrow::ArrowWriter;

use rusty_rsa::{column, DatasetOps, DescriptorTable, Descriptors, FileFormat, TemporalDataset};

const N_CHANNEL: usize = 32;
const N_TIME: usize = 50;
const SAMPLE_RATE_HZ: f64 = 250.0;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Condition-specific spatial pattern: a smooth bump centred on one channel.
fn pattern(condition: usize, n_conditions: usize) -> Vec<f64> {
    let centre = (condition as f64 + 0.5) * N_CHANNEL as f64 / n_conditions as f64;
    (0..N_CHANNEL)
        .map(|c| (-(c as f64 - centre).powi(2) / 18.0).exp())
        .collect()
}

/// Evoked-response envelope peaking ~100 ms after onset.
fn envelope(t: usize) -> f64 {
    let seconds = t as f64 / SAMPLE_RATE_HZ;
    (-(seconds - 0.1).powi(2) / (2.0 * 0.03f64.powi(2))).exp()
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);

    let conditions = ["face", "house", "tool", "animal"];
    let runs = 3;

    let mut all_patterns: Vec<Vec<f64>> = Vec::new();
    let mut all_condition: Vec<&str> = Vec::new();
    let mut all_run: Vec<i64> = Vec::new();
    let mut all_id: Vec<i64> = Vec::new();

    for run in 0..runs {
        for (ci, &condition) in conditions.iter().enumerate() {
            let noisy = pattern(ci, conditions.len())
                .into_iter()
                .map(|v| v + rng.gauss(0.0, 0.1))
                .collect();
            all_patterns.push(noisy);
            all_condition.push(condition);
            all_run.push(run);
            all_id.push(all_id.len() as i64);
        }
    }

    // ---- Observation table (.parquet) ----
    let mut pattern_builder = ListBuilder::new(Float64Builder::new());
    for row in &all_patterns {
        pattern_builder.values().append_slice(row);
        pattern_builder.append(true);
    }
    let pattern_array = pattern_builder.finish();

    let schema = Arc::new(Schema::new(vec![
        Field::new(
            "pattern",
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            false,
        ),
        Field::new("condition", DataType::Utf8, false),
        Field::new("run", DataType::Int64, false),
        Field::new("trial_id", DataType::Int64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(pattern_array),
            Arc::new(StringArray::from(all_condition.clone())),
            Arc::new(Int64Array::from(all_run.clone())),
            Arc::new(Int64Array::from(all_id)),
        ],
    )
    .context("building record batch")?;

    let table_path = "sample_data.parquet";
    let file = std::fs::File::create(table_path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;

    println!(
        "Wrote {} observations ({} channels each) to {table_path}",
        all_patterns.len(),
        N_CHANNEL
    );

    // ---- Temporal dataset (.json) ----
    let n_obs = all_patterns.len();
    let mut measurements = Array3::<f64>::zeros((n_obs, N_CHANNEL, N_TIME));
    for ((o, c, t), value) in measurements.indexed_iter_mut() {
        *value = all_patterns[o][c] * envelope(t) + rng.gauss(0.0, 0.05);
    }

    let obs = DescriptorTable::new()
        .with_column("condition", column(all_condition))
        .with_column("run", column(all_run));
    let channel = DescriptorTable::new().with_column(
        "sensor",
        column((0..N_CHANNEL).map(|c| format!("E{:02}", c + 1))),
    );
    let time = DescriptorTable::new().with_column(
        "time",
        column((0..N_TIME).map(|t| t as f64 / SAMPLE_RATE_HZ)),
    );
    let mut descriptors = Descriptors::new();
    descriptors.insert("subject".into(), "sub-01".into());
    descriptors.insert("sample_rate_hz".into(), SAMPLE_RATE_HZ.into());

    let temporal = TemporalDataset::new(
        measurements,
        Some(descriptors),
        Some(obs),
        Some(channel),
        Some(time),
    )?;
    let temporal_path = "sample_temporal.json";
    temporal.save(temporal_path, FileFormat::Json)?;

    println!(
        "Wrote temporal dataset ({} obs x {} channels x {} time points) to {temporal_path}",
        temporal.n_obs(),
        temporal.n_channel(),
        temporal.n_time()
    );
    Ok(())
}
