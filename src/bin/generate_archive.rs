//! Writes a synthetic frame archive plus its manifest.
//!
//! Usage: `generate_archive [OUT_DIR] [FILES]`

use std::f64::consts::PI;
use std::path::PathBuf;

use frame_ds::core::constants::CompressionType;
use frame_ds::{FrameFileWriter, Manifest, ManifestRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, Level};

const GPS_START: f64 = 1_000_000_000.0;
const FILE_DURATION: f64 = 100.0;
/// Seconds written per block inside a file
const BLOCK_DURATION: f64 = 10.0;
/// One missing file after this many, so the archive has a gap
const GAP_AFTER: usize = 3;

/// (name, unit, rate, tone frequency)
const CHANNELS: &[(&str, &str, f64, f64)] = &[
    ("H1:STRAIN", "strain", 256.0, 7.5),
    ("L1:STRAIN", "strain", 256.0, 11.0),
    ("ENV:SEISMIC", "m/s", 64.0, 1.2),
    ("ENV:TEMP", "degC", 16.0, 0.01),
];

/// Box-Muller transform for normal noise
fn gauss(rng: &mut StdRng, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let mut args = std::env::args().skip(1);
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "archive".to_string()));
    let files: usize = match args.next() {
        Some(n) => n.parse()?,
        None => 6,
    };
    std::fs::create_dir_all(&out_dir)?;

    let mut rng = StdRng::seed_from_u64(42);
    let mut records = Vec::new();

    for i in 0..files {
        let slot = if i >= GAP_AFTER { i + 1 } else { i };
        let start = GPS_START + slot as f64 * FILE_DURATION;
        let file_ref = format!("SYN-{}-{}.frm", start as i64, FILE_DURATION as i64);

        let mut writer = FrameFileWriter::create(
            out_dir.join(&file_ref),
            start,
            FILE_DURATION,
            CompressionType::Zstd,
        )?;
        let ids = CHANNELS
            .iter()
            .map(|(name, unit, rate, _)| writer.add_channel(name, unit, *rate))
            .collect::<frame_ds::Result<Vec<u32>>>()?;

        let mut block_start = start;
        while block_start < start + FILE_DURATION {
            for (id, (_, _, rate, tone)) in ids.iter().zip(CHANNELS) {
                let n = (BLOCK_DURATION * rate) as usize;
                let samples: Vec<f64> = (0..n)
                    .map(|k| {
                        let t = block_start + k as f64 / rate;
                        (2.0 * PI * tone * t).sin() + gauss(&mut rng, 0.1)
                    })
                    .collect();
                writer.write_block(*id, block_start, &samples)?;
            }
            block_start += BLOCK_DURATION;
        }

        let path = writer.finish()?;
        info!("Wrote {}", path.display());
        records.push(ManifestRecord::new(file_ref, start, FILE_DURATION));
    }

    let manifest = Manifest::from_records(records);
    let manifest_path = out_dir.join("archive.ffl");
    std::fs::write(&manifest_path, manifest.to_text())?;

    println!(
        "Wrote {} frame files ({} channels each) and {}",
        manifest.len(),
        CHANNELS.len(),
        manifest_path.display()
    );
    Ok(())
}
