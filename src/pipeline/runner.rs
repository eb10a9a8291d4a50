// Parallel downsampling of an indexed archive window

use crate::archive::channel::{list_channels, ChannelReader};
use crate::archive::index::FrameIndex;
use crate::archive::locator::resolve;
use crate::archive::segment::Segment;
use crate::core::constants::CompressionType;
use crate::core::error::{FrameError, Result};
use crate::core::format::{ChannelDescriptor, ChunkHeader, Matrix};
use crate::core::source::FrameSource;
use crate::pipeline::chunk::{window_dataset_name, ChunkWriter, CHANNELS_DATASET};
use crate::pipeline::config::ResamplerConfig;
use crate::pipeline::units::plan_units;
use crate::resample::cache::FilterCache;
use crate::resample::method::{ReductionMethod, Reducer};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ChunkSummary {
    pub unit: Segment,
    pub path: PathBuf,
    /// Sub-window datasets written
    pub windows: usize,
    pub channels: usize,
}

/// A channel that produced no data for one sub-window.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelFailure {
    pub channel: String,
    pub window: Segment,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub unit: Segment,
    pub error: String,
}

/// What one worker returns for one unit.
#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: Segment,
    pub chunk: Result<ChunkSummary>,
    pub channel_failures: Vec<ChannelFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub window: Segment,
    pub target_rate: f64,
    pub method: String,
    pub workers: usize,
    pub channels: Vec<ChannelDescriptor>,
    /// Set when the method name is not recognised; no samples are produced then
    pub method_error: Option<String>,
    /// Sorted by unit start
    pub chunks: Vec<ChunkSummary>,
    pub unit_failures: Vec<UnitFailure>,
    pub channel_failures: Vec<ChannelFailure>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.method_error.is_none()
            && self.unit_failures.is_empty()
            && self.channel_failures.is_empty()
    }
}

/// Everything a worker needs for one unit.
#[derive(Debug, Clone)]
struct UnitJob {
    unit: Segment,
    channels: Arc<[ChannelDescriptor]>,
    method: Option<ReductionMethod>,
    method_name: Arc<str>,
    target_rate: f64,
    window_duration: f64,
    compression: CompressionType,
    output_dir: Arc<PathBuf>,
    shared_cache: Option<Arc<FilterCache>>,
}

pub struct DownsamplingPipeline<S: FrameSource> {
    source: S,
    config: ResamplerConfig,
    /// Handed to every unit when `share_filter_cache` is set
    shared_cache: Arc<FilterCache>,
}

impl<S: FrameSource> DownsamplingPipeline<S> {
    pub fn new(source: S, config: ResamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            shared_cache: Arc::new(FilterCache::new()),
        })
    }

    pub fn shared_cache(&self) -> &FilterCache {
        &self.shared_cache
    }

    /// Channels worth reducing: faster than the target and the rate floor.
    pub fn eligible_channels(&self, index: &FrameIndex) -> Result<Vec<ChannelDescriptor>> {
        let all = list_channels(index, &self.source, index.window().start)?;
        let (eligible, skipped): (Vec<_>, Vec<_>) = all.into_iter().partition(|c| {
            c.sample_rate > self.config.target_rate && c.sample_rate >= self.config.min_native_rate
        });
        debug!(
            "{} eligible channels, {} skipped below {} Hz",
            eligible.len(),
            skipped.len(),
            self.config.target_rate.max(self.config.min_native_rate)
        );
        Ok(eligible)
    }

    pub fn run(&self, index: &FrameIndex) -> Result<RunReport> {
        let channels = self.eligible_channels(index)?;
        self.run_channels(index, channels)
    }

    /// Reduces `channels` over the whole index window and writes one chunk per unit.
    pub fn run_channels(
        &self,
        index: &FrameIndex,
        channels: Vec<ChannelDescriptor>,
    ) -> Result<RunReport> {
        let config = &self.config;
        let compression = config.compression_type()?;

        let (method, method_error) = match config.method.parse::<ReductionMethod>() {
            Ok(m) => (Some(m), None),
            Err(e) => {
                error!("No implementation found for resampling: {}", e);
                (None, Some(e.to_string()))
            }
        };

        std::fs::create_dir_all(&config.output_dir)?;

        let units = plan_units(index, config.unit_duration);
        let workers = config.worker_count(units.len());
        info!(
            "Downsampling {} to {} Hz ({}): {} units, {} channels, {} workers",
            index.window(),
            config.target_rate,
            config.method,
            units.len(),
            channels.len(),
            workers
        );

        let template = UnitJob {
            unit: index.window(),
            channels: channels.clone().into(),
            method,
            method_name: config.method.as_str().into(),
            target_rate: config.target_rate,
            window_duration: config.window_duration,
            compression,
            output_dir: Arc::new(config.output_dir.clone()),
            shared_cache: config
                .share_filter_cache
                .then(|| Arc::clone(&self.shared_cache)),
        };
        let jobs: Vec<UnitJob> = units
            .iter()
            .map(|unit| UnitJob {
                unit: *unit,
                ..template.clone()
            })
            .collect();

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("downsample-{idx}"))
            .build()
            .map_err(|e| FrameError::InvalidConfig(format!("building worker pool: {}", e)))?;

        let total = jobs.len();
        let done = AtomicUsize::new(0);
        let source = &self.source;

        let outcomes: Vec<UnitOutcome> = pool.install(|| {
            jobs.into_par_iter()
                .map(|job| {
                    let outcome = run_unit_isolated(job, index, source);
                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    match &outcome.chunk {
                        Ok(_) => info!("Unit {} done ({}/{})", outcome.unit, finished, total),
                        Err(e) => error!(
                            "Unit {} failed ({}/{}): {}",
                            outcome.unit, finished, total, e
                        ),
                    }
                    outcome
                })
                .collect()
        });

        let mut report = RunReport {
            window: index.window(),
            target_rate: config.target_rate,
            method: config.method.clone(),
            workers,
            channels,
            method_error,
            chunks: Vec::new(),
            unit_failures: Vec::new(),
            channel_failures: Vec::new(),
        };
        for outcome in outcomes {
            report.channel_failures.extend(outcome.channel_failures);
            match outcome.chunk {
                Ok(summary) => report.chunks.push(summary),
                Err(e) => report.unit_failures.push(UnitFailure {
                    unit: outcome.unit,
                    error: e.to_string(),
                }),
            }
        }
        report.chunks.sort_by(|a, b| a.unit.start.total_cmp(&b.unit.start));
        report
            .unit_failures
            .sort_by(|a, b| a.unit.start.total_cmp(&b.unit.start));

        info!(
            "Finished {}: {} chunks, {} failed units, {} channel failures",
            report.window,
            report.chunks.len(),
            report.unit_failures.len(),
            report.channel_failures.len()
        );
        Ok(report)
    }
}

/// Runs one unit; a panic only loses that unit.
fn run_unit_isolated<S: FrameSource>(job: UnitJob, index: &FrameIndex, source: &S) -> UnitOutcome {
    let unit = job.unit;
    match catch_unwind(AssertUnwindSafe(|| run_unit(job, index, source))) {
        Ok(outcome) => outcome,
        Err(panic_info) => {
            let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            UnitOutcome {
                unit,
                chunk: Err(FrameError::WorkerPanicked(msg)),
                channel_failures: Vec::new(),
            }
        }
    }
}

fn run_unit<S: FrameSource>(job: UnitJob, index: &FrameIndex, source: &S) -> UnitOutcome {
    let mut channel_failures = Vec::new();
    let chunk = write_unit(&job, index, source, &mut channel_failures);
    UnitOutcome {
        unit: job.unit,
        chunk,
        channel_failures,
    }
}

fn write_unit<S: FrameSource>(
    job: &UnitJob,
    index: &FrameIndex,
    source: &S,
    failures: &mut Vec<ChannelFailure>,
) -> Result<ChunkSummary> {
    let header = ChunkHeader {
        target_rate: job.target_rate,
        start: job.unit.start,
        stop: job.unit.stop,
        method: job.method_name.to_string(),
    };
    let mut writer = ChunkWriter::create(job.output_dir.as_path(), &header, job.compression)?;

    let names: Vec<String> = job.channels.iter().map(|c| c.name.clone()).collect();
    writer.write_strings(CHANNELS_DATASET, &names)?;

    let cache = job
        .shared_cache
        .clone()
        .unwrap_or_else(|| Arc::new(FilterCache::new()));
    let reducer = job.method.map(|m| Reducer::new(m, job.target_rate, cache));
    let mut reader = ChannelReader::new(index, source);
    let mut windows = 0;

    for window in job.unit.split(job.window_duration) {
        let Some(reducer) = &reducer else {
            break;
        };
        let segments = resolve(index, window.start, window.stop);
        if segments.is_empty() {
            debug!("No archived data in {}", window);
            continue;
        }

        let mut rows = Vec::with_capacity(job.channels.len());
        for channel in job.channels.iter() {
            let row = reader.read(&segments, &channel.name).and_then(|samples| {
                reducer.reduce(&samples, channel.sample_rate, window.duration())
            });
            match row {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!("{} in {}: {}", channel.name, window, e);
                    failures.push(ChannelFailure {
                        channel: channel.name.clone(),
                        window,
                        error: e.to_string(),
                    });
                    rows.push(Vec::new());
                }
            }
        }

        if rows.iter().all(Vec::is_empty) {
            continue;
        }
        writer.write_matrix(&window_dataset_name(&window), &Matrix::stack(&rows))?;
        windows += 1;
    }

    let path = writer.finish()?;
    Ok(ChunkSummary {
        unit: job.unit,
        path,
        windows,
        channels: names.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::manifest::{Manifest, ManifestRecord};
    use crate::core::format::SampleBlock;
    use crate::core::source::FrameHandle;
    use crate::pipeline::chunk::ChunkReader;
    use std::collections::HashMap;
    use std::path::Path;

    struct MemFile {
        start: f64,
        channels: Vec<(ChannelDescriptor, Vec<f64>)>,
        panic_on: Option<String>,
    }

    struct MemHandle(Arc<MemFile>);

    impl FrameHandle for MemHandle {
        fn read(&self, channel: &str, start: f64, stop: f64) -> Result<SampleBlock> {
            let file = &self.0;
            if file.panic_on.as_deref() == Some(channel) {
                panic!("corrupt block for {}", channel);
            }
            let (desc, samples) = file
                .channels
                .iter()
                .find(|(d, _)| d.name == channel)
                .ok_or_else(|| FrameError::ChannelNotFound {
                    channel: channel.to_string(),
                    file: "memory".to_string(),
                })?;
            let offset = |t: f64| {
                (((t - file.start) * desc.sample_rate).round().max(0.0) as usize).min(samples.len())
            };
            Ok(SampleBlock {
                samples: samples[offset(start)..offset(stop)].to_vec(),
                channel: desc.clone(),
            })
        }

        fn list_channels(&self, _instant: f64) -> Result<Vec<ChannelDescriptor>> {
            Ok(self.0.channels.iter().map(|(d, _)| d.clone()).collect())
        }
    }

    #[derive(Default)]
    struct MemSource {
        files: HashMap<String, Arc<MemFile>>,
        records: Vec<ManifestRecord>,
    }

    impl MemSource {
        fn add(&mut self, name: &str, start: f64, rates: &[(&str, f64)]) -> &mut Self {
            self.add_span(name, start, 10.0, rates)
        }

        fn add_span(
            &mut self,
            name: &str,
            start: f64,
            duration: f64,
            rates: &[(&str, f64)],
        ) -> &mut Self {
            let channels = rates
                .iter()
                .map(|(channel, rate)| {
                    let n = (rate * duration) as usize;
                    let samples = (0..n)
                        .map(|i| ((start + i as f64 / rate) * 3.0).sin())
                        .collect();
                    (ChannelDescriptor::new(*channel, *rate), samples)
                })
                .collect();
            self.files.insert(
                name.to_string(),
                Arc::new(MemFile {
                    start,
                    channels,
                    panic_on: None,
                }),
            );
            self.records.push(ManifestRecord::new(name, start, duration));
            self
        }

        fn poison(&mut self, name: &str, channel: &str) {
            let file = self.files.get_mut(name).unwrap();
            Arc::get_mut(file).unwrap().panic_on = Some(channel.to_string());
        }

        fn index(&self, start: f64, stop: f64) -> FrameIndex {
            FrameIndex::build(&Manifest::from_records(self.records.clone()), start, stop).unwrap()
        }
    }

    impl FrameSource for MemSource {
        type Handle = MemHandle;

        fn open(&self, file_ref: &str) -> Result<MemHandle> {
            self.files
                .get(file_ref)
                .cloned()
                .map(MemHandle)
                .ok_or_else(|| {
                    FrameError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        file_ref.to_string(),
                    ))
                })
        }
    }

    fn config(method: &str, out: &Path) -> ResamplerConfig {
        let mut config = ResamplerConfig::new(50.0, method);
        config.output_dir = out.to_path_buf();
        config.workers = Some(2);
        config
    }

    #[test]
    fn test_integer_ratio_filt_reuses_one_filter_per_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MemSource::default();
        source.add(
            "a",
            100.0,
            &[("H1", 200.0), ("H2", 200.0), ("MID", 100.0), ("SLOW", 16.0)],
        );
        let index = source.index(100.0, 110.0);

        let mut cfg = config("filt", dir.path());
        cfg.share_filter_cache = true;
        let pipeline = DownsamplingPipeline::new(source, cfg).unwrap();
        let report = pipeline.run(&index).unwrap();

        assert!(report.is_clean());
        let names: Vec<_> = report.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["H1", "H2", "MID"]);
        // ratios 4 and 2
        assert_eq!(pipeline.shared_cache().designs(), 2);

        assert_eq!(report.chunks.len(), 1);
        let chunk = ChunkReader::open(&report.chunks[0].path).unwrap();
        assert_eq!(chunk.channels().unwrap(), vec!["H1", "H2", "MID"]);
        let matrix = chunk.read_matrix("data_gs100_ge110").unwrap();
        assert_eq!((matrix.rows, matrix.cols), (3, 500));
        assert_eq!(matrix.row(0), matrix.row(1));
    }

    #[test]
    fn test_runs_are_deterministic() {
        let mut files = Vec::new();
        for _ in 0..2 {
            let dir = tempfile::tempdir().unwrap();
            let mut source = MemSource::default();
            source
                .add("a", 100.0, &[("H1", 256.0), ("MID", 75.0)])
                .add("b", 110.0, &[("H1", 256.0), ("MID", 75.0)]);
            let index = source.index(100.0, 120.0);

            let pipeline =
                DownsamplingPipeline::new(source, config("filtfilt", dir.path())).unwrap();
            let report = pipeline.run(&index).unwrap();
            assert_eq!(report.chunks.len(), 2);
            let names: Vec<_> = report
                .chunks
                .iter()
                .map(|c| c.path.file_name().unwrap().to_owned())
                .collect();
            let bytes: Vec<_> = report
                .chunks
                .iter()
                .map(|c| std::fs::read(&c.path).unwrap())
                .collect();
            files.push((names, bytes));
        }
        assert_eq!(files[0], files[1]);
    }

    #[test]
    fn test_unknown_method_writes_channel_list_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MemSource::default();
        source.add("a", 100.0, &[("H1", 200.0)]);
        let index = source.index(100.0, 110.0);

        let pipeline = DownsamplingPipeline::new(source, config("median", dir.path())).unwrap();
        let report = pipeline.run(&index).unwrap();

        assert!(report.method_error.as_deref().unwrap().contains("median"));
        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.chunks[0].windows, 0);
        let chunk = ChunkReader::open(&report.chunks[0].path).unwrap();
        assert_eq!(chunk.dataset_names(), vec![CHANNELS_DATASET]);
        assert_eq!(chunk.header().method, "median");
    }

    #[test]
    fn test_missing_channel_becomes_nan_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MemSource::default();
        source.add("a", 100.0, &[("H1", 200.0)]);
        let index = source.index(100.0, 110.0);

        let pipeline = DownsamplingPipeline::new(source, config("mean", dir.path())).unwrap();
        let channels = vec![
            ChannelDescriptor::new("H1", 200.0),
            ChannelDescriptor::new("GONE", 200.0),
        ];
        let report = pipeline.run_channels(&index, channels).unwrap();

        assert_eq!(report.channel_failures.len(), 1);
        assert_eq!(report.channel_failures[0].channel, "GONE");
        assert!(report.unit_failures.is_empty());

        let chunk = ChunkReader::open(&report.chunks[0].path).unwrap();
        let matrix = chunk.read_matrix("data_gs100_ge110").unwrap();
        assert_eq!((matrix.rows, matrix.cols), (2, 500));
        assert!(matrix.row(0).iter().all(|v| v.is_finite()));
        assert!(matrix.row(1).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_gap_window_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MemSource::default();
        source
            .add("a", 100.0, &[("H1", 100.0)])
            .add("c", 120.0, &[("H1", 100.0)]);
        let index = source.index(100.0, 130.0);

        let mut cfg = config("mean", dir.path());
        cfg.unit_duration = Some(30.0);
        let pipeline = DownsamplingPipeline::new(source, cfg).unwrap();
        let report = pipeline.run(&index).unwrap();

        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.chunks[0].windows, 2);
        let chunk = ChunkReader::open(&report.chunks[0].path).unwrap();
        assert_eq!(
            chunk.dataset_names(),
            vec![CHANNELS_DATASET, "data_gs100_ge110", "data_gs120_ge130"]
        );
    }

    #[test]
    fn test_panicking_unit_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MemSource::default();
        source
            .add("a", 100.0, &[("H1", 200.0)])
            .add("b", 110.0, &[("H1", 200.0)]);
        source.poison("b", "H1");
        let index = source.index(100.0, 120.0);

        let pipeline = DownsamplingPipeline::new(source, config("filt", dir.path())).unwrap();
        let report = pipeline.run(&index).unwrap();

        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.chunks[0].unit, Segment::new(100.0, 110.0));
        assert_eq!(report.unit_failures.len(), 1);
        assert_eq!(report.unit_failures[0].unit, Segment::new(110.0, 120.0));
        assert!(report.unit_failures[0].error.contains("corrupt block"));

        let left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(left, vec!["downsampled_f50_gs100_ge110_filt.dsck"]);
    }

    #[test]
    fn test_sub_second_units_write_separate_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MemSource::default();
        source.add("a", 100.0, &[("H1", 200.0)]);
        let index = source.index(100.0, 101.0);

        let mut cfg = config("mean", dir.path());
        cfg.unit_duration = Some(0.25);
        cfg.workers = Some(4);
        let pipeline = DownsamplingPipeline::new(source, cfg).unwrap();
        let report = pipeline.run(&index).unwrap();

        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.chunks.len(), 4);
        for summary in &report.chunks {
            let chunk = ChunkReader::open(&summary.path).unwrap();
            assert_eq!(chunk.header().start, summary.unit.start);
            assert_eq!(chunk.header().stop, summary.unit.stop);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
        assert!(report.chunks[1]
            .path
            .ends_with("downsampled_f50_gs100.25_ge100.5_mean.dsck"));
    }

    #[test]
    fn test_ragged_last_window_is_shorter() {
        for (method, cols) in [("mean", 250), ("filt", 250)] {
            let dir = tempfile::tempdir().unwrap();
            let mut source = MemSource::default();
            source.add_span("long", 100.0, 25.0, &[("H1", 200.0)]);
            let index = source.index(100.0, 125.0);

            let pipeline = DownsamplingPipeline::new(source, config(method, dir.path())).unwrap();
            let report = pipeline.run(&index).unwrap();
            assert!(report.is_clean(), "{:?}", report);
            assert_eq!(report.chunks.len(), 1);
            assert_eq!(report.chunks[0].windows, 3);

            let chunk = ChunkReader::open(&report.chunks[0].path).unwrap();
            assert_eq!(
                chunk.dataset_names(),
                vec![
                    CHANNELS_DATASET,
                    "data_gs100_ge110",
                    "data_gs110_ge120",
                    "data_gs120_ge125"
                ]
            );
            assert_eq!(chunk.read_matrix("data_gs110_ge120").unwrap().cols, 500);
            let tail = chunk.read_matrix("data_gs120_ge125").unwrap();
            assert_eq!((tail.rows, tail.cols), (1, cols), "{}", method);
            assert!(tail.data.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_no_channel_source_at_window_start() {
        let source = MemSource::default();
        let manifest = Manifest::from_records(vec![ManifestRecord::new("ghost", 0.0, 10.0)]);
        let index = FrameIndex::build(&manifest, 0.0, 10.0).unwrap();
        let pipeline = DownsamplingPipeline::new(source, ResamplerConfig::new(1.0, "mean")).unwrap();
        assert!(matches!(pipeline.run(&index), Err(FrameError::Io(_))));
    }
}
