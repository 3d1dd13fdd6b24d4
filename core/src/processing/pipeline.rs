//! Batch driver: one blocking task per (station, event) triplet, bounded by
//! the configured worker count, followed by per-station stacking.

use crate::deconvolution::Deconvolver;
use crate::interface::trace::keys;
use crate::interface::{DeconvolutionResult, StackedReceiverFunction, ZneTraces};
use crate::math::TaperBank;
use crate::model::VelocityModel;
use crate::prelude::{DeconvolutionMethod, PipelineConfig, RfError, RfResult};
use crate::processing::rotation::Geometry;
use crate::processing::stack::Stacker;
use crate::processing::window::Windowing;
use crate::telemetry::{LogManager, Metrics, MetricsRecorder};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Raw recordings of one event at one station.
#[derive(Debug, Clone)]
pub struct TripletJob {
    pub id: usize,
    pub station: String,
    pub event: String,
    pub traces: ZneTraces,
    /// Onset of the reference phase, in the traces' time base.
    pub arrival_time: f64,
    pub geometry: Geometry,
}

/// Receiver functions of one event, one per target component.
#[derive(Debug, Clone)]
pub struct EventReceiverFunctions {
    pub ray_parameter: f64,
    pub results: Vec<DeconvolutionResult>,
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: usize,
    pub station: String,
    pub event: String,
    pub result: RfResult<EventReceiverFunctions>,
}

/// Stack of one station and target component.
#[derive(Debug, Clone)]
pub struct StationStack {
    pub station: String,
    pub component: char,
    pub result: RfResult<StackedReceiverFunction>,
}

/// Windowing, deconvolution and stacking with shared read-only state.
pub struct Pipeline {
    config: PipelineConfig,
    model: Arc<VelocityModel>,
    windowing: Arc<Windowing>,
    stacker: Stacker,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, model: Arc<VelocityModel>) -> RfResult<Self> {
        config.validate()?;
        let windowing = Arc::new(Windowing::new(config.window.clone(), model.clone())?);
        let stacker =
            Stacker::new(config.stack.clone(), model.clone())?.with_phase(config.window.phase);
        Ok(Self {
            config,
            model,
            windowing,
            stacker,
            metrics: Arc::new(MetricsRecorder::new()),
            logger: LogManager::new("pipeline"),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<VelocityModel> {
        &self.model
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    /// Windows, rotates and deconvolves one job on the calling thread.
    pub fn process_job(&self, job: &TripletJob) -> RfResult<EventReceiverFunctions> {
        let deconvolver = Deconvolver::new(self.config.deconvolution.clone())?;
        run_job(&self.windowing, &deconvolver, job)
    }

    /// Deconvolver whose taper bank covers every window length in `jobs`.
    fn prepare_deconvolver(&self, jobs: &[TripletJob]) -> RfResult<Deconvolver> {
        let params = self.config.deconvolution.clone();
        let mut bank = TaperBank::new();
        if let DeconvolutionMethod::Multitaper {
            tapers,
            time_bandwidth,
            ..
        } = params.method
        {
            let lengths: BTreeSet<usize> = jobs
                .iter()
                .map(|job| self.windowing.window_len(job.traces.sample_rate()))
                .collect();
            for len in lengths {
                // jobs of this length fail on their own when their tapers are requested
                if let Err(err) = bank.prepare(len, time_bandwidth, tapers) {
                    self.logger
                        .warn(&format!("no tapers for {}-sample windows: {}", len, err));
                }
            }
            self.logger
                .detail(&format!("prepared {} taper sets", bank.len()));
        }
        Deconvolver::with_taper_bank(params, Arc::new(bank))
    }

    /// Processes every job concurrently. Outcomes come back sorted by job id;
    /// a failing job only affects its own outcome.
    pub async fn process_batch(&self, jobs: Vec<TripletJob>) -> RfResult<Vec<JobOutcome>> {
        let deconvolver = Arc::new(self.prepare_deconvolver(&jobs)?);
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut pending = JoinSet::new();
        self.logger.record(&format!(
            "processing {} jobs on {} workers with {}",
            jobs.len(),
            self.config.workers,
            self.config.deconvolution.method.name()
        ));

        for job in jobs {
            let semaphore = semaphore.clone();
            let windowing = self.windowing.clone();
            let deconvolver = deconvolver.clone();
            pending.spawn(async move {
                let (job_id, station, event) = (job.id, job.station.clone(), job.event.clone());
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        tokio::task::spawn_blocking(move || run_job(&windowing, &deconvolver, &job))
                            .await
                            .unwrap_or_else(|err| {
                                Err(RfError::Internal(format!("worker failed: {}", err)))
                            })
                    }
                    Err(err) => Err(RfError::Internal(format!("worker pool closed: {}", err))),
                };
                JobOutcome {
                    job_id,
                    station,
                    event,
                    result,
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok(outcome) => {
                    match &outcome.result {
                        Ok(_) => self.metrics.record_processed(),
                        Err(err) => {
                            self.logger.warn(&format!(
                                "job {} ({} / {}) failed: {}",
                                outcome.job_id, outcome.station, outcome.event, err
                            ));
                            self.metrics.record_error(err.kind());
                        }
                    }
                    outcomes.push(outcome);
                }
                Err(err) => {
                    self.logger.warn(&format!("job task aborted: {}", err));
                    self.metrics.record_error("internal");
                }
            }
        }
        outcomes.sort_by_key(|outcome| outcome.job_id);
        Ok(outcomes)
    }

    /// Blocking wrapper around [`Pipeline::process_batch`] with its own
    /// runtime. Must not be called from within a tokio runtime.
    pub fn run_batch(&self, jobs: Vec<TripletJob>) -> RfResult<Vec<JobOutcome>> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.workers)
            .build()
            .map_err(|err| RfError::Internal(format!("failed to start runtime: {}", err)))?;
        runtime.block_on(self.process_batch(jobs))
    }

    /// Stacks the successful outcomes per station and target component.
    pub fn stack_all(&self, outcomes: &[JobOutcome]) -> Vec<StationStack> {
        let mut groups: BTreeMap<(String, char), (Vec<DeconvolutionResult>, Vec<f64>)> =
            BTreeMap::new();
        for outcome in outcomes {
            let Ok(event) = &outcome.result else {
                continue;
            };
            for result in &event.results {
                let component = result.trace().component().unwrap_or('?');
                let entry = groups
                    .entry((outcome.station.clone(), component))
                    .or_default();
                entry.0.push(result.clone());
                entry.1.push(event.ray_parameter);
            }
        }

        groups
            .into_iter()
            .map(|((station, component), (results, ray_parameters))| {
                let result = self.stacker.stack(&results, &ray_parameters);
                match &result {
                    Ok(stack) => self.metrics.record_stack(stack.rejections.len()),
                    Err(err) => {
                        self.logger
                            .warn(&format!("stack {} {} failed: {}", station, component, err));
                        self.metrics.record_error(err.kind());
                    }
                }
                StationStack {
                    station,
                    component,
                    result,
                }
            })
            .collect()
    }
}

fn run_job(
    windowing: &Windowing,
    deconvolver: &Deconvolver,
    job: &TripletJob,
) -> RfResult<EventReceiverFunctions> {
    let triplet = windowing.extract(&job.traces, job.arrival_time, &job.geometry)?;
    let (source, targets) = triplet.into_parts();
    let mut results = Vec::with_capacity(targets.len());
    for target in &targets {
        let mut target = target.clone();
        target.annotate(keys::STATION, job.station.as_str());
        target.annotate(keys::EVENT, job.event.as_str());
        results.push(deconvolver.deconvolve(&source, &target)?);
    }
    Ok(EventReceiverFunctions {
        ray_parameter: job.geometry.ray_parameter,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::Trace;
    use crate::prelude::{DeconvolutionParams, Phase, RotationKind, StackConfig, WindowConfig};

    const RATE: f64 = 20.0;

    fn pulse(t: f64) -> f64 {
        (-(t * 4.0).powi(2)).exp()
    }

    /// Vertical pulse at `onset` with a radial Ps conversion `delay` later
    /// and a weaker transverse arrival.
    fn job(id: usize, station: &str, len: usize, onset: f64, delay: f64) -> TripletJob {
        job_at(id, station, RATE, len, onset, delay)
    }

    fn job_at(
        id: usize,
        station: &str,
        rate: f64,
        len: usize,
        onset: f64,
        delay: f64,
    ) -> TripletJob {
        let back_azimuth: f64 = 30.0;
        let (sb, cb) = back_azimuth.to_radians().sin_cos();
        let mut z = vec![0.0; len];
        let mut n = vec![0.0; len];
        let mut e = vec![0.0; len];
        for i in 0..len {
            let t = i as f64 / rate;
            let radial = 0.3 * pulse(t - onset) + 0.4 * pulse(t - onset - delay);
            let transverse = 0.1 * pulse(t - onset - 1.5 * delay);
            z[i] = pulse(t - onset);
            n[i] = -radial * cb + transverse * sb;
            e[i] = -radial * sb - transverse * cb;
        }
        let channel = |c: char, samples: Vec<f64>| {
            Trace::new(format!("XX.{}..BH{}", station, c), samples, rate, 0.0).unwrap()
        };
        TripletJob {
            id,
            station: station.to_string(),
            event: format!("ev{}", id),
            traces: ZneTraces::new(channel('Z', z), channel('N', n), channel('E', e)).unwrap(),
            arrival_time: onset,
            geometry: Geometry::new(back_azimuth, 6.4),
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            window: WindowConfig {
                phase: Phase::P,
                before: 10.0,
                after: 30.0,
                taper_fraction: 0.05,
                rotation: RotationKind::Rtz,
                demean: true,
            },
            deconvolution: DeconvolutionParams {
                time_shift: 5.0,
                ..Default::default()
            },
            stack: StackConfig {
                moveout: false,
                ..Default::default()
            },
            workers: 2,
        }
    }

    #[test]
    fn failing_job_does_not_affect_the_batch() {
        let pipeline = Pipeline::new(config(), Arc::new(VelocityModel::iasp91())).unwrap();
        let jobs = vec![
            job(2, "STA", 1600, 30.0, 4.0),
            // too short for a 30 s post-arrival window
            job(1, "STA", 800, 30.0, 4.0),
            job(0, "STA", 1600, 35.0, 4.0),
        ];
        let outcomes = pipeline.run_batch(jobs).unwrap();
        let ids: Vec<usize> = outcomes.iter().map(|o| o.job_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(matches!(outcomes[1].result, Err(RfError::InsufficientData(_))));
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[2].result.is_ok());

        let metrics = pipeline.metrics();
        assert_eq!(metrics.processed, 2);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.failures_by_kind["insufficient_data"], 1);
    }

    #[test]
    fn radial_receiver_function_shows_the_conversion() {
        let pipeline = Pipeline::new(config(), Arc::new(VelocityModel::iasp91())).unwrap();
        let event = pipeline.process_job(&job(0, "STA", 1600, 30.0, 4.0)).unwrap();
        let radial = &event.results[0];
        assert_eq!(radial.trace().component(), Some('R'));
        assert_eq!(radial.trace().metadata().text(keys::EVENT), Some("ev0"));
        let zero = radial.zero_lag_index();
        let converted = zero + (4.0 * RATE) as usize;
        let samples = radial.trace().samples();
        let later = crate::math::StatsHelper::argmax_abs(&samples[zero + 20..]).unwrap() + zero + 20;
        assert!(later.abs_diff(converted) <= 2, "peak at {} expected {}", later, converted);
        assert!(samples[zero] > 0.0);
        let ratio = samples[converted] / samples[zero];
        assert!(ratio > 1.2 && ratio < 1.47, "amplitude ratio {}", ratio);
    }

    #[test]
    fn stacks_group_by_station_and_component() {
        let pipeline = Pipeline::new(config(), Arc::new(VelocityModel::iasp91())).unwrap();
        let jobs = vec![
            job(0, "AAA", 1600, 30.0, 4.0),
            job(1, "AAA", 1600, 32.0, 4.0),
            job(2, "BBB", 1600, 30.0, 3.0),
        ];
        let outcomes = pipeline.run_batch(jobs).unwrap();
        let stacks = pipeline.stack_all(&outcomes);
        let keys: Vec<(String, char)> = stacks
            .iter()
            .map(|s| (s.station.clone(), s.component))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("AAA".to_string(), 'R'),
                ("AAA".to_string(), 'T'),
                ("BBB".to_string(), 'R'),
                ("BBB".to_string(), 'T'),
            ]
        );
        let radial = stacks[0].result.as_ref().unwrap();
        assert_eq!(radial.contributing, 2);
        assert_eq!(radial.inputs, vec!["XX.AAA..BHR@ev0", "XX.AAA..BHR@ev1"]);
        assert_eq!(pipeline.metrics().stacked, 4);
    }

    #[test]
    fn multitaper_batch_prepares_tapers() {
        let mut cfg = config();
        cfg.deconvolution.method = DeconvolutionMethod::multitaper();
        let pipeline = Pipeline::new(cfg, Arc::new(VelocityModel::iasp91())).unwrap();
        let outcomes = pipeline
            .run_batch(vec![job(0, "STA", 1600, 30.0, 4.0)])
            .unwrap();
        let event = outcomes[0].result.as_ref().unwrap();
        assert_eq!(event.results[0].method(), "multitaper");
    }

    #[test]
    fn untaperable_window_fails_only_its_job() {
        let mut cfg = config();
        cfg.deconvolution.method = DeconvolutionMethod::Multitaper {
            water_level: 0.01,
            tapers: 3,
            time_bandwidth: 25.0,
        };
        let pipeline = Pipeline::new(cfg, Arc::new(VelocityModel::iasp91())).unwrap();
        let outcomes = pipeline
            .run_batch(vec![
                job(0, "STA", 1600, 30.0, 4.0),
                // a 41-sample window at 1 Hz is shorter than 2NW
                job_at(1, "LOW", 1.0, 80, 30.0, 4.0),
            ])
            .unwrap();
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(outcomes[1].result, Err(RfError::InvalidParameter(_))));
        assert_eq!(pipeline.metrics().failed, 1);
    }
}
