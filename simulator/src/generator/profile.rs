use crate::generator::template::source_wavelet;
use anyhow::Context;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rfcore::interface::keys;
use rfcore::prelude::Phase;
use rfcore::processing::{Geometry, TripletJob};
use rfcore::{Trace, VelocityModel, ZneTraces};
use serde::{Deserialize, Serialize};

/// Configuration for synthetic three-component teleseismic recordings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub network: String,
    pub stations: Vec<String>,
    pub events: usize,
    pub sample_rate: f64,
    /// Record length in seconds.
    pub duration: f64,
    /// Onset of the direct phase within each record.
    pub onset: f64,
    /// Peak frequency of the Ricker source wavelet.
    pub frequency: f64,
    /// Uniform noise amplitude relative to the direct arrival.
    pub noise: f64,
    pub min_ray_parameter: f64,
    pub max_ray_parameter: f64,
    /// Amplitude of the Ps conversion at each model interface, top down.
    pub conversions: Vec<f64>,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            network: "XX".into(),
            stations: vec!["STA1".into(), "STA2".into()],
            events: 6,
            sample_rate: 20.0,
            duration: 240.0,
            onset: 60.0,
            frequency: 0.8,
            noise: 0.01,
            min_ray_parameter: 4.5,
            max_ray_parameter: 8.5,
            conversions: vec![0.15, 0.3],
            seed: 0,
        }
    }
}

impl GeneratorConfig {
    fn sample_count(&self) -> anyhow::Result<usize> {
        let count = (self.duration * self.sample_rate).round();
        anyhow::ensure!(
            count.is_finite() && count >= 1.0,
            "record of {} s at {} Hz has no samples",
            self.duration,
            self.sample_rate
        );
        Ok(count as usize)
    }
}

/// Depths (km) of the interfaces between model layers.
fn interface_depths(model: &VelocityModel) -> Vec<f64> {
    let layers = model.layers();
    let mut depth = 0.0;
    let mut depths = Vec::with_capacity(layers.len().saturating_sub(1));
    for layer in &layers[..layers.len().saturating_sub(1)] {
        depth += layer.thickness_km;
        depths.push(depth);
    }
    depths
}

/// Z, radial and transverse motion for one event, before noise.
fn ground_motion(
    config: &GeneratorConfig,
    model: &VelocityModel,
    len: usize,
    ray_parameter: f64,
    back_azimuth: f64,
) -> anyhow::Result<[Vec<f64>; 3]> {
    let incidence = model
        .incidence(ray_parameter, Phase::P)
        .context("computing synthetic incidence")?
        .to_radians();
    let mut grid = vec![0.0];
    grid.extend(interface_depths(model));
    let delays = model
        .delay_curve(ray_parameter, &grid)
        .context("computing synthetic Ps delays")?;

    let direct = source_wavelet(len, config.sample_rate, config.frequency, config.onset);
    let vertical = direct.clone();
    let mut radial: Vec<f64> = direct.iter().map(|v| v * incidence.tan()).collect();
    let mut transverse = vec![0.0; len];
    let anisotropy = 0.2 * (2.0 * back_azimuth.to_radians()).sin();

    for (&amplitude, &delay) in config.conversions.iter().zip(delays.iter().skip(1)) {
        let converted =
            source_wavelet(len, config.sample_rate, config.frequency, config.onset + delay);
        for ((r, t), c) in radial.iter_mut().zip(transverse.iter_mut()).zip(converted) {
            *r += amplitude * c;
            *t += anisotropy * amplitude * c;
        }
    }
    Ok([vertical, radial, transverse])
}

/// Synthetic jobs: every station records every event.
pub fn build_jobs(config: &GeneratorConfig, model: &VelocityModel) -> anyhow::Result<Vec<TripletJob>> {
    anyhow::ensure!(
        config.min_ray_parameter <= config.max_ray_parameter,
        "ray parameter range [{}, {}] is empty",
        config.min_ray_parameter,
        config.max_ray_parameter
    );
    let len = config.sample_count()?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut jobs = Vec::with_capacity(config.events * config.stations.len());

    for event_index in 0..config.events {
        let event = format!("EV{:03}", event_index);
        let ray_parameter = rng.gen_range(config.min_ray_parameter..=config.max_ray_parameter);
        let distance = 30.0 + (8.9 - ray_parameter) * 15.0;
        let magnitude: f64 = rng.gen_range(5.5..7.5);

        for station in &config.stations {
            let back_azimuth: f64 = rng.gen_range(0.0..360.0);
            let [z, r, t] = ground_motion(config, model, len, ray_parameter, back_azimuth)?;
            let (sb, cb) = back_azimuth.to_radians().sin_cos();

            let mut noisy = |value: f64| value + rng.gen_range(-1.0_f64..=1.0) * config.noise;
            let z: Vec<f64> = z.into_iter().map(&mut noisy).collect();
            let n: Vec<f64> = r
                .iter()
                .zip(t.iter())
                .map(|(r, t)| noisy(-r * cb + t * sb))
                .collect();
            let e: Vec<f64> = r
                .iter()
                .zip(t.iter())
                .map(|(r, t)| noisy(-r * sb - t * cb))
                .collect();

            let channel = |component: char, samples: Vec<f64>| -> anyhow::Result<Trace> {
                let id = format!("{}.{}..BH{}", config.network, station, component);
                Ok(Trace::new(id, samples, config.sample_rate, 0.0)?
                    .with_header(keys::STATION, station.as_str())
                    .with_header(keys::EVENT, event.as_str())
                    .with_header(keys::MAGNITUDE, magnitude)
                    .with_header(keys::DISTANCE, distance))
            };
            let traces = ZneTraces::new(channel('Z', z)?, channel('N', n)?, channel('E', e)?)?;

            jobs.push(TripletJob {
                id: jobs.len(),
                station: station.clone(),
                event: event.clone(),
                traces,
                arrival_time: config.onset,
                geometry: Geometry::new(back_azimuth, ray_parameter),
            });
        }
    }

    log::info!(
        "generated {} synthetic jobs ({} events x {} stations)",
        jobs.len(),
        config.events,
        config.stations.len()
    );
    Ok(jobs)
}
