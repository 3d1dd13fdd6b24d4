use std::f64::consts::PI;

/// Ricker wavelet with peak frequency `frequency` Hz, centred on `t = 0`.
pub fn ricker(t: f64, frequency: f64) -> f64 {
    let arg = (PI * frequency * t).powi(2);
    (1.0 - 2.0 * arg) * (-arg).exp()
}

/// Source-time function sampled at `sample_rate`, with the wavelet centred
/// on `onset` seconds.
pub fn source_wavelet(length: usize, sample_rate: f64, frequency: f64, onset: f64) -> Vec<f64> {
    (0..length)
        .map(|i| ricker(i as f64 / sample_rate - onset, frequency))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ricker_peaks_at_onset() {
        let wavelet = source_wavelet(200, 20.0, 0.8, 3.0);
        let peak = wavelet
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert_eq!(peak.0, 60);
        assert!((peak.1 - 1.0).abs() < 1e-12);
    }
}
