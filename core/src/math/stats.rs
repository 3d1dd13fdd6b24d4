pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        (Self::energy(samples) / samples.len() as f64).sqrt()
    }

    /// Sum of squares.
    pub fn energy(samples: &[f64]) -> f64 {
        samples.iter().map(|&v| v * v).sum()
    }

    /// Euclidean norm.
    pub fn norm(samples: &[f64]) -> f64 {
        Self::energy(samples).sqrt()
    }

    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn max_abs(samples: &[f64]) -> f64 {
        samples.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()))
    }

    /// Index of the largest magnitude; the earliest index wins ties.
    pub fn argmax_abs(samples: &[f64]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, &value) in samples.iter().enumerate() {
            let magnitude = value.abs();
            match best {
                Some((_, current)) if magnitude <= current => {}
                _ => best = Some((idx, magnitude)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    pub fn median(samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some(0.5 * (sorted[mid - 1] + sorted[mid]))
        } else {
            Some(sorted[mid])
        }
    }

    /// Mean after dropping `fraction` of the sorted values on each side.
    pub fn trimmed_mean(samples: &[f64], fraction: f64) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let cut = ((sorted.len() as f64) * fraction).floor() as usize;
        let kept = if 2 * cut >= sorted.len() {
            &sorted[..]
        } else {
            &sorted[cut..sorted.len() - cut]
        };
        Self::mean(kept)
    }
}
