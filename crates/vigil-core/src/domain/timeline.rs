//! Millisecond-indexed probability series used to locate anomalous regions.

/// `(offset_ms, value)` points in ascending time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    points: Vec<(i64, f64)>,
}

impl Timeline {
    pub fn new(mut points: Vec<(i64, f64)>) -> Self {
        points.sort_by_key(|(t, _)| *t);
        Self { points }
    }

    pub fn points(&self) -> &[(i64, f64)] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Buckets points into `[k·rule, (k+1)·rule)` windows and averages each
    /// non-empty bucket. Empty buckets are skipped.
    pub fn resample_mean(&self, rule_ms: i64) -> Timeline {
        let rule = rule_ms.max(1);
        let mut buckets: Vec<(i64, f64, usize)> = Vec::new();
        for &(t, value) in &self.points {
            let start = t.div_euclid(rule) * rule;
            match buckets.last_mut() {
                Some((bucket, sum, count)) if *bucket == start => {
                    *sum += value;
                    *count += 1;
                }
                _ => buckets.push((start, value, 1)),
            }
        }
        Timeline {
            points: buckets
                .into_iter()
                .map(|(t, sum, count)| (t, sum / count as f64))
                .collect(),
        }
    }

    /// First point holding the maximum value.
    pub fn first_max(&self) -> Option<(i64, f64)> {
        self.points.iter().copied().fold(None, |best, point| match best {
            Some((_, v)) if v >= point.1 => best,
            _ => Some(point),
        })
    }

    /// Maximum value among points within `center ± radius_ms`, bounds included.
    pub fn max_within(&self, center: i64, radius_ms: i64) -> Option<f64> {
        self.points
            .iter()
            .filter(|(t, _)| (center - radius_ms..=center + radius_ms).contains(t))
            .map(|(_, v)| *v)
            .fold(None, |best, v| Some(best.map_or(v, |b: f64| b.max(v))))
    }
}
