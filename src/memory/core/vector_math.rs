//! Cosine similarity and min-max normalization.

/// Cosine similarity over the shared prefix of `a` and `b`.
///
/// Vectors of unequal length are compared on `min(len(a), len(b))` components.
/// Returns `0.0` when either prefix has zero magnitude.
#[must_use]
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    let (mut dot, mut sa, mut sb) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        dot = x.mul_add(*y, dot);
        sa = x.mul_add(*x, sa);
        sb = y.mul_add(*y, sb);
    }
    if sa == 0.0 || sb == 0.0 {
        return 0.0;
    }
    dot / (sa.sqrt() * sb.sqrt())
}

/// Map each value to `(v - min) / (max - min)`.
///
/// A zero range uses a denominator of `1.0`, so all-equal input maps to zeros.
#[must_use]
pub fn normalize_minmax(values: &[f64]) -> Vec<f64> {
    let Some((lo, hi)) = min_max(values) else {
        return Vec::new();
    };
    let range = hi - lo;
    let denom = if range == 0.0 { 1.0 } else { range };
    values.iter().map(|v| (v - lo) / denom).collect()
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let mut iter = values.iter().copied();
    let first = iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}
