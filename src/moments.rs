//! Raw statistical moments of an energy list.

/// First `count` raw moments of `values`.
///
/// * moment 1: mean
/// * moment 2: mean of squares
/// * moment `i >= 3`: mean of `v^i / m2^i` when `normalize`, else mean of `v^i`
///
/// An empty input yields `NaN` moments.
pub fn calculate_moment(count: usize, values: &[f64], normalize: bool) -> Vec<f64> {
    let mut moments = Vec::with_capacity(count);
    if count == 0 {
        return moments;
    }

    moments.push(mean(values.iter().copied()));
    if count == 1 {
        return moments;
    }

    let second = mean(values.iter().map(|v| v * v));
    moments.push(second);

    for i in 3..=count {
        let p = i as i32;
        let m = if normalize {
            let scale = second.powi(p);
            mean(values.iter().map(|v| v.powi(p) / scale))
        } else {
            mean(values.iter().map(|v| v.powi(p)))
        };
        moments.push(m);
    }

    moments
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    values.sum::<f64>() / n as f64
}
