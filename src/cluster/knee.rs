/// Knee of a convex, decreasing curve (e.g. k-means inertia against k), `xs` ascending.
///
/// Both axes are min-max normalized and compared through the difference curve
/// `(1 - y) - x`. Scanning from its first local maximum, the knee is the most
/// recent local maximum once the difference falls below that maximum minus the
/// mean x step; a local minimum on the way resets the threshold to zero.
/// So the first bend wins even when a later one is deeper.
/// Returns `None` for fewer than three points, a flat curve, or no such drop.
pub fn knee_point(xs: &[f64], ys: &[f64]) -> Option<usize> {
    if xs.len() != ys.len() || xs.len() < 3 {
        return None;
    }
    let (x_min, x_max) = min_max(xs);
    let (y_min, y_max) = min_max(ys);
    let (x_span, y_span) = (x_max - x_min, y_max - y_min);
    if x_span <= 0.0 || y_span <= 0.0 {
        return None;
    }
    let xn: Vec<f64> = xs.iter().map(|x| (x - x_min) / x_span).collect();
    let diff: Vec<f64> = xn
        .iter()
        .zip(ys)
        .map(|(x, y)| (1.0 - (y - y_min) / y_span) - x)
        .collect();
    let last = diff.len() - 1;
    let step = 1.0 / last as f64;
    // neighbours clamp at both ends
    let around = |i: usize| (diff[i.saturating_sub(1)], diff[(i + 1).min(last)]);
    let is_max = |i: usize| {
        let (l, r) = around(i);
        diff[i] >= l && diff[i] >= r
    };
    let is_min = |i: usize| {
        let (l, r) = around(i);
        diff[i] <= l && diff[i] <= r
    };

    let first = (0..=last).find(|i| is_max(*i))?;
    let mut threshold = 0.0;
    let mut candidate = first;
    for i in first..last {
        if xn[i] >= 1.0 {
            break;
        }
        if is_max(i) {
            threshold = diff[i] - step;
            candidate = i;
        }
        if is_min(i) {
            threshold = 0.0;
        }
        if diff[i + 1] < threshold {
            return Some(candidate);
        }
    }
    None
}

fn min_max(v: &[f64]) -> (f64, f64) {
    v.iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(*x), hi.max(*x)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_bend() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [100.0, 10.0, 8.0, 6.0];
        assert_eq!(knee_point(&xs, &ys), Some(1));

        let xs: Vec<f64> = (1..=8).map(f64::from).collect();
        let ys = [400.0, 180.0, 40.0, 35.0, 31.0, 28.0, 26.0, 25.0];
        assert_eq!(knee_point(&xs, &ys), Some(2));
    }

    #[test]
    fn first_bend_wins_over_a_deeper_later_one() {
        let xs: Vec<f64> = (0..7).map(f64::from).collect();
        // difference curve with local maxima at 1 (0.25) and 4 (0.32)
        let d = [0.0, 0.25, 0.05, 0.3, 0.32, 0.1, 0.0];
        let ys: Vec<f64> = d
            .iter()
            .enumerate()
            .map(|(i, d)| 1.0 - i as f64 / 6.0 - d)
            .collect();
        assert_eq!(knee_point(&xs, &ys), Some(1));
    }

    #[test]
    fn no_knee_cases() {
        assert_eq!(knee_point(&[1.0, 2.0], &[5.0, 1.0]), None);
        assert_eq!(knee_point(&[1.0, 2.0, 3.0], &[4.0, 4.0, 4.0]), None);
        // straight line: nothing below the chord
        assert_eq!(knee_point(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]), None);
        assert_eq!(knee_point(&[1.0, 2.0, 3.0], &[3.0, 2.0]), None);
    }
}
