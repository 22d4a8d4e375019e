/// Lower bound of the reporting band composite scores are rescaled onto.
pub const BAND_MIN: f64 = 50.0;
/// Upper bound of the reporting band.
pub const BAND_MAX: f64 = 100.0;

/// Linearly rescales raw composite scores onto `[BAND_MIN, BAND_MAX]` using the
/// batch's own minimum and maximum.
///
/// | Case              | Result                          |
/// |-------------------|---------------------------------|
/// | empty batch       | empty                           |
/// | all scores equal  | every score becomes `BAND_MAX`  |
/// | otherwise         | min maps to 50, max maps to 100 |
pub fn rescale(scores: &[f64]) -> Vec<f64> {
    let Some(min) = scores.iter().copied().reduce(f64::min) else {
        return Vec::new();
    };
    let max = scores.iter().copied().fold(min, f64::max);

    if max == min {
        return vec![BAND_MAX; scores.len()];
    }

    scores
        .iter()
        .map(|s| BAND_MIN + (s - min) / (max - min) * (BAND_MAX - BAND_MIN))
        .collect()
}
