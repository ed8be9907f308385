/// Weight of the external (TMDB) score in the blend
pub const EXTERNAL_WEIGHT: f64 = 0.7;

/// Weight of the normalized internal view score in the blend
pub const INTERNAL_WEIGHT: f64 = 0.3;

/// View count at which the internal component saturates
pub const VIEWS_FOR_FULL_SCORE: f64 = 100.0;

/// Upper end of the score scale shared by both components
pub const SCORE_SCALE: f64 = 10.0;

/// Internal views mapped onto the 0-10 scale, capped at `VIEWS_FOR_FULL_SCORE`
pub fn normalized_view_score(view_count: i64) -> f64 {
    let views = view_count.max(0) as f64;
    (views / VIEWS_FOR_FULL_SCORE).min(1.0) * SCORE_SCALE
}

/// `round(external * 0.7 + min(views / 100, 1) * 10 * 0.3, 1)`
///
/// Pure function of its inputs, so replaying the same message against the
/// same stored values always produces the same score.
pub fn trend_score(external_score: f64, view_count: i64) -> f64 {
    let blended =
        external_score * EXTERNAL_WEIGHT + normalized_view_score(view_count) * INTERNAL_WEIGHT;
    round_to_tenth(blended)
}

// Rounds the exact binary value to one decimal, ties to even
fn round_to_tenth(value: f64) -> f64 {
    format!("{value:.1}").parse().unwrap_or(value)
}
