/// Human-readable rendering of a millisecond duration.
///
/// Under a second prints raw milliseconds, under a minute prints seconds with
/// two decimals, otherwise whole minutes plus the remaining seconds rounded to
/// the nearest second. Negative input is not validated and falls into the
/// first branch.
pub fn format_duration(ms: Option<i64>) -> String {
    let Some(ms) = ms else {
        return "N/A".to_string();
    };

    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.2}s", ms as f64 / 1_000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = ((ms % 60_000) as f64 / 1_000.0).round();
        format!("{minutes}m {seconds}s")
    }
}
