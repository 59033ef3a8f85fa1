/// Duration of one DAB+ transport frame (and of one mode I CIF).
pub const FRAME_DURATION_SEC: f64 = 0.024;

pub fn time_str(sec: f64) -> String {
    let ms = sec * 1000f64;
    let hours = (ms / 3600000f64) as u64;
    let minutes = ((ms % 3600000f64) / 60000f64) as u64;
    let seconds = ((ms % 60000f64) / 1000f64) as u64;
    let milliseconds = (ms % 1000f64) as u64;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

/// Stream time after `frames` transport frames.
pub fn frames_time_str(frames: u64) -> String {
    time_str(frames as f64 * FRAME_DURATION_SEC)
}

#[test]
fn format_stream_time() {
    assert_eq!(frames_time_str(0), "00:00:00.000");
    assert_eq!(frames_time_str(2500), "00:01:00.000");
    assert_eq!(time_str(3723.5), "01:02:03.500");
}
