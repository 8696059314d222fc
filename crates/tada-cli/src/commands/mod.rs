pub mod config;
pub mod meditate;
pub mod schedule;

/// `MM:SS`, or `H:MM:SS` from an hour on.
pub fn clock_face(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
