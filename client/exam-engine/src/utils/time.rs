/// `mm:ss` rendering of a remaining-time value for the exam header clock.
/// Hours fold into minutes (`90:00` for a 90-minute paper).
pub fn format_clock(remaining_ms: u64) -> String {
    let total_seconds = remaining_ms / 1000;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(999), "00:00");
        assert_eq!(format_clock(61_000), "01:01");
        assert_eq!(format_clock(90 * 60 * 1000), "90:00");
    }
}
