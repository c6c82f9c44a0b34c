use chrono::Duration;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format time left on a session for display
pub fn format_remaining(remaining: Duration) -> String {
    let minutes = remaining.num_minutes();
    if remaining <= Duration::zero() {
        "expired".to_string()
    } else if minutes < 1 {
        "under a minute".to_string()
    } else if minutes < 60 {
        format!("{}m", minutes)
    } else {
        let hours = minutes / 60;
        let remaining_mins = minutes % 60;
        if remaining_mins == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, remaining_mins)
        }
    }
}
