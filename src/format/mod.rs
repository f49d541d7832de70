pub fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1}G", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}K", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// "3 days ago" style age of an RFC 3339 timestamp.
pub fn human_age(rfc3339: &str, default: &str) -> String {
    let Ok(dt) = chrono::DateTime::parse_from_rfc3339(rfc3339) else {
        return default.to_string();
    };

    let diff = chrono::Utc::now().signed_duration_since(dt);
    let plural = |n: i64| if n > 1 { "s" } else { "" };

    if diff.num_days() > 30 {
        let months = diff.num_days() / 30;
        format!("{} month{} ago", months, plural(months))
    } else if diff.num_days() > 0 {
        format!("{} day{} ago", diff.num_days(), plural(diff.num_days()))
    } else if diff.num_hours() > 0 {
        format!("{} hour{} ago", diff.num_hours(), plural(diff.num_hours()))
    } else if diff.num_minutes() > 0 {
        format!("{} minute{} ago", diff.num_minutes(), plural(diff.num_minutes()))
    } else {
        "just now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512B");
        assert_eq!(human_bytes(2048), "2.0K");
        assert_eq!(human_bytes(3 * 1024 * 1024 / 2), "1.5M");
        assert_eq!(human_bytes(5 * 1024 * 1024 * 1024), "5.0G");
    }

    #[test]
    fn test_human_age() {
        assert_eq!(human_age("garbage", "unknown"), "unknown");
        let now = chrono::Utc::now().to_rfc3339();
        assert_eq!(human_age(&now, "unknown"), "just now");
        let earlier = (chrono::Utc::now() - chrono::Duration::hours(5)).to_rfc3339();
        assert_eq!(human_age(&earlier, "unknown"), "5 hours ago");
    }
}
