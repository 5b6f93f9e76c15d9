//! Human readable app listings

use colored::Colorize;

use crate::lifecycle::status::{AppStatus, AppView};

const MB: u64 = 1024 * 1024;

/// `1d 02:03:04`, days only when non-zero
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let clock = format!(
        "{:02}:{:02}:{:02}",
        (seconds / 3600) % 24,
        (seconds / 60) % 60,
        seconds % 60
    );
    if days > 0 {
        format!("{}d {}", days, clock)
    } else {
        clock
    }
}

pub fn format_memory(bytes: u64) -> String {
    if bytes > MB {
        format!("{:.2} mb", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} kb", bytes as f64 / 1024.0)
    }
}

pub fn format_cpu(percent: f32) -> String {
    format!("{:.2}%", percent)
}

/// Short status label used in listings
pub fn status_label(status: AppStatus) -> &'static str {
    match status {
        AppStatus::Running => "ON",
        AppStatus::Error => "ERROR",
        AppStatus::Stopped => "OFF",
        AppStatus::Broken => "BROKEN",
    }
}

/// One listing line for `pod list`
pub fn format_line(view: &AppView) -> String {
    let name = if view.instance_count > 1 {
        format!("{} ({})", view.name, view.instance_count)
    } else {
        view.name.clone()
    };
    let port = view
        .port
        .map(|p| p.to_string())
        .unwrap_or_else(|| "????".to_string());
    let label = status_label(view.status);
    let status = match view.status {
        AppStatus::Running => label.green(),
        AppStatus::Stopped => label.bright_black(),
        AppStatus::Error | AppStatus::Broken => label.red(),
    };

    let mut line = format!("  {}  {}  {}", status, name.yellow(), port);
    if view.instance_count > 0 {
        let details = format!(
            "{}  {}  {}  {} restarts",
            view.uptime.map(format_uptime).unwrap_or_default(),
            format_memory(view.total_memory),
            format_cpu(view.total_cpu),
            view.restarts
        );
        line.push_str("  ");
        line.push_str(&details.bright_black().to_string());
    }
    line
}
