use std::fmt::Write;

use client_core::{
    stores::{LibraryState, PlayerState, QueueState, SystemState},
    BaseAddress,
};
use shared::{
    catalog::{DURATION_OPTIONS, STYLE_TAGS},
    domain::{Job, JobStatus, Track, UserSettings},
};

/// `m:ss`, or `h:mm:ss` past the hour.
pub fn duration(ms: u64) -> String {
    let secs = ms / 1000;
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

fn percent(fraction: f64) -> String {
    format!("{:.0}%", (fraction.clamp(0.0, 1.0) * 100.0))
}

fn job_line(job: &Job, active: bool) -> String {
    let mut line = format!("{:<12} {:<10}", job.id.as_str(), job.status.as_str());
    match job.status {
        JobStatus::Processing => {
            let _ = write!(line, " {:>4}", percent(job.progress.unwrap_or(0.0)));
        }
        JobStatus::Pending => {
            if let Some(position) = job.queue_position {
                let _ = write!(line, " #{position}");
            }
        }
        JobStatus::Completed => {
            if let Some(ms) = job.duration_ms {
                let _ = write!(line, " {}", duration(ms));
            }
        }
        JobStatus::Failed => {
            if let Some(error) = &job.error {
                let _ = write!(line, " {error}");
            }
        }
        JobStatus::Cancelled => {}
    }
    let _ = write!(line, "  [{}]", job.tag_list().join(", "));
    if active {
        line.push_str("  <- active");
    }
    line
}

pub fn queue(state: &QueueState) -> String {
    if state.jobs.is_empty() {
        return "no jobs\n".into();
    }
    let mut out = String::new();
    for job in &state.jobs {
        let active = state.active_job_id.as_ref() == Some(&job.id);
        out.push_str(&job_line(job, active));
        out.push('\n');
    }
    out
}

pub fn system(state: &SystemState) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "stream:  {}",
        if state.connected { "connected" } else { "disconnected" }
    );
    let _ = write!(out, "model:   {}", state.model_state);
    if state.model_load_progress > 0.0 && state.model_load_progress < 1.0 {
        let _ = write!(out, " {}", percent(state.model_load_progress));
    }
    if !state.model_load_message.is_empty() {
        let _ = write!(out, " ({})", state.model_load_message);
    }
    out.push('\n');
    if let Some(error) = &state.model_error {
        let _ = writeln!(out, "error:   {error}");
    }
    match (&state.gpu, state.gpu_available) {
        (Some(gpu), _) => {
            let _ = writeln!(
                out,
                "gpu:     {} {:.1}/{:.1} GB used{}",
                gpu.name,
                gpu.vram_used_gb,
                gpu.vram_total_gb,
                if gpu.use_mmgp { " (mmgp)" } else { "" }
            );
        }
        (None, Some(false)) => out.push_str("gpu:     unavailable\n"),
        (None, _) => out.push_str("gpu:     unknown\n"),
    }
    out
}

fn track_line(track: &Track) -> String {
    format!(
        "{} {:<12} {:>6}  {}  [{}]",
        if track.favorite { '*' } else { ' ' },
        track.id.as_str(),
        duration(track.duration_ms),
        track.title,
        track.tag_list().join(", ")
    )
}

pub fn library(state: &LibraryState) -> String {
    if state.tracks.is_empty() {
        return "no tracks\n".into();
    }
    let mut out = String::new();
    for track in &state.tracks {
        out.push_str(&track_line(track));
        out.push('\n');
    }
    let _ = writeln!(out, "{} of {} tracks", state.tracks.len(), state.total);
    out
}

pub fn player(state: &PlayerState, base: &BaseAddress) -> String {
    let Some(track) = &state.current_track else {
        return "nothing loaded\n".into();
    };
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", track.title, duration(track.duration_ms));
    if let Some(url) = state.audio_url(base) {
        let _ = writeln!(out, "{url}");
    }
    out
}

pub fn settings(settings: &UserSettings) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "temperature     {}", settings.default_temperature);
    let _ = writeln!(out, "topk            {}", settings.default_topk);
    let _ = writeln!(out, "cfg_scale       {}", settings.default_cfg_scale);
    let _ = writeln!(
        out,
        "max_length      {}",
        duration(u64::from(settings.default_max_length_ms))
    );
    let _ = writeln!(out, "theme           {:?}", settings.theme);
    let _ = writeln!(out, "auto_save       {}", settings.auto_save_tracks);
    out
}

pub fn catalog() -> String {
    let mut out = String::new();
    for (category, tags) in STYLE_TAGS {
        let _ = writeln!(out, "{:<12} {}", category.label(), tags.join(", "));
    }
    let presets: Vec<&str> = DURATION_OPTIONS.iter().map(|(label, _)| *label).collect();
    let _ = writeln!(out, "{:<12} {}", "duration", presets.join(", "));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_durations() {
        assert_eq!(duration(0), "0:00");
        assert_eq!(duration(61_500), "1:01");
        assert_eq!(duration(240_000), "4:00");
        assert_eq!(duration(3_725_000), "1:02:05");
    }

    #[test]
    fn empty_queue_renders_placeholder() {
        assert_eq!(queue(&QueueState::default()), "no jobs\n");
    }

    #[test]
    fn disconnected_system_without_gpu_info() {
        let text = system(&SystemState::default());
        assert!(text.contains("stream:  disconnected"));
        assert!(text.contains("model:   unloaded"));
        assert!(text.contains("gpu:     unknown"));
    }

    #[test]
    fn catalog_lists_every_category() {
        let text = catalog();
        for name in ["genre", "mood", "instruments", "vocals", "tempo", "duration"] {
            assert!(text.contains(name), "{name} missing");
        }
    }
}
