use restorer_contracts::image::{EncodedImage, StagedImage};
use restorer_contracts::session::{Session, SessionPhase, SessionState};

pub const BANNER: &str = "AI Photo Restorer";
pub const FOOTER: &str = "Powered by Gemini API";

/// Renders the session as the original/restored panes plus the error banner.
pub fn render_session(session: &Session) -> String {
    let mut lines = Vec::new();
    match session.state() {
        SessionState::Empty => {
            lines.push("No photo loaded. Upload an old photo with /open <path>.".to_string());
            lines.push("PNG, JPG, GIF up to 10MB".to_string());
        }
        SessionState::Previewing { staged } => {
            lines.push(format!("Original Photo: {}", describe_staged(staged)));
            match session.in_flight() {
                Some(attempt) => lines.push(format!(
                    "Restored Photo: /restore is disabled until attempt {attempt} settles"
                )),
                None => lines.push("Restored Photo: run /restore to see the magic".to_string()),
            }
        }
        SessionState::Restoring { staged, attempt } => {
            lines.push(format!("Original Photo: {}", describe_staged(staged)));
            lines.push(format!(
                "Restored Photo: Restoring your memory... (attempt {attempt})"
            ));
        }
        SessionState::Restored { staged, restored } => {
            lines.push(format!("Original Photo: {}", describe_staged(staged)));
            lines.push(format!("Restored Photo: {}", describe_image(restored)));
            lines.push(format!(
                "Download with /save [path] (suggested name: {})",
                session.download_file_name()
            ));
        }
    }
    if let Some(error) = session.error() {
        lines.push(format!("Error: {error}"));
    }
    lines.join("\n")
}

pub fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Empty => "empty",
        SessionPhase::Previewing => "previewing",
        SessionPhase::PreviewingWithError => "previewing (last attempt failed)",
        SessionPhase::Restoring => "restoring",
        SessionPhase::Restored => "restored",
    }
}

fn describe_staged(staged: &StagedImage) -> String {
    format!("{} ({})", staged.file_name, describe_image(&staged.image))
}

fn describe_image(image: &EncodedImage) -> String {
    let mut parts = vec![image.mime_type().to_string()];
    if let Some((width, height)) = image.dimensions() {
        parts.push(format!("{width}x{height}"));
    }
    parts.push(format_size(image.len()));
    parts.join(", ")
}

fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let value = bytes as f64;
    if value >= KB * KB {
        format!("{:.1} MB", value / (KB * KB))
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}
