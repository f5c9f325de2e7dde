use super::command_registry::{
    find_action, NO_ARG_COMMANDS, OPTIONAL_PATH_COMMANDS, PATH_COMMANDS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Noop,
    Open,
    Restore,
    Save,
    Status,
    Help,
    Quit,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub action: Action,
    pub raw: String,
    pub path: Option<String>,
    /// Set for [`Action::Unknown`].
    pub command: Option<String>,
}

impl Intent {
    fn new(action: Action, raw: &str) -> Self {
        Self {
            action,
            raw: raw.to_string(),
            path: None,
            command: None,
        }
    }

    fn with_path(mut self, path: String) -> Self {
        if !path.is_empty() {
            self.path = Some(path);
        }
        self
    }
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

/// Unquoted paths with spaces are rejoined, so `/open my photo.jpg` works.
fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

/// Parses one line of session input.
///
/// Slash commands map through the command registry; any other non-empty line
/// is taken as a path to open, which is what a terminal produces when a file
/// is dragged onto it.
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new(Action::Noop, text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        let looks_like_path = slash_tail[command_len..].starts_with(['/', '.']);
        if command_len > 0 && !looks_like_path {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, PATH_COMMANDS) {
                return Intent::new(action, text).with_path(parse_single_path_arg(arg));
            }

            if let Some(action) = find_action(&command, OPTIONAL_PATH_COMMANDS) {
                return Intent::new(action, text).with_path(parse_single_path_arg(arg));
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new(Action::Unknown, text);
            intent.command = Some(command);
            return intent;
        }
    }

    Intent::new(Action::Open, text).with_path(parse_single_path_arg(raw_trimmed))
}

#[cfg(test)]
mod tests {
    use super::{parse_intent, Action};

    #[test]
    fn parse_blank_lines_as_noop() {
        assert_eq!(parse_intent("").action, Action::Noop);
        assert_eq!(parse_intent("   \t").action, Action::Noop);
    }

    #[test]
    fn parse_open_aliases_with_quoted_paths() {
        for line in [
            "/open \"/tmp/old scan.jpg\"",
            "/upload '/tmp/old scan.jpg'",
            "/replace /tmp/old\\ scan.jpg",
        ] {
            let intent = parse_intent(line);
            assert_eq!(intent.action, Action::Open, "{line}");
            assert_eq!(intent.path.as_deref(), Some("/tmp/old scan.jpg"), "{line}");
        }
    }

    #[test]
    fn parse_open_rejoins_unquoted_spaces() {
        let intent = parse_intent("  /open   my photo.jpg  ");
        assert_eq!(intent.path.as_deref(), Some("my photo.jpg"));
    }

    #[test]
    fn parse_open_without_path_has_none() {
        let intent = parse_intent("/open");
        assert_eq!(intent.action, Action::Open);
        assert!(intent.path.is_none());
    }

    #[test]
    fn parse_save_with_and_without_target() {
        let bare = parse_intent("/save");
        assert_eq!(bare.action, Action::Save);
        assert!(bare.path.is_none());

        let download = parse_intent("/download out/restored.png");
        assert_eq!(download.action, Action::Save);
        assert_eq!(download.path.as_deref(), Some("out/restored.png"));
    }

    #[test]
    fn parse_no_arg_commands_case_insensitively() {
        assert_eq!(parse_intent("/restore").action, Action::Restore);
        assert_eq!(parse_intent("/RESTORE").action, Action::Restore);
        assert_eq!(parse_intent("/status").action, Action::Status);
        assert_eq!(parse_intent("/help").action, Action::Help);
        assert_eq!(parse_intent("/quit").action, Action::Quit);
        assert_eq!(parse_intent("/exit").action, Action::Quit);
    }

    #[test]
    fn parse_bare_line_as_path_to_open() {
        let intent = parse_intent("'/home/me/Pictures/grandma 1952.jpg'");
        assert_eq!(intent.action, Action::Open);
        assert_eq!(
            intent.path.as_deref(),
            Some("/home/me/Pictures/grandma 1952.jpg")
        );
    }

    #[test]
    fn parse_unquoted_absolute_path_as_open() {
        let intent = parse_intent("/home/me/Pictures/grandma.jpg");
        assert_eq!(intent.action, Action::Open);
        assert_eq!(intent.path.as_deref(), Some("/home/me/Pictures/grandma.jpg"));

        let file_at_root = parse_intent("/scan.png");
        assert_eq!(file_at_root.action, Action::Open);
        assert_eq!(file_at_root.path.as_deref(), Some("/scan.png"));
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, Action::Unknown);
        assert_eq!(intent.command.as_deref(), Some("magic"));
    }
}
