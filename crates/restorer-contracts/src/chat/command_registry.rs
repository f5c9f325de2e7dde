use super::intent_parser::Action;

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: Action,
}

/// Commands that take exactly one path.
pub(crate) const PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "open",
        action: Action::Open,
    },
    CommandSpec {
        command: "upload",
        action: Action::Open,
    },
    CommandSpec {
        command: "replace",
        action: Action::Open,
    },
];

/// Commands whose path argument may be omitted.
pub(crate) const OPTIONAL_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "save",
        action: Action::Save,
    },
    CommandSpec {
        command: "download",
        action: Action::Save,
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "restore",
        action: Action::Restore,
    },
    CommandSpec {
        command: "status",
        action: Action::Status,
    },
    CommandSpec {
        command: "help",
        action: Action::Help,
    },
    CommandSpec {
        command: "quit",
        action: Action::Quit,
    },
    CommandSpec {
        command: "exit",
        action: Action::Quit,
    },
];

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/open <path>",
    "/replace <path>",
    "/restore",
    "/save [path]",
    "/status",
    "/help",
    "/quit",
];

pub(crate) fn find_action(command: &str, specs: &[CommandSpec]) -> Option<Action> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}
