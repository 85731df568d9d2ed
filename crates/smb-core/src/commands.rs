//! Text command classification.
//!
//! The first alias of each set doubles as the keyboard button label.

pub const AUTHORIZE_INPUTS: &[&str] = &["/start"];
pub const LYRICS_INPUTS: &[&str] = &["Lyrics", "/lyrics"];
pub const CLEAR_INPUTS: &[&str] = &["Clear", "/clear"];
pub const OPEN_SETTINGS_INPUTS: &[&str] = &["Settings"];
pub const CLOSE_SETTINGS_INPUTS: &[&str] = &["Leave Settings"];
/// Matched by prefix so keyboard labels like "Autoclear On" still match.
pub const TOGGLE_AUTOCLEAR_INPUTS: &[&str] = &["Autoclear", "/autoclear"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Authorize,
    Lyrics,
    Clear,
    OpenSettings,
    CloseSettings,
    ToggleAutoclear,
}

#[derive(Clone, Copy, Debug)]
enum Match {
    Exact,
    Prefix,
}

/// Priority order; the first matching entry wins.
const COMMAND_TABLE: &[(Command, &[&str], Match)] = &[
    (Command::Authorize, AUTHORIZE_INPUTS, Match::Exact),
    (Command::Lyrics, LYRICS_INPUTS, Match::Exact),
    (Command::Clear, CLEAR_INPUTS, Match::Exact),
    (Command::OpenSettings, OPEN_SETTINGS_INPUTS, Match::Exact),
    (Command::CloseSettings, CLOSE_SETTINGS_INPUTS, Match::Exact),
    (Command::ToggleAutoclear, TOGGLE_AUTOCLEAR_INPUTS, Match::Prefix),
];

/// What an inbound text turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Unprocessable,
    Empty,
}

impl Input {
    pub fn classify(text: Option<&str>) -> Self {
        let text = text.map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Self::Empty;
        }

        COMMAND_TABLE
            .iter()
            .find(|(_, aliases, kind)| {
                aliases.iter().any(|alias| match kind {
                    Match::Exact => text == *alias,
                    Match::Prefix => text.starts_with(*alias),
                })
            })
            .map_or(Self::Unprocessable, |(cmd, _, _)| Self::Command(*cmd))
    }
}
