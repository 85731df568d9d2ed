/// Reply keyboard shown under the message input (plain-text buttons).
///
/// Pressing a button sends its label back as an ordinary text message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
    pub resize: bool,
}

impl ReplyKeyboard {
    /// A resizable keyboard with all buttons on one row.
    pub fn single_row<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: vec![labels.into_iter().map(Into::into).collect()],
            resize: true,
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(String::as_str)
    }
}

/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
}
