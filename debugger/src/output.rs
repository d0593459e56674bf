//! Formatting of text written to the display sink

const STDERR_PREFIX: &str = "err> ";

/// Tag every line of `text` as coming from stderr
pub fn stderr_msg(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut tagged = String::with_capacity(text.len() + STDERR_PREFIX.len());
    for line in text.split_inclusive('\n') {
        tagged.push_str(STDERR_PREFIX);
        tagged.push_str(line);
    }
    tagged
}

/// Stdout is written as is
pub fn stdout_msg(text: &str) -> String {
    text.to_string()
}

/// Whether text is the direct result of a command or unsolicited engine output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sync,
    Async,
}
