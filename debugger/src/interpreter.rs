//! Synchronous command execution
use std::fmt;

use transport::types::ReturnStatus;

use crate::engine::Session;

/// Classification of an engine return status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    SuccessFinished,
    SuccessContinuing,
    Started,
    Quit,
    Failed,
    Invalid,
}

const FINISHED: &[ReturnStatus] = &[
    ReturnStatus::SUCCESS_FINISH_NO_RESULT,
    ReturnStatus::SUCCESS_FINISH_RESULT,
];
const CONTINUING: &[ReturnStatus] = &[
    ReturnStatus::SUCCESS_CONTINUING_NO_RESULT,
    ReturnStatus::SUCCESS_CONTINUING_RESULT,
];
const STARTED: &[ReturnStatus] = &[ReturnStatus::STARTED];
const QUIT: &[ReturnStatus] = &[ReturnStatus::QUIT];
const FAILED: &[ReturnStatus] = &[ReturnStatus::FAILED];
const INVALID: &[ReturnStatus] = &[ReturnStatus::INVALID];

impl From<ReturnStatus> for CommandStatus {
    fn from(status: ReturnStatus) -> Self {
        let table = [
            (FINISHED, CommandStatus::SuccessFinished),
            (CONTINUING, CommandStatus::SuccessContinuing),
            (STARTED, CommandStatus::Started),
            (QUIT, CommandStatus::Quit),
            (FAILED, CommandStatus::Failed),
            (INVALID, CommandStatus::Invalid),
        ];

        match table.iter().find(|(codes, _)| codes.contains(&status)) {
            Some((_, classified)) => *classified,
            None => {
                tracing::warn!(status = %status.0, "unknown return status");
                CommandStatus::Invalid
            }
        }
    }
}

impl CommandStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CommandStatus::SuccessFinished | CommandStatus::SuccessContinuing
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandStatus::SuccessFinished => "success (finished)",
            CommandStatus::SuccessContinuing => "success (continuing)",
            CommandStatus::Started => "started",
            CommandStatus::Quit => "quit",
            CommandStatus::Failed => "failed",
            CommandStatus::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// Output and classified status of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub status: CommandStatus,
}

/// Run `command` through the session's command interpreter
#[tracing::instrument(skip(session))]
pub fn interpret_command(
    session: &mut dyn Session,
    command: &str,
    add_to_history: bool,
) -> CommandResult {
    let raw = session.handle_command(command, add_to_history);
    let status = CommandStatus::from(raw.status);
    tracing::debug!(%status, "command finished");

    CommandResult {
        stdout: raw.output,
        stderr: raw.error,
        status,
    }
}
