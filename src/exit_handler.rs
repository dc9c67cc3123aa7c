//! Exit code logic for the weblogin process.
//!
//! Single responsibility: map the run outcome to a process exit and a message.

use std::process::ExitCode;

use weblogin_core::AuthError;

/// Process outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
        }
    }
}

/// Determines the process exit outcome and the message for stderr, if any.
pub(crate) fn determine_exit_outcome(result: &anyhow::Result<()>) -> (ProcessExit, Option<String>) {
    match result {
        Ok(()) => (ProcessExit::Success, None),
        Err(error) => (ProcessExit::Failure, Some(describe_failure(error))),
    }
}

fn describe_failure(error: &anyhow::Error) -> String {
    let Some(auth) = error.downcast_ref::<AuthError>() else {
        return format!("{error:#}");
    };
    if auth.is_timeout() {
        "A request timed out.".to_string()
    } else if auth.is_redirect() {
        "Too many redirects.".to_string()
    } else if auth.is_connect() {
        format!("Error connecting to Shibboleth server(s):\n  {auth}")
    } else {
        auth.to_string()
    }
}
