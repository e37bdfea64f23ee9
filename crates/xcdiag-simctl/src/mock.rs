//! Scripted command runner
//!
//! Replays canned responses in order and records every invocation, so
//! lifecycle machines and pipelines can be exercised without a toolchain.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::runner::{CommandOutput, CommandRunner, RunnerError, RunnerResult};

/// One canned response
#[derive(Debug, Clone)]
pub enum MockResponse {
    Output(CommandOutput),
    SpawnFailure(String),
    TimedOut(u64),
}

/// A recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub program: String,
    pub args: Vec<String>,
}

impl MockCall {
    /// `program arg1 arg2 ...`
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// [`CommandRunner`] that replays scripted responses
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    // === Scripting ===

    /// Queue a raw response.
    pub fn push(&self, response: MockResponse) -> &Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
        self
    }

    /// Queue a successful run with the given stdout.
    pub fn succeed(&self, stdout: impl Into<String>) -> &Self {
        self.push(MockResponse::Output(CommandOutput {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }))
    }

    /// Queue a failing run.
    pub fn fail(&self, code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> &Self {
        self.push(MockResponse::Output(CommandOutput {
            code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }))
    }

    // === Inspection ===

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Recorded command lines, for compact assertions
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(MockCall::command_line).collect()
    }

    /// Responses not consumed yet
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, program: &str, args: &[String]) -> RunnerResult<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                program: program.to_string(),
                args: args.to_vec(),
            });

        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match next {
            Some(MockResponse::Output(output)) => Ok(output),
            Some(MockResponse::SpawnFailure(message)) => Err(RunnerError::Spawn {
                program: program.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, message),
            }),
            Some(MockResponse::TimedOut(seconds)) => Err(RunnerError::TimedOut {
                program: program.to_string(),
                seconds,
            }),
            None => Err(RunnerError::Spawn {
                program: program.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "no scripted response left"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::args;

    #[tokio::test]
    async fn test_replays_in_order_and_records() {
        let runner = MockRunner::new();
        runner.succeed("first").fail(1, "", "second");

        let a = runner.run("xcrun", &args(["simctl", "list"])).await.unwrap();
        let b = runner.run("xcrun", &args(["simctl", "boot", "X"])).await.unwrap();
        assert_eq!(a.stdout, "first");
        assert_eq!(b.stderr, "second");
        assert_eq!(
            runner.command_lines(),
            vec!["xcrun simctl list", "xcrun simctl boot X"]
        );
        assert_eq!(runner.remaining(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_script_is_an_error() {
        let runner = MockRunner::new();
        assert!(runner.run("xcrun", &[]).await.is_err());
    }
}
