//! Scripted command runner for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::types::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::Result;

type Handler = Arc<dyn Fn(&CommandSpec) -> CommandOutput + Send + Sync>;

enum Response {
    Fixed(CommandOutput),
    Func(Handler),
}

struct Rule {
    needles: Vec<String>,
    responses: VecDeque<Response>,
}

impl Rule {
    fn matches(&self, argv: &[&str]) -> bool {
        self.needles.iter().all(|n| argv.contains(&n.as_str()))
    }

    /// Pop the next response; the last one repeats forever.
    fn next(&mut self, spec: &CommandSpec) -> CommandOutput {
        let response = if self.responses.len() > 1 {
            self.responses.pop_front()
        } else {
            None
        };
        let current = response.as_ref().or_else(|| self.responses.front());
        match current {
            Some(Response::Fixed(out)) => out.clone(),
            Some(Response::Func(f)) => f(spec),
            None => CommandOutput::failed(1, "no scripted response"),
        }
    }
}

/// Matches each command against rules of argv needles (first match wins).
/// Unmatched commands exit 1. Every call is recorded.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `output` for commands containing every needle.
    pub fn on(&self, needles: &[&str], output: CommandOutput) -> &Self {
        self.push(needles, Response::Fixed(output));
        self
    }

    /// Compute the output from the command (e.g. to create files).
    pub fn on_with<F>(&self, needles: &[&str], f: F) -> &Self
    where
        F: Fn(&CommandSpec) -> CommandOutput + Send + Sync + 'static,
    {
        self.push(needles, Response::Func(Arc::new(f)));
        self
    }

    fn push(&self, needles: &[&str], response: Response) {
        let mut rules = self.rules.lock().unwrap();
        let needles: Vec<String> = needles.iter().map(|s| s.to_string()).collect();
        if let Some(rule) = rules.iter_mut().find(|r| r.needles == needles) {
            rule.responses.push_back(response);
        } else {
            rules.push(Rule {
                needles,
                responses: VecDeque::from([response]),
            });
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls containing every needle.
    pub fn count(&self, needles: &[&str]) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|spec| {
                let argv = argv(spec);
                needles.iter().all(|n| argv.contains(n))
            })
            .count()
    }
}

fn argv(spec: &CommandSpec) -> Vec<&str> {
    std::iter::once(spec.program.as_str())
        .chain(spec.args.iter().map(String::as_str))
        .collect()
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        let argv = argv(spec);
        let mut rules = self.rules.lock().unwrap();
        let output = match rules.iter_mut().find(|r| r.matches(&argv)) {
            Some(rule) => rule.next(spec),
            None => CommandOutput::failed(1, format!("unexpected command: {}", spec.display())),
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_repeat_last() {
        let runner = ScriptedRunner::new();
        runner
            .on(&["ps"], CommandOutput::ok("first"))
            .on(&["ps"], CommandOutput::ok("second"));
        let spec = CommandSpec::new("docker").args(["compose", "ps"]);
        assert_eq!(runner.run(&spec).await.unwrap().stdout, "first");
        assert_eq!(runner.run(&spec).await.unwrap().stdout, "second");
        assert_eq!(runner.run(&spec).await.unwrap().stdout, "second");
        assert_eq!(runner.count(&["ps"]), 3);
    }

    #[tokio::test]
    async fn test_unmatched_fails() {
        let runner = ScriptedRunner::new();
        let out = runner.run(&CommandSpec::new("git")).await.unwrap();
        assert_eq!(out.exit_code, Some(1));
    }
}
