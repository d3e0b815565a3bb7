//! Engine source checkout and the pluggable "existing checkout" decision.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

use crate::config::ExistingSourcePolicy;

/// What to do with a checkout left by a previous run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceDecision {
    /// Delete it and fetch again.
    Clean,
    /// Build from it as-is.
    Reuse,
    /// Stop provisioning without error.
    Cancel,
}

/// Decides what happens to an existing checkout.
///
/// An `Err` aborts provisioning with a failure status.
pub trait SourceDecider {
    fn decide(&mut self, existing: &Path) -> Result<SourceDecision, String>;
}

/// Always answers with the same decision.
#[derive(Clone, Copy, Debug)]
pub struct FixedDecider(pub SourceDecision);

impl SourceDecider for FixedDecider {
    fn decide(&mut self, _existing: &Path) -> Result<SourceDecision, String> {
        Ok(self.0)
    }
}

/// Refuses to guess: any existing checkout aborts the run.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonInteractiveDecider;

impl SourceDecider for NonInteractiveDecider {
    fn decide(&mut self, existing: &Path) -> Result<SourceDecision, String> {
        Err(format!(
            "Existing checkout at {} and no operator to ask; set on_existing_source to \"clean\" or \"reuse\"",
            existing.display()
        ))
    }
}

/// Asks the operator to pick a decision.
pub struct PromptDecider<R, W> {
    input: R,
    output: W,
}

impl PromptDecider<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> PromptDecider<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> SourceDecider for PromptDecider<R, W> {
    fn decide(&mut self, existing: &Path) -> Result<SourceDecision, String> {
        let prompt_error = |err: io::Error| format!("Failed to prompt for a decision: {err}");
        write!(
            self.output,
            "Existing engine checkout found at {}. What would you like to do?\n\
             1) Clean and fetch again (recommended if a previous build failed)\n\
             2) Continue with the existing checkout\n\
             3) Cancel\n\
             Enter your choice (1-3): ",
            existing.display()
        )
        .map_err(prompt_error)?;
        self.output.flush().map_err(prompt_error)?;
        let mut answer = String::new();
        self.input.read_line(&mut answer).map_err(prompt_error)?;
        parse_choice(answer.trim())
    }
}

fn parse_choice(answer: &str) -> Result<SourceDecision, String> {
    match answer {
        "1" => Ok(SourceDecision::Clean),
        "2" => Ok(SourceDecision::Reuse),
        "3" => Ok(SourceDecision::Cancel),
        other => Err(format!("Invalid choice '{other}'; provisioning cancelled")),
    }
}

/// Pick the decider for `policy`. Prompting needs a terminal and no `CI` marker.
pub fn default_decider(policy: ExistingSourcePolicy) -> Box<dyn SourceDecider> {
    let interactive = io::stdin().is_terminal() && std::env::var_os("CI").is_none();
    decider_for(policy, interactive)
}

fn decider_for(policy: ExistingSourcePolicy, interactive: bool) -> Box<dyn SourceDecider> {
    match policy {
        ExistingSourcePolicy::Prompt if interactive => Box::new(PromptDecider::stdio()),
        ExistingSourcePolicy::Prompt | ExistingSourcePolicy::Abort => {
            Box::new(NonInteractiveDecider)
        }
        ExistingSourcePolicy::Clean => Box::new(FixedDecider(SourceDecision::Clean)),
        ExistingSourcePolicy::Reuse => Box::new(FixedDecider(SourceDecision::Reuse)),
    }
}
