//! Playbook runs: `ansible-playbook <playbook> -l .. -t .. --skip-tags ..`.

use super::add_expanded_option;
use crate::args::ArgumentList;
use crate::error::{InvocationError, Result};
use crate::expand::EnvVars;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybookCommand {
    pub playbook: String,
    pub limit: Option<String>,
    pub tags: Option<String>,
    pub skipped_tags: Option<String>,
    pub start_at_task: Option<String>,
}

impl PlaybookCommand {
    pub fn new(playbook: impl Into<String>) -> Self {
        Self {
            playbook: playbook.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: impl Into<String>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn with_skipped_tags(mut self, skipped_tags: impl Into<String>) -> Self {
        self.skipped_tags = Some(skipped_tags.into());
        self
    }

    pub fn with_start_at_task(mut self, task: impl Into<String>) -> Self {
        self.start_at_task = Some(task.into());
        self
    }

    /// Expanded playbook path; blank is a configuration error.
    pub fn playbook(&self, env: &EnvVars) -> Result<String> {
        env.expand_non_blank(Some(&self.playbook))
            .ok_or_else(|| InvocationError::config("Playbook path must not be blank"))
    }

    pub(crate) fn add_positional(&self, args: &mut ArgumentList, env: &EnvVars) -> Result<()> {
        args.add(self.playbook(env)?);
        Ok(())
    }

    pub(crate) fn add_flags(&self, args: &mut ArgumentList, env: &EnvVars) {
        add_expanded_option(args, env, "-l", self.limit.as_deref());
        add_expanded_option(args, env, "-t", self.tags.as_deref());
        add_expanded_option(args, env, "--skip-tags", self.skipped_tags.as_deref());
        add_expanded_option(args, env, "--start-at-task", self.start_at_task.as_deref());
    }
}
