use std::io::{BufRead, Write};

use crate::model::*;
use crate::ops::merge_ops::{BaseChoice, ConflictChoice, DecisionProvider};

/// Asks a person to settle each cluster. Reads answers line by line from
/// `input` and writes prompts to `output`; end of input cancels the
/// pending decision.
pub struct PromptDecisionProvider<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptDecisionProvider<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }

    /// Prompt and read a line. Returns None on EOF.
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        write!(self.output, "{}", prompt).ok();
        self.output.flush().ok();
        let mut buf = String::new();
        match self.input.read_line(&mut buf) {
            Ok(0) => None,
            Ok(_) => Some(buf.trim().to_string()),
            Err(_) => None,
        }
    }

    /// Reads a 1-based choice and returns it 0-based. `None` for `escape`
    /// or end of input.
    fn pick(
        &mut self,
        prompt: &str,
        count: usize,
        escape: &str,
        default: Option<usize>,
    ) -> Option<usize> {
        loop {
            let answer = self.read_line(prompt)?;
            if answer.eq_ignore_ascii_case(escape) {
                return None;
            }
            if answer.is_empty() {
                if let Some(index) = default {
                    return Some(index);
                }
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=count).contains(&n) => return Some(n - 1),
                _ => {
                    writeln!(
                        self.output,
                        "Please enter a number between 1 and {}, or '{}'.",
                        count, escape
                    )
                    .ok();
                }
            }
        }
    }

    fn describe(&mut self, n: usize, contact: &Contact) {
        let sources: Vec<&str> = contact.sources.iter().map(|s| s.label.as_str()).collect();
        writeln!(
            self.output,
            "  {}. {} [{}]",
            n,
            contact.label(),
            sources.join(", ")
        )
        .ok();
        if let Some(org) = &contact.organization {
            writeln!(self.output, "       org: {}", org).ok();
        }
        for email in &contact.emails {
            writeln!(self.output, "       email: {}", email.address).ok();
        }
        for phone in &contact.phones {
            writeln!(self.output, "       tel: {}", phone.number.canonical).ok();
        }
        for address in &contact.addresses {
            writeln!(self.output, "       adr: {}", address).ok();
        }
    }
}

impl<R: BufRead, W: Write> DecisionProvider for PromptDecisionProvider<R, W> {
    fn choose_base(&mut self, cluster: &DuplicateCluster, members: &[&Contact]) -> BaseChoice {
        writeln!(self.output).ok();
        writeln!(
            self.output,
            "Possible duplicates ({}, {} contacts):",
            cluster.id,
            members.len()
        )
        .ok();
        for (i, member) in members.iter().enumerate() {
            self.describe(i + 1, member);
        }

        let prompt = format!("Merge into which contact? [1-{}, s to skip]: ", members.len());
        match self.pick(&prompt, members.len(), "s", None) {
            Some(index) => BaseChoice::Base(members[index].id),
            None => BaseChoice::Skip,
        }
    }

    fn resolve_conflict(
        &mut self,
        _cluster: &DuplicateCluster,
        members: &[&Contact],
        conflict: &FieldConflict,
    ) -> ConflictChoice {
        writeln!(self.output, "Conflicting {}:", conflict.field).ok();
        for (i, value) in conflict.values.iter().enumerate() {
            let from = members
                .iter()
                .find(|m| m.id == value.contact)
                .map(|m| m.label())
                .unwrap_or_else(|| value.contact.to_string());
            writeln!(self.output, "  {}. {} (from {})", i + 1, value.value, from).ok();
        }

        let prompt = format!(
            "Keep which value? [1-{}, Enter for 1, c to cancel]: ",
            conflict.values.len()
        );
        match self.pick(&prompt, conflict.values.len(), "c", Some(0)) {
            Some(index) => ConflictChoice::Value(index),
            None => ConflictChoice::Cancel,
        }
    }
}
