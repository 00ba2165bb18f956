//! Prompt rendering.
//!
//! Turns a [`ContextBundle`] into a bounded prompt. What gets inlined is
//! decided by [`InlinePolicy`], not by ad-hoc slicing at call sites.

use std::fmt::Write;

use crate::context::{ContextBundle, ContextMode};
use crate::model::{ChatMessage, MetricSample, Neighbor};

/// Limits applied when inlining bundle data into a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlinePolicy {
    /// Samples inlined per (service, metric) series; the rest is replaced by a marker.
    pub samples_per_group: usize,
    /// Characters kept from each runbook excerpt.
    pub runbook_chars: usize,
}

impl Default for InlinePolicy {
    fn default() -> Self {
        Self {
            samples_per_group: 5,
            runbook_chars: 800,
        }
    }
}

/// What the generation step is asked to do with the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// One-shot SLO recommendation.
    Recommend,
    /// Follow-up conversation grounded in the bundle.
    Chat,
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((end, _)) => format!("{}... [truncated]", &text[..end]),
    }
}

fn render_neighbors(out: &mut String, title: &str, neighbors: &[Neighbor]) {
    let _ = writeln!(out, "**{}**:", title);
    if neighbors.is_empty() {
        out.push_str("- none\n");
    }
    for n in neighbors {
        let _ = writeln!(out, "- {} ({}, {}), criticality {}", n.name, n.service_type, n.tier, n.criticality);
    }
}

fn render_metrics(out: &mut String, samples: &[MetricSample], policy: &InlinePolicy) {
    if samples.is_empty() {
        out.push_str("- no samples in window\n");
        return;
    }

    // Samples arrive grouped, so consecutive runs share a key.
    let mut start = 0;
    while start < samples.len() {
        let key = (&samples[start].service_name, &samples[start].metric_name);
        let end = samples[start..]
            .iter()
            .position(|s| (&s.service_name, &s.metric_name) != key)
            .map_or(samples.len(), |offset| start + offset);
        let group = &samples[start..end];

        let inlined: Vec<String> = group
            .iter()
            .take(policy.samples_per_group)
            .map(|s| format!("{} = {:.3}", s.timestamp.format("%Y-%m-%d %H:%M"), s.value))
            .collect();
        let _ = write!(out, "- {} / {}: {}", key.0, key.1, inlined.join(", "));
        let hidden = group.len().saturating_sub(policy.samples_per_group);
        if hidden > 0 {
            let _ = write!(out, " ... ({} more samples truncated)", hidden);
        }
        out.push('\n');

        start = end;
    }
}

/// Bundle as prompt text: service, dependencies, metrics and runbooks.
pub fn render_context(bundle: &ContextBundle, policy: &InlinePolicy) -> String {
    let mut out = String::new();
    let service = &bundle.service;
    let _ = writeln!(out, "**Service Context**:");
    let _ = writeln!(out, "- Name: {}", service.name);
    let _ = writeln!(out, "- Type: {}", service.service_type);
    let _ = writeln!(out, "- Tier: {}", service.tier);
    out.push('\n');

    render_neighbors(&mut out, "Downstream Dependencies (services it calls)", &bundle.downstream);
    out.push('\n');
    render_neighbors(&mut out, "Upstream Dependents (services calling it)", &bundle.upstream);
    out.push('\n');

    let window = bundle.mode.window();
    let _ = writeln!(
        out,
        "**Historical Metrics (last {}h, {} services, up to {} samples per series)**:",
        window.hours,
        if bundle.mode == ContextMode::Summary { 1 } else { bundle.blast_radius.len() },
        window.max_per_group
    );
    render_metrics(&mut out, &bundle.metrics, policy);
    out.push('\n');

    let _ = writeln!(out, "**Relevant Runbooks**:");
    if bundle.runbooks.is_empty() {
        out.push_str("- none found\n");
    }
    for rb in &bundle.runbooks {
        let _ = writeln!(out, "- {}", excerpt(rb, policy.runbook_chars));
    }
    out
}

const RECOMMEND_TASK: &str = "\
**Task**:
1. Analyze the service's criticality based on its tier and dependencies.
2. Evaluate its recent performance (latency, error rates) from the metrics.
3. Recommend specific SLOs for:
   - Availability (e.g., 99.9%, 99.99%)
   - Latency (e.g., P99 < 200ms)
4. Provide a \"Strategy\" or \"Reasoning\" section explaining WHY you chose these targets, \
citing specific runbooks or metric trends if relevant.

**Output Format**:
Return the response in Markdown format.";

const CHAT_TASK: &str = "\
**Instructions**:
- Answer the user's follow-up questions based on the provided context.
- If the user asks to adjust the SLO, analyze the impact on upstream dependents and downstream dependencies using the metrics.
- Be concise and helpful.";

/// Message sequence for the generation backend.
pub fn build_messages(
    bundle: &ContextBundle,
    instruction: Instruction,
    history: &[ChatMessage],
    policy: &InlinePolicy,
) -> Vec<ChatMessage> {
    let context = render_context(bundle, policy);
    match instruction {
        Instruction::Recommend => {
            let prompt = format!(
                "You are an expert Site Reliability Engineer (SRE). Your task is to recommend Service Level \
                 Objectives (SLOs) for a microservice based on its topology, historical metrics, and operational \
                 runbooks.\n\n{}\n{}",
                context, RECOMMEND_TASK
            );
            let mut messages = vec![ChatMessage::user(prompt)];
            messages.extend(history.iter().cloned());
            messages
        }
        Instruction::Chat => {
            let system = format!(
                "You are an expert SRE assistant helping a user with SLO recommendations.\n\n{}\n{}",
                context, CHAT_TASK
            );
            std::iter::once(ChatMessage::system(system))
                .chain(history.iter().cloned())
                .collect()
        }
    }
}
