//! C8 Fix Generator (spec §4.8).

use std::collections::HashSet;

use loglens_domain::model::{FixStep, FixSuggestion, PatternMatch, Risk};

use crate::template_store::TemplateStore;

fn substitute(payload: &str, captures: &std::collections::HashMap<String, String>) -> Result<String, String> {
    let mut out = String::with_capacity(payload.len());
    let mut chars = payload.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut name = String::new();
            let mut closed = false;
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    closed = true;
                    break;
                }
                name.push(c2);
            }
            if !closed {
                return Err(format!("unterminated placeholder in '{payload}'"));
            }
            match captures.get(&name) {
                Some(value) => out.push_str(value),
                None => return Err(format!("missing capture '{name}' for placeholder")),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

fn instantiate_step(
    step: &FixStep,
    captures: &std::collections::HashMap<String, String>,
) -> Result<FixStep, String> {
    Ok(match step {
        FixStep::FileEdit {
            target,
            mode,
            payload,
            validation,
        } => FixStep::FileEdit {
            target: target.clone(),
            mode: *mode,
            payload: substitute(payload, captures)?,
            validation: validation.clone(),
        },
        FixStep::FileCreate {
            target,
            payload,
            validation,
        } => FixStep::FileCreate {
            target: target.clone(),
            payload: substitute(payload, captures)?,
            validation: validation.clone(),
        },
        FixStep::FileDelete { target, validation } => FixStep::FileDelete {
            target: target.clone(),
            validation: validation.clone(),
        },
        FixStep::Command {
            argv,
            timeout_secs,
            validation,
        } => {
            let resolved = argv
                .iter()
                .map(|a| substitute(a, captures))
                .collect::<Result<Vec<_>, _>>()?;
            FixStep::Command {
                argv: resolved,
                timeout_secs: *timeout_secs,
                validation: validation.clone(),
            }
        }
    })
}

fn steps_satisfy_policy(steps: &[FixStep], command_allowlist: &HashSet<String>) -> bool {
    steps.iter().all(|step| match step {
        FixStep::Command { argv, .. } => {
            !argv.is_empty() && command_allowlist.contains(&argv[0])
        }
        FixStep::FileEdit { target, .. }
        | FixStep::FileCreate { target, .. }
        | FixStep::FileDelete { target, .. } => {
            !target.starts_with('/') && !target.contains("..")
        }
    })
}

/// Generate zero or more ranked `FixSuggestion`s for a pattern match
/// (spec §4.8).
pub fn generate_suggestions(
    m: &PatternMatch,
    templates: &TemplateStore,
    risk_tolerance: Risk,
    auto_fix_confidence_threshold: f64,
    command_allowlist: &HashSet<String>,
) -> Vec<FixSuggestion> {
    let candidates = templates.for_pattern(&m.pattern_id);
    let mut suggestions = Vec::new();

    for template in candidates {
        let mut steps = Vec::with_capacity(template.steps.len());
        let mut instantiation_failed = false;
        for step in &template.steps {
            match instantiate_step(step, &m.captures) {
                Ok(concrete) => steps.push(concrete),
                Err(_reason) => {
                    instantiation_failed = true;
                    break;
                }
            }
        }
        if instantiation_failed {
            continue;
        }

        let confidence = (m.confidence * template.success_rate).clamp(0.0, 1.0);
        let policy_ok = steps_satisfy_policy(&steps, command_allowlist);
        let auto_applicable = template.risk <= risk_tolerance
            && confidence >= auto_fix_confidence_threshold
            && policy_ok;

        suggestions.push(FixSuggestion {
            id: format!("{}::{}", template.id, m.pattern_id),
            title: template.name.clone(),
            description: template.description.clone(),
            pattern_id: m.pattern_id.clone(),
            template_id: template.id.clone(),
            steps,
            risk: template.risk,
            estimated_wall_clock: template.estimated_wall_clock.clone(),
            confidence,
            auto_applicable,
            validation_steps: template.validation_steps.clone(),
        });
    }

    suggestions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                // success_rate isn't retained on FixSuggestion directly;
                // risk and id provide the remaining deterministic
                // tie-break chain (spec §4.8 ranking).
                a.risk.cmp(&b.risk)
            })
            .then_with(|| a.template_id.cmp(&b.template_id))
    });

    suggestions
}
