//! Policy rules engine.
//!
//! Evaluates artifact content against a [`PolicyRuleSet`] and produces
//! severity-tagged [`PolicyViolation`]s. Policy findings are separate from
//! functional validation: `Error` findings block auto-approval, `Warning` and
//! `Info` findings are advisory.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{PolicyViolation, Severity, StageKind};

// ---------------------------------------------------------------------------
// Engine contract
// ---------------------------------------------------------------------------

/// Rule engine consulted once per review cycle.
pub trait PolicyEngine: Send + Sync {
    fn check(&self, content: &str, stage: StageKind) -> Vec<PolicyViolation>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A single built-in policy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    /// Base images must carry an explicit, non-`latest` tag or a digest.
    DockerUnpinnedImage,
    /// The final image must switch to a non-root `USER`.
    DockerRootUser,
    /// Images should declare a `HEALTHCHECK`.
    DockerNoHealthcheck,
    /// Workloads must set resource requests/limits.
    K8sNoResources,
    /// Workloads must not target the `default` namespace.
    K8sDefaultNamespace,
    /// Workloads should declare readiness probes.
    K8sNoReadinessProbe,
    /// Third-party actions must be pinned to a ref.
    CiUnpinnedAction,
    /// `pull_request_target` runs untrusted code with secrets.
    CiPullRequestTarget,
    /// Service images should be pinned.
    ComposeUnpinnedImage,
}

impl PolicyRule {
    pub fn id(self) -> &'static str {
        match self {
            Self::DockerUnpinnedImage => "docker-unpinned-image",
            Self::DockerRootUser => "docker-root-user",
            Self::DockerNoHealthcheck => "docker-no-healthcheck",
            Self::K8sNoResources => "k8s-no-resources",
            Self::K8sDefaultNamespace => "k8s-default-namespace",
            Self::K8sNoReadinessProbe => "k8s-no-readiness-probe",
            Self::CiUnpinnedAction => "ci-unpinned-action",
            Self::CiPullRequestTarget => "ci-pull-request-target",
            Self::ComposeUnpinnedImage => "compose-unpinned-image",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::DockerNoHealthcheck | Self::K8sNoReadinessProbe | Self::ComposeUnpinnedImage => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }

    pub fn applies_to(self, stage: StageKind) -> bool {
        match self {
            Self::DockerUnpinnedImage | Self::DockerRootUser | Self::DockerNoHealthcheck => {
                stage == StageKind::Dockerfile
            }
            Self::K8sNoResources | Self::K8sDefaultNamespace | Self::K8sNoReadinessProbe => {
                stage == StageKind::Kubernetes
            }
            Self::CiUnpinnedAction | Self::CiPullRequestTarget => stage == StageKind::Cicd,
            Self::ComposeUnpinnedImage => stage == StageKind::Compose,
        }
    }
}

/// An ordered set of policy rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRuleSet {
    pub rules: Vec<PolicyRule>,
}

impl PolicyRuleSet {
    /// Every built-in rule.
    pub fn standard() -> Self {
        Self {
            rules: vec![
                PolicyRule::DockerUnpinnedImage,
                PolicyRule::DockerRootUser,
                PolicyRule::DockerNoHealthcheck,
                PolicyRule::K8sNoResources,
                PolicyRule::K8sDefaultNamespace,
                PolicyRule::K8sNoReadinessProbe,
                PolicyRule::CiUnpinnedAction,
                PolicyRule::CiPullRequestTarget,
                PolicyRule::ComposeUnpinnedImage,
            ],
        }
    }

    pub fn without_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.retain(|r| *r != rule);
        self
    }
}

// ---------------------------------------------------------------------------
// Built-in engine
// ---------------------------------------------------------------------------

/// Rule engine over a [`PolicyRuleSet`]; needs no external tools.
#[derive(Debug, Clone)]
pub struct BuiltinPolicyEngine {
    rule_set: PolicyRuleSet,
}

impl BuiltinPolicyEngine {
    pub fn new(rule_set: PolicyRuleSet) -> Self {
        Self { rule_set }
    }
}

impl Default for BuiltinPolicyEngine {
    fn default() -> Self {
        Self::new(PolicyRuleSet::standard())
    }
}

impl PolicyEngine for BuiltinPolicyEngine {
    fn check(&self, content: &str, stage: StageKind) -> Vec<PolicyViolation> {
        let violations = evaluate_policy(&self.rule_set, content, stage);
        if violations.is_empty() {
            info!(stage = %stage, "policy check passed");
        } else {
            warn!(stage = %stage, count = violations.len(), "policy violations found");
        }
        violations
    }
}

/// Evaluate every rule that applies to `stage`, in rule-set order.
pub fn evaluate_policy(
    rule_set: &PolicyRuleSet,
    content: &str,
    stage: StageKind,
) -> Vec<PolicyViolation> {
    rule_set
        .rules
        .iter()
        .filter(|rule| rule.applies_to(stage))
        .flat_map(|rule| {
            check_rule(*rule, content)
                .into_iter()
                .map(move |message| PolicyViolation::new(rule.id(), message, rule.severity()))
        })
        .collect()
}

/// Lines that are not blank and not `#` comments, with 1-based numbers.
fn directive_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
}

fn instruction_arg<'a>(line: &'a str, instruction: &str) -> Option<&'a str> {
    let (head, rest) = line.split_once(char::is_whitespace)?;
    head.eq_ignore_ascii_case(instruction).then(|| rest.trim())
}

fn image_is_pinned(image: &str) -> bool {
    if image.contains('@') {
        return true;
    }
    let last = image.rsplit('/').next().unwrap_or(image);
    match last.split_once(':') {
        Some((_, tag)) => !tag.is_empty() && tag != "latest",
        None => false,
    }
}

fn check_rule(rule: PolicyRule, content: &str) -> Vec<String> {
    let lower = content.to_ascii_lowercase();
    match rule {
        PolicyRule::DockerUnpinnedImage => {
            let mut stage_aliases: Vec<String> = Vec::new();
            let mut found = Vec::new();
            for (n, line) in directive_lines(content) {
                let Some(arg) = instruction_arg(line, "FROM") else {
                    continue;
                };
                let mut tokens = arg.split_whitespace().filter(|t| !t.starts_with("--"));
                let Some(image) = tokens.next() else {
                    continue;
                };
                let is_alias = stage_aliases.iter().any(|a| a.eq_ignore_ascii_case(image));
                if !is_alias && image != "scratch" && !image_is_pinned(image) {
                    found.push(format!(
                        "Line {n}: image '{image}' uses :latest or an unpinned tag. Pin to a specific version."
                    ));
                }
                if let (Some(kw), Some(alias)) = (tokens.next(), tokens.next()) {
                    if kw.eq_ignore_ascii_case("as") {
                        stage_aliases.push(alias.to_string());
                    }
                }
            }
            found
        }

        PolicyRule::DockerRootUser => {
            let last_user = directive_lines(content)
                .filter_map(|(_, l)| instruction_arg(l, "USER"))
                .last();
            match last_user {
                None => vec!["No USER instruction found. Container will run as root.".to_string()],
                Some(user) if matches!(user.split(':').next(), Some("root") | Some("0")) => {
                    vec![format!("Final USER is '{user}'. Run as a non-root user.")]
                }
                Some(_) => Vec::new(),
            }
        }

        PolicyRule::DockerNoHealthcheck => {
            let has = directive_lines(content).any(|(_, l)| instruction_arg(l, "HEALTHCHECK").is_some());
            if has {
                Vec::new()
            } else {
                vec!["No HEALTHCHECK instruction. Consider adding one for production.".to_string()]
            }
        }

        PolicyRule::K8sNoResources => {
            if lower.contains("resources:") {
                Vec::new()
            } else {
                vec![
                    "No resource requests/limits found. All containers should have CPU and memory limits."
                        .to_string(),
                ]
            }
        }

        PolicyRule::K8sDefaultNamespace => {
            directive_lines(&lower)
                .filter(|(_, l)| l.replace(' ', "") == "namespace:default")
                .map(|(n, _)| {
                    format!("Line {n}: deploying to 'default' namespace. Use a dedicated namespace.")
                })
                .collect()
        }

        PolicyRule::K8sNoReadinessProbe => {
            if lower.replace(' ', "").contains("readinessprobe:") {
                Vec::new()
            } else {
                vec!["No readinessProbe found. Add readiness probes for zero-downtime deployments."
                    .to_string()]
            }
        }

        PolicyRule::CiUnpinnedAction => directive_lines(content)
            .filter_map(|(n, l)| {
                let reference = l.trim_start_matches("- ").strip_prefix("uses:")?.trim();
                let local = reference.starts_with("./") || reference.starts_with("docker://");
                (!reference.is_empty() && !local && !reference.contains('@')).then(|| {
                    format!("Line {n}: action '{reference}' is not pinned. Pin to a version or SHA.")
                })
            })
            .collect(),

        PolicyRule::CiPullRequestTarget => {
            if lower.contains("pull_request_target") {
                vec![
                    "'pull_request_target' trigger detected. Untrusted code would run with repository secrets."
                        .to_string(),
                ]
            } else {
                Vec::new()
            }
        }

        PolicyRule::ComposeUnpinnedImage => directive_lines(content)
            .filter_map(|(n, l)| {
                let image = l.strip_prefix("image:")?.trim().trim_matches('"');
                (!image.is_empty() && !image_is_pinned(image))
                    .then(|| format!("Line {n}: service image '{image}' is not pinned."))
            })
            .collect(),
    }
}
