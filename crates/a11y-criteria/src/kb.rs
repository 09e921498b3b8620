use std::collections::{BTreeMap, BTreeSet, HashMap};

use a11y_core::{Confidence, CriterionId, ToolName};

use crate::builtin::{self, C};
use crate::catalogue::*;

/// Upper bound for the automated part of an effort estimate, regardless of
/// how many tools cover the criterion (they run in parallel).
pub const MAX_AUTOMATED_MINUTES: u32 = 5;
pub const MAX_MANUAL_MINUTES: u32 = 120;

/// Immutable rule -> criterion knowledge. Cheap to share behind an `Arc`.
#[derive(Clone, Debug)]
pub struct KnowledgeBase {
    criteria: BTreeMap<CriterionId, Criterion>,
    rules: HashMap<(ToolName, String), RuleMapping>,
    procedures: BTreeMap<CriterionId, ManualProcedure>,
    /// Best rule confidence per criterion, and the tools with such a rule.
    coverage: BTreeMap<CriterionId, (Confidence, BTreeSet<ToolName>)>,
    /// Best confidence per (tool, criterion).
    tool_criteria: BTreeMap<ToolName, BTreeMap<CriterionId, Confidence>>,
    policy: UnmappedPolicy,
}

impl KnowledgeBase {
    pub fn new(
        criteria: Vec<Criterion>,
        rules: Vec<RuleMapping>,
        procedures: Vec<ManualProcedure>,
        policy: UnmappedPolicy,
    ) -> Self {
        let criteria: BTreeMap<_, _> = criteria.into_iter().map(|c| (c.id.clone(), c)).collect();

        let mut coverage: BTreeMap<CriterionId, (Confidence, BTreeSet<ToolName>)> = BTreeMap::new();
        let mut tool_criteria: BTreeMap<ToolName, BTreeMap<CriterionId, Confidence>> = BTreeMap::new();
        for rule in &rules {
            for c in &rule.criteria {
                let entry = coverage.entry(c.clone()).or_insert((rule.confidence, BTreeSet::new()));
                entry.0 = entry.0.max(rule.confidence);
                entry.1.insert(rule.tool.clone());
                let best = tool_criteria.entry(rule.tool.clone()).or_default().entry(c.clone()).or_insert(rule.confidence);
                *best = (*best).max(rule.confidence);
            }
        }

        let rules = rules
            .into_iter()
            .map(|r| ((r.tool.clone(), r.rule_id.clone()), r))
            .collect();
        let procedures = procedures.into_iter().map(|p| (p.criterion.clone(), p)).collect();

        Self { criteria, rules, procedures, coverage, tool_criteria, policy }
    }

    /// The shipped WCAG 2.1 A/AA tables for axe-core, pa11y and lighthouse.
    pub fn builtin(policy: UnmappedPolicy) -> Self {
        let criteria = builtin::CRITERIA
            .iter()
            .filter_map(|(id, title, level)| {
                let id = CriterionId::new(*id);
                Principle::of(&id).map(|principle| Criterion {
                    id,
                    title: title.to_string(),
                    level: *level,
                    principle,
                })
            })
            .collect();

        let mut rules = vec![];
        for (tool, table) in [
            (ToolName::AXE, builtin::AXE_RULES),
            (ToolName::PA11Y, builtin::PA11Y_RULES),
            (ToolName::LIGHTHOUSE, builtin::LIGHTHOUSE_RULES),
        ] {
            for (rule_id, crit, conf) in table {
                rules.push(RuleMapping {
                    tool: ToolName::new(tool),
                    rule_id: rule_id.to_string(),
                    criteria: crit.iter().map(|c| CriterionId::new(*c)).collect(),
                    confidence: match conf {
                        C::H => Confidence::High,
                        C::M => Confidence::Medium,
                        C::L => Confidence::Low,
                    },
                });
            }
        }

        let procedures = builtin::PROCEDURES
            .iter()
            .map(|(id, title, steps, tools)| ManualProcedure {
                criterion: CriterionId::new(*id),
                title: title.to_string(),
                steps: steps.iter().map(|s| s.to_string()).collect(),
                tools_needed: tools.iter().map(|s| s.to_string()).collect(),
            })
            .collect();

        Self::new(criteria, rules, procedures, policy)
    }

    pub fn policy(&self) -> &UnmappedPolicy {
        &self.policy
    }

    pub fn criterion(&self, id: &CriterionId) -> Option<&Criterion> {
        self.criteria.get(id)
    }

    pub fn criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria.values()
    }

    pub fn rule(&self, tool: &ToolName, rule_id: &str) -> Option<&RuleMapping> {
        self.rules.get(&(tool.clone(), rule_id.to_string()))
    }

    /// Table lookup, then tag/code inference, then the unmapped policy. Never fails.
    pub fn map_rule_to_criteria(&self, tool: &ToolName, rule_id: &str, tags: &[String]) -> CriteriaMatch {
        if let Some(rule) = self.rule(tool, rule_id) {
            return CriteriaMatch {
                criteria: rule.criteria.iter().cloned().collect(),
                source: MatchSource::Table,
            };
        }

        let inferred: BTreeSet<CriterionId> = std::iter::once(rule_id)
            .chain(tags.iter().map(String::as_str))
            .flat_map(infer_criteria)
            .filter(|c| self.criteria.contains_key(c))
            .collect();
        if !inferred.is_empty() {
            return CriteriaMatch { criteria: inferred, source: MatchSource::Tags };
        }

        match &self.policy {
            UnmappedPolicy::Sentinel => CriteriaMatch { criteria: BTreeSet::new(), source: MatchSource::Unmapped },
            UnmappedPolicy::DefaultCriterion { criterion } => CriteriaMatch {
                criteria: BTreeSet::from([criterion.clone()]),
                source: MatchSource::Fallback,
            },
        }
    }

    pub fn get_strategy(&self, criterion: &CriterionId) -> TestStrategy {
        let automated_coverage = self
            .coverage
            .get(criterion)
            .map(|(conf, _)| Coverage::from(*conf))
            .unwrap_or(Coverage::None);
        let has_procedure = self.procedures.contains_key(criterion);

        let primary = match (automated_coverage, has_procedure) {
            (Coverage::None, _) => TestApproach::Manual,
            (Coverage::Low, true) => TestApproach::Manual,
            (_, true) => TestApproach::Hybrid,
            (Coverage::High, false) => TestApproach::Automated,
            (_, false) => TestApproach::Hybrid,
        };
        TestStrategy { primary, automated_coverage }
    }

    pub fn get_manual_procedure(&self, criterion: &CriterionId) -> Option<&ManualProcedure> {
        self.procedures.get(criterion)
    }

    pub fn estimate_effort(&self, criterion: &CriterionId) -> EffortEstimate {
        let tools = self.coverage.get(criterion).map(|(_, t)| t.len() as u32).unwrap_or(0);
        let automated_minutes = (tools * 2).min(MAX_AUTOMATED_MINUTES);
        let manual_minutes = self
            .procedures
            .get(criterion)
            .map(|p| (5 + 3 * p.steps.len() as u32).min(MAX_MANUAL_MINUTES))
            .unwrap_or(0);
        EffortEstimate { automated_minutes, manual_minutes }
    }

    /// Criteria a tool is known to decide (at least one medium/high rule).
    /// Low-confidence rules are hints, not coverage a pass can be derived from.
    pub fn tool_wcag_mappings(&self, tool: &ToolName) -> BTreeSet<CriterionId> {
        self.tool_criteria
            .get(tool)
            .map(|m| m.iter().filter(|(_, c)| **c >= Confidence::Medium).map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }

    /// Best confidence of the tool's rules for `criterion`.
    pub fn tool_coverage(&self, tool: &ToolName, criterion: &CriterionId) -> Option<Confidence> {
        self.tool_criteria.get(tool)?.get(criterion).copied()
    }
}

/// Criterion numbers embedded in a rule id or tag.
///
/// Understands axe tags (`wcag143`, `wcag1410`) and HTML_CodeSniffer code
/// segments (`1_4_3`). Level tags such as `wcag2aa` are ignored.
pub fn infer_criteria(token: &str) -> Vec<CriterionId> {
    let lower = token.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("wcag") {
        if rest.len() >= 3 && rest.bytes().all(|b| b.is_ascii_digit()) {
            return vec![CriterionId::new(format!("{}.{}.{}", &rest[..1], &rest[1..2], &rest[2..]))];
        }
        if !rest.contains('.') {
            return vec![];
        }
    }

    token
        .split(|c: char| c == '.' || c == ',')
        .filter_map(|seg| {
            let parts: Vec<&str> = seg.split('_').collect();
            let numeric = parts.len() == 3
                && parts.iter().all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
            numeric.then(|| CriterionId::new(parts.join(".")))
        })
        .collect()
}
