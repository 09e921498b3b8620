use a11y_core::{CriterionId, Violation, WorkflowType};
use a11y_criteria::{Criterion, ManualProcedure};

/// Everything a reviewer packet is built from.
pub struct ProcedureContext<'a> {
    pub criterion_id: &'a CriterionId,
    pub criterion: Option<&'a Criterion>,
    pub procedure: Option<&'a ManualProcedure>,
    pub workflow_type: WorkflowType,
    pub violation: Option<&'a Violation>,
}

const GENERIC_STEPS: &[&str] = &[
    "Open the page and locate the reported element",
    "Check the element against the success criterion's requirements",
    "Record whether the finding is a real failure, with a note on the evidence",
];

fn task_line(workflow_type: WorkflowType) -> &'static str {
    match workflow_type {
        WorkflowType::ViolationVerification => "Confirm whether the reported violation is real.",
        WorkflowType::FalsePositiveCheck => "Low-confidence finding. Check whether it is a false positive.",
        WorkflowType::ManualConfirmation => "Automated tools cannot decide this criterion. Test it by hand.",
        WorkflowType::RemediationValidation => "A fix was claimed for a confirmed violation. Verify it.",
    }
}

/// Markdown packet handed to the reviewer with a task.
pub fn render_procedure(ctx: &ProcedureContext<'_>) -> String {
    let mut s = String::new();
    match ctx.criterion {
        Some(c) => s.push_str(&format!("# {} {} (Level {:?})\n\n", c.id, c.title, c.level)),
        None => s.push_str(&format!("# {}\n\n", ctx.criterion_id)),
    }
    s.push_str(&format!("**Task:** {}\n\n", task_line(ctx.workflow_type)));

    if let Some(v) = ctx.violation {
        s.push_str("## Finding\n");
        s.push_str(&format!("- Tool: {}\n", v.tool));
        s.push_str(&format!("- Rule: {}\n", v.rule_id));
        s.push_str(&format!("- Severity: {}\n", v.severity));
        if !v.selector.is_empty() {
            s.push_str(&format!("- Element: `{}`\n", v.selector));
        }
        if !v.description.is_empty() {
            s.push_str(&format!("- Reported: {}\n", v.description));
        }
        if let Some(url) = &v.help_url {
            s.push_str(&format!("- Reference: {}\n", url));
        }
        s.push('\n');
    }

    match ctx.procedure {
        Some(p) => {
            s.push_str(&format!("## Steps: {}\n", p.title));
            for (i, step) in p.steps.iter().enumerate() {
                s.push_str(&format!("{}. {}\n", i + 1, step));
            }
            if !p.tools_needed.is_empty() {
                s.push_str("\n## Tools needed\n");
                for t in &p.tools_needed {
                    s.push_str(&format!("- {}\n", t));
                }
            }
        }
        None => {
            s.push_str("## Steps\n");
            for (i, step) in GENERIC_STEPS.iter().enumerate() {
                s.push_str(&format!("{}. {}\n", i + 1, step));
            }
        }
    }

    s.push_str("\n## Outcome\n");
    s.push_str("- [1] Violation confirmed\n");
    s.push_str("- [2] False positive\n");
    s.push_str("- [3] Resolved / passes\n");
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use a11y_core::*;
    use a11y_criteria::{KnowledgeBase, UnmappedPolicy};

    #[test]
    fn packet_with_finding_and_procedure() {
        let kb = KnowledgeBase::builtin(UnmappedPolicy::Sentinel);
        let id = CriterionId::new("1.1.1");
        let v = Violation {
            id: ViolationId::new(),
            scan_result_id: ScanResultId::new(),
            session_id: SessionId::new(),
            page_id: PageId::new(),
            tool: ToolName::new(ToolName::AXE),
            rule_id: "image-alt".into(),
            severity: Severity::Critical,
            description: "Images must have alternate text".into(),
            selector: "img.hero".into(),
            help_url: Some("https://dequeuniversity.com/rules/axe/4.8/image-alt".into()),
            tags: vec![],
        };
        let md = render_procedure(&ProcedureContext {
            criterion_id: &id,
            criterion: kb.criterion(&id),
            procedure: kb.get_manual_procedure(&id),
            workflow_type: WorkflowType::ViolationVerification,
            violation: Some(&v),
        });
        assert!(md.starts_with("# 1.1.1 Non-text Content (Level A)\n\n**Task:** Confirm whether"));
        assert!(md.contains("- Element: `img.hero`\n"));
        assert!(md.contains("- Severity: critical\n"));
        assert!(md.contains("1. List every img"));
        assert!(md.contains("## Tools needed\n- screen reader\n"));
        assert!(md.ends_with("- [3] Resolved / passes\n"));
    }

    #[test]
    fn generic_steps_without_procedure() {
        let id = CriterionId::new("9.9.9");
        let md = render_procedure(&ProcedureContext {
            criterion_id: &id,
            criterion: None,
            procedure: None,
            workflow_type: WorkflowType::FalsePositiveCheck,
            violation: None,
        });
        let expected = "# 9.9.9\n\n\
                        **Task:** Low-confidence finding. Check whether it is a false positive.\n\n\
                        ## Steps\n\
                        1. Open the page and locate the reported element\n\
                        2. Check the element against the success criterion's requirements\n\
                        3. Record whether the finding is a real failure, with a note on the evidence\n\
                        \n## Outcome\n\
                        - [1] Violation confirmed\n\
                        - [2] False positive\n\
                        - [3] Resolved / passes\n";
        assert_eq!(md, expected);
    }
}
