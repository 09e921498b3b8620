use crate::{
    ids::{ToolName, ViolationId},
    model::*,
    types::{Evidence, TestInstance},
};

/// What to do with an automated verdict given the current row for its
/// (session, criterion, page).
#[derive(Clone, Debug, PartialEq)]
pub enum Reconciled {
    Insert(TestInstance),
    /// Overwrite the existing row; the id of the existing row is preserved.
    Replace(TestInstance),
    Keep,
}

/// Rules for folding an automated verdict into the existing one:
/// - a manual verdict is never touched by a tool run;
/// - `failed` replaces an automated `passed`/`pending`;
/// - `failed` on `failed` merges the evidence, replacing whatever the same
///   tool contributed last time;
/// - `passed` only lands when nothing exists yet.
pub fn reconcile_automated(existing: Option<&TestInstance>, incoming: TestInstance) -> Reconciled {
    let Some(current) = existing else {
        return Reconciled::Insert(incoming);
    };
    if current.method == TestMethod::Manual {
        return Reconciled::Keep;
    }

    if incoming.status != TestStatus::Failed {
        return Reconciled::Keep;
    }

    if current.status != TestStatus::Failed {
        let mut replaced = incoming;
        replaced.id = current.id.clone();
        return Reconciled::Replace(replaced);
    }

    let mut merged = current.clone();
    if let Some(tool) = incoming.tool_used.as_ref() {
        merged.evidence.retain(|ev| !is_violation_from(ev, tool));
    }
    for ev in incoming.evidence {
        if !merged.evidence.contains(&ev) {
            merged.evidence.push(ev);
        }
    }
    if incoming.confidence > merged.confidence {
        merged.confidence = incoming.confidence;
    }
    if merged.evidence == current.evidence && merged.confidence == current.confidence {
        return Reconciled::Keep;
    }
    merged.updated_at = incoming.updated_at;
    Reconciled::Replace(merged)
}

/// Strip evidence pointing at violations a rescan replaced. Returns whether
/// anything was removed.
pub fn withdraw_violations(ti: &mut TestInstance, withdrawn: &[ViolationId]) -> bool {
    let before = ti.evidence.len();
    ti.evidence.retain(|ev| match ev {
        Evidence::Violation { violation_id, .. } => !withdrawn.contains(violation_id),
        _ => true,
    });
    ti.evidence.len() != before
}

fn is_violation_from(ev: &Evidence, tool: &ToolName) -> bool {
    matches!(ev, Evidence::Violation { tool: t, .. } if t == tool)
}
