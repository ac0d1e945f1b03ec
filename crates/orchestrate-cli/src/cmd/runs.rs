use crate::output::{print_json, print_table};
use orchestrate_core::orchestrator::{RunOutcome, RunRecord};
use std::path::Path;

pub fn run(root: &Path, limit: usize, json: bool) -> anyhow::Result<()> {
    let records = RunRecord::list(root)?;
    let skip = records.len().saturating_sub(limit);
    let recent = &records[skip..];

    if json {
        return print_json(&recent);
    }
    if records.is_empty() {
        println!("no runs recorded");
        return Ok(());
    }
    if recent.is_empty() {
        println!("0 of {} runs shown", records.len());
        return Ok(());
    }

    let rows: Vec<Vec<String>> = recent
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                r.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                if r.push { "yes" } else { "no" }.to_string(),
                outcome_label(&r.outcome),
            ]
        })
        .collect();
    print_table(&["RUN", "STARTED (UTC)", "PUSH", "OUTCOME"], &rows);
    Ok(())
}

fn outcome_label(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Running => "running".to_string(),
        RunOutcome::Succeeded => "succeeded".to_string(),
        RunOutcome::Failed {
            stage, component, ..
        } => match component {
            Some(c) => format!("failed at {stage} ({c})"),
            None => format!("failed at {stage}"),
        },
    }
}
