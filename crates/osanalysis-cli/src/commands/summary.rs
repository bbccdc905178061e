use crate::cli::SummaryArgs;
use crate::error::{CliError, Result};
use osanalysis::core::io::json::JsonAnalysisFile;
use osanalysis::core::io::summary::{write_summary, write_summary_to_path};
use osanalysis::core::io::traits::AnalysisFile;
use osanalysis::core::models::analysis::Analysis;
use osanalysis::core::models::summary::SummaryTable;
use osanalysis::engine::algorithms;
use tracing::info;
use uuid::Uuid;

pub async fn run(args: SummaryArgs) -> Result<()> {
    info!("Loading analysis from {:?}", &args.input);
    let (analysis, _) =
        JsonAnalysisFile::read_from_path(&args.input).map_err(|e| CliError::FileParsing {
            path: args.input.clone(),
            source: e.into(),
        })?;

    let table = build_table(&analysis, &args)?;
    info!("Summary table has {} row(s).", table.len());

    match &args.output {
        Some(path) => {
            write_summary_to_path(&table, path).map_err(|e| CliError::Other(e.into()))?;
            println!("✓ Summary of {} DataPoint(s) written to: {}", table.len(), path.display());
        }
        None => {
            write_summary(&table, std::io::stdout().lock())
                .map_err(|e| CliError::Other(e.into()))?;
        }
    }
    Ok(())
}

fn build_table(analysis: &Analysis, args: &SummaryArgs) -> Result<SummaryTable> {
    let table = analysis.summary_table();
    if args.pareto {
        let front: Vec<Uuid> = algorithms::pareto_front(analysis)
            .iter()
            .map(|dp| dp.uuid())
            .collect();
        return Ok(select_rows(table, &front));
    }
    if let Some(objective) = args.curve {
        if objective > 1 {
            return Err(CliError::Argument(format!(
                "--curve takes objective 0 or 1, got {}",
                objective
            )));
        }
        let curve: Vec<Uuid> = algorithms::minimum_curve(analysis, objective)
            .iter()
            .map(|dp| dp.uuid())
            .collect();
        return Ok(select_rows(table, &curve));
    }
    Ok(table)
}

/// Keeps the rows of `uuids`, in that order.
fn select_rows(mut table: SummaryTable, uuids: &[Uuid]) -> SummaryTable {
    let rows = std::mem::take(&mut table.rows);
    table.rows = uuids
        .iter()
        .filter_map(|uuid| rows.iter().find(|row| row.data_point == *uuid).cloned())
        .collect();
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use osanalysis::core::models::summary::{RunStatus, SummaryRow};

    fn row(name: &str) -> SummaryRow {
        SummaryRow {
            data_point: Uuid::new_v4(),
            name: name.to_string(),
            status: RunStatus::Succeeded,
            variable_values: vec!["x".to_string()],
            objective_values: vec![Some(1.0)],
        }
    }

    #[test]
    fn select_rows_follows_the_requested_order() {
        let rows = vec![row("a"), row("b"), row("c")];
        let wanted = vec![rows[2].data_point, Uuid::new_v4(), rows[0].data_point];
        let table = SummaryTable {
            variable_names: vec!["x".to_string()],
            objective_names: vec!["f".to_string()],
            rows,
        };

        let selected = select_rows(table, &wanted);

        let names: Vec<&str> = selected.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a"]);
        assert_eq!(selected.variable_names, vec!["x".to_string()]);
    }
}
