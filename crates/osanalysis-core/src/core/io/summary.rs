use crate::core::models::summary::SummaryTable;
use std::io::Write;
use std::path::Path;

const FIXED_COLUMNS: [&str; 3] = ["data_point", "name", "status"];

/// Writes a summary table as CSV.
///
/// The header row holds the identifying columns, then the variable names in positional
/// order, then the objective names. Unevaluated objectives are written as empty fields.
///
/// # Errors
///
/// Returns an error if writing to the underlying writer fails.
pub fn write_summary<W: Write>(table: &SummaryTable, writer: W) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let header = FIXED_COLUMNS
        .iter()
        .map(|s| s.to_string())
        .chain(table.variable_names.iter().cloned())
        .chain(table.objective_names.iter().cloned());
    csv_writer.write_record(header)?;

    for row in &table.rows {
        let record = [
            row.data_point.to_string(),
            row.name.clone(),
            row.status.to_string(),
        ]
        .into_iter()
        .chain(row.variable_values.iter().cloned())
        .chain(
            row.objective_values
                .iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
        );
        csv_writer.write_record(record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_summary_to_path(table: &SummaryTable, path: &Path) -> Result<(), csv::Error> {
    let file = std::fs::File::create(path)?;
    write_summary(table, std::io::BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::analysis::Analysis;
    use crate::core::models::function::LinearFunction;
    use crate::core::models::problem::Problem;
    use crate::core::models::variable::{Perturbation, Variable, VariableValue};
    use crate::core::models::workflow::FileReference;

    fn analysis() -> Analysis {
        let walls = Variable::discrete(
            "walls",
            vec![Perturbation::null("Baseline"), Perturbation::ruleset("R-19", "r19.xml")],
        );
        let problem = Problem::new("Envelope", vec![walls.into()]).with_objectives(vec![
            LinearFunction::new("Cost").with_attribute(1.0, "cost"),
            LinearFunction::new("Energy").with_attribute(1.0, "energy"),
        ]);
        let mut analysis = Analysis::new("Study", problem, FileReference::new("seed.osm")).unwrap();
        let done = analysis
            .create_data_point(vec![VariableValue::Discrete(1)])
            .unwrap();
        analysis
            .create_data_point(vec![VariableValue::Discrete(0)])
            .unwrap();
        let dp = analysis.data_point_mut(done).unwrap();
        dp.set_objective_values(vec![12.5, 3.0]);
        dp.mark_complete();
        analysis
    }

    #[test]
    fn columns_follow_variables_then_objectives() {
        let mut buffer = Vec::new();
        write_summary(&analysis().summary_table(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "data_point,name,status,walls,Cost,Energy");
        assert!(lines[1].ends_with(",succeeded,R-19,12.5,3"));
        assert!(lines[2].ends_with(",pending,Baseline,,"));
    }

    #[test]
    fn table_is_written_to_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        write_summary_to_path(&analysis().summary_table(), &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.records().count(), 2);
    }
}
