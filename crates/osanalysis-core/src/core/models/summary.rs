use super::analysis::Analysis;
use super::data_point::DataPoint;
use std::fmt;
use uuid::Uuid;

/// Coarse evaluation state of a DataPoint as shown in summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn of(data_point: &DataPoint) -> Self {
        if data_point.is_failed() {
            RunStatus::Failed
        } else if data_point.is_complete() {
            RunStatus::Succeeded
        } else if data_point.is_in_flight() {
            RunStatus::InFlight
        } else {
            RunStatus::Pending
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Pending => "pending",
            RunStatus::InFlight => "in-flight",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub data_point: Uuid,
    pub name: String,
    pub status: RunStatus,
    /// One label per problem variable, in variable order.
    pub variable_values: Vec<String>,
    /// One entry per objective function; `None` until the point has been evaluated.
    pub objective_values: Vec<Option<f64>>,
}

/// Tabulation of every DataPoint of an analysis.
///
/// Columns are the problem's variables in positional order followed by its objectives in
/// order. Rows follow the order in which DataPoints were added.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    pub variable_names: Vec<String>,
    pub objective_names: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn from_analysis(analysis: &Analysis) -> Self {
        let problem = analysis.problem();
        let variable_names = problem
            .variables()
            .map(|v| v.display_name().to_string())
            .collect();
        let objective_names: Vec<String> = problem
            .objectives()
            .iter()
            .map(|f| f.display_name().to_string())
            .collect();

        let rows = analysis
            .data_points()
            .map(|dp| {
                let variable_values = problem
                    .variables()
                    .zip(dp.variable_values())
                    .map(|(variable, value)| variable.value_label(value))
                    .collect();
                let objective_values = (0..objective_names.len())
                    .map(|i| dp.objective_values().get(i).copied())
                    .collect();
                SummaryRow {
                    data_point: dp.uuid(),
                    name: dp.name().to_string(),
                    status: RunStatus::of(dp),
                    variable_values,
                    objective_values,
                }
            })
            .collect();

        Self {
            variable_names,
            objective_names,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
