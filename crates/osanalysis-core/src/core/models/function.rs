use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named scalar reported by a finished simulation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: f64,
}

impl Attribute {
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

/// The quantity a function term reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ValueSource {
    /// The value of an input variable, looked up by UUID and resolved to its position
    /// in the problem. Discrete values contribute their perturbation index.
    Input { variable: Uuid },
    /// A named output attribute reported by the simulation job.
    Attribute { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTerm {
    pub coefficient: f64,
    pub source: ValueSource,
}

/// A weighted sum over input values and output attributes.
///
/// Linear functions serve both as responses (values recorded for every DataPoint) and as
/// objectives (values minimized by optimization algorithms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFunction {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub terms: Vec<FunctionTerm>,
}

impl LinearFunction {
    pub fn new(name: &str) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            display_name: None,
            terms: Vec::new(),
        }
    }

    /// Adds a term reading the value of an input variable.
    pub fn with_input(mut self, coefficient: f64, variable: Uuid) -> Self {
        self.terms.push(FunctionTerm {
            coefficient,
            source: ValueSource::Input { variable },
        });
        self
    }

    /// Adds a term reading a named output attribute.
    pub fn with_attribute(mut self, coefficient: f64, name: &str) -> Self {
        self.terms.push(FunctionTerm {
            coefficient,
            source: ValueSource::Attribute {
                name: name.to_string(),
            },
        });
        self
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Evaluates the function given a resolver for each term's source.
    ///
    /// # Arguments
    ///
    /// * `resolve` - Maps a [`ValueSource`] to its value, or to the error that prevents it.
    ///
    /// # Return
    ///
    /// Returns `sum(coefficient_i * value_i)` over all terms.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by the resolver.
    pub fn evaluate<E>(
        &self,
        mut resolve: impl FnMut(&ValueSource) -> Result<f64, E>,
    ) -> Result<f64, E> {
        self.terms.iter().try_fold(0.0, |sum, term| {
            Ok(sum + term.coefficient * resolve(&term.source)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_sums_weighted_terms() {
        let variable = Uuid::new_v4();
        let function = LinearFunction::new("Cost")
            .with_attribute(1.0, "baseline")
            .with_input(-3.0, variable);

        let value: Result<f64, ()> = function.evaluate(|source| match source {
            ValueSource::Attribute { .. } => Ok(20.0),
            ValueSource::Input { .. } => Ok(1.0),
        });
        assert_eq!(value, Ok(17.0));
    }

    #[test]
    fn evaluate_propagates_resolver_errors() {
        let function = LinearFunction::new("Energy").with_attribute(2.0, "missing");
        let value: Result<f64, &str> = function.evaluate(|_| Err("no such attribute"));
        assert_eq!(value, Err("no such attribute"));
    }

    #[test]
    fn empty_function_evaluates_to_zero() {
        let value: Result<f64, ()> = LinearFunction::new("Zero").evaluate(|_| Ok(5.0));
        assert_eq!(value, Ok(0.0));
    }
}
