use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use osanalysis::core::models::algorithm::{Algorithm, DesignOfExperimentsOptions, SamplingMethod};
use osanalysis::core::models::analysis::Analysis;
use osanalysis::core::models::function::LinearFunction;
use osanalysis::core::models::problem::Problem;
use osanalysis::core::models::variable::{ContinuousVariable, MeasureBinding, Perturbation, Variable};
use osanalysis::core::models::workflow::{FileReference, JobType, WorkItem, WorkflowStep};
use osanalysis::engine::backend::CommandRunner;
use osanalysis::engine::config::{
    self as core_config, JobCleanUpBehavior, RunOptions, RunOptionsBuilder,
};
use osanalysis::engine::error::EngineError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", tag = "type")]
enum PartialPerturbation {
    Null {
        name: String,
        selected: Option<bool>,
    },
    Ruleset {
        name: String,
        file: PathBuf,
        selected: Option<bool>,
    },
    Ruby {
        name: String,
        script: PathBuf,
        #[serde(default)]
        arguments: BTreeMap<String, String>,
        selected: Option<bool>,
    },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", rename_all_fields = "kebab-case", tag = "type")]
enum PartialWorkflowStep {
    Discrete {
        name: String,
        display_name: Option<String>,
        perturbations: Vec<PartialPerturbation>,
    },
    Continuous {
        name: String,
        display_name: Option<String>,
        minimum: Option<f64>,
        maximum: Option<f64>,
        increment: Option<f64>,
        n_steps: Option<usize>,
        script: Option<PathBuf>,
        argument: Option<String>,
    },
    WorkItem {
        job: String,
        file: Option<PathBuf>,
        #[serde(default)]
        arguments: BTreeMap<String, String>,
    },
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialTerm {
    coefficient: Option<f64>,
    attribute: Option<String>,
    variable: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialFunction {
    name: String,
    #[serde(rename = "display-name")]
    display_name: Option<String>,
    #[serde(default)]
    terms: Vec<PartialTerm>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", rename_all_fields = "kebab-case", tag = "type")]
enum PartialAlgorithm {
    SequentialSearch {
        objective_to_minimize_first: Option<usize>,
    },
    DesignOfExperiments,
    Sampling {
        method: Option<SamplingMethod>,
        num_samples: Option<usize>,
        seed: Option<u64>,
        cvt_iterations: Option<usize>,
    },
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialRunnerConfig {
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialRunConfig {
    #[serde(rename = "queue-size")]
    queue_size: Option<usize>,
    #[serde(rename = "max-iterations")]
    max_iterations: Option<usize>,
    #[serde(rename = "clean-up")]
    clean_up: Option<JobCleanUpBehavior>,
}

/// An analysis definition as read from TOML, before CLI overrides and defaults.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialAnalysisConfig {
    name: Option<String>,
    #[serde(rename = "display-name")]
    display_name: Option<String>,
    seed: Option<PathBuf>,
    #[serde(rename = "weather-file")]
    weather_file: Option<PathBuf>,
    #[serde(default)]
    workflow: Vec<PartialWorkflowStep>,
    #[serde(default)]
    objectives: Vec<PartialFunction>,
    #[serde(default)]
    responses: Vec<PartialFunction>,
    algorithm: Option<PartialAlgorithm>,
    runner: Option<PartialRunnerConfig>,
    run: Option<PartialRunConfig>,
    /// Relative paths in the definition are resolved against this directory.
    #[serde(skip)]
    base_dir: PathBuf,
}

/// Everything the `run` command needs, merged from the definition file and the command line.
pub struct RunSetup {
    pub analysis: Analysis,
    pub runner: CommandRunner,
    pub options: RunOptions,
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn job_type(name: &str) -> JobType {
    match name {
        "model-ruleset" => JobType::ModelRuleset,
        "user-script" => JobType::UserScript,
        "model-to-idf" => JobType::ModelToIdf,
        "expand-objects" => JobType::ExpandObjects,
        "energy-plus" => JobType::EnergyPlus,
        other => JobType::Custom(other.to_string()),
    }
}

impl PartialAnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading analysis definition from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<RunSetup> {
        self.apply_set_values(&args.set_values)?;
        let analysis = self.build_analysis()?;
        let runner = self.runner()?;

        let run_config = self.run.take().unwrap_or_default();
        let mut builder = RunOptionsBuilder::new()
            .working_directory(args.output.clone())
            .clean_up(run_config.clean_up.unwrap_or_default())
            .force(args.force);
        if let Some(size) = args.queue_size.or(run_config.queue_size) {
            builder = builder.queue_size(size);
        }
        if let Some(iterations) = args.max_iterations.or(run_config.max_iterations) {
            builder = builder.max_iterations(iterations);
        }
        let options = builder.build().map_err(EngineError::from)?;

        Ok(RunSetup {
            analysis,
            runner,
            options,
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Builds the problem, the algorithm and the analysis around them.
    pub fn build_analysis(&self) -> Result<Analysis> {
        let seed = self
            .seed
            .as_ref()
            .ok_or_else(|| CliError::Config("`seed` is required.".to_string()))?;
        if self.workflow.is_empty() {
            return Err(CliError::Config(
                "At least one `[[workflow]]` step is required.".to_string(),
            ));
        }

        let steps = self
            .workflow
            .iter()
            .map(|step| self.build_step(step))
            .collect::<Result<Vec<WorkflowStep>>>()?;
        let variables: HashMap<&str, Uuid> = steps
            .iter()
            .filter_map(WorkflowStep::as_variable)
            .map(|v| (v.name.as_str(), v.uuid))
            .collect();
        let objectives = self
            .objectives
            .iter()
            .map(|f| build_function(f, &variables))
            .collect::<Result<Vec<_>>>()?;
        let responses = self
            .responses
            .iter()
            .map(|f| build_function(f, &variables))
            .collect::<Result<Vec<_>>>()?;

        let name = self.name.as_deref().unwrap_or("Analysis");
        let problem = Problem::new(name, steps)
            .with_objectives(objectives)
            .with_responses(responses);

        let mut analysis = Analysis::new(name, problem, FileReference::new(self.resolve(seed)))
            .map_err(EngineError::from)?;
        analysis.set_display_name(self.display_name.clone());
        if let Some(weather_file) = &self.weather_file {
            analysis
                .set_weather_file(Some(FileReference::new(self.resolve(weather_file))))
                .map_err(EngineError::from)?;
        }
        if let Some(algorithm) = self.build_algorithm()? {
            analysis.set_algorithm(algorithm).map_err(EngineError::from)?;
        }
        Ok(analysis)
    }

    fn build_step(&self, step: &PartialWorkflowStep) -> Result<WorkflowStep> {
        let step: WorkflowStep = match step {
            PartialWorkflowStep::Discrete {
                name,
                display_name,
                perturbations,
            } => {
                if perturbations.is_empty() {
                    return Err(CliError::Config(format!(
                        "Discrete variable '{}' needs at least one perturbation.",
                        name
                    )));
                }
                let perturbations = perturbations
                    .iter()
                    .map(|p| match p {
                        PartialPerturbation::Null { name, selected } => {
                            Perturbation::null(name).with_selected(selected.unwrap_or(true))
                        }
                        PartialPerturbation::Ruleset {
                            name,
                            file,
                            selected,
                        } => Perturbation::ruleset(name, self.resolve(file))
                            .with_selected(selected.unwrap_or(true)),
                        PartialPerturbation::Ruby {
                            name,
                            script,
                            arguments,
                            selected,
                        } => Perturbation::ruby(name, self.resolve(script), arguments.clone())
                            .with_selected(selected.unwrap_or(true)),
                    })
                    .collect();
                let mut variable = Variable::discrete(name, perturbations);
                variable.display_name = display_name.clone();
                variable.into()
            }
            PartialWorkflowStep::Continuous {
                name,
                display_name,
                minimum,
                maximum,
                increment,
                n_steps,
                script,
                argument,
            } => {
                let measure = match (script, argument) {
                    (Some(script), Some(argument)) => Some(MeasureBinding {
                        script: self.resolve(script),
                        argument: argument.clone(),
                    }),
                    (None, None) => None,
                    _ => {
                        return Err(CliError::Config(format!(
                            "Continuous variable '{}' needs both `script` and `argument`, or neither.",
                            name
                        )));
                    }
                };
                let mut variable = Variable::continuous(
                    name,
                    ContinuousVariable {
                        minimum: *minimum,
                        maximum: *maximum,
                        increment: *increment,
                        n_steps: *n_steps,
                        measure,
                    },
                );
                variable.display_name = display_name.clone();
                variable.into()
            }
            PartialWorkflowStep::WorkItem {
                job,
                file,
                arguments,
            } => {
                let mut item = WorkItem::new(job_type(job));
                if let Some(file) = file {
                    item = item.with_file(self.resolve(file));
                }
                for (name, value) in arguments {
                    item = item.with_argument(name, value);
                }
                item.into()
            }
        };
        Ok(step)
    }

    fn build_algorithm(&self) -> Result<Option<Algorithm>> {
        let Some(partial) = &self.algorithm else {
            return Ok(None);
        };
        let algorithm = match partial {
            PartialAlgorithm::SequentialSearch {
                objective_to_minimize_first,
            } => {
                let mut builder = core_config::SequentialSearchConfigBuilder::new();
                if let Some(index) = objective_to_minimize_first {
                    builder = builder.objective_to_minimize_first(*index);
                }
                Algorithm::sequential_search(builder.build().map_err(EngineError::from)?)
            }
            PartialAlgorithm::DesignOfExperiments => {
                Algorithm::design_of_experiments(DesignOfExperimentsOptions::default())
            }
            PartialAlgorithm::Sampling {
                method,
                num_samples,
                seed,
                cvt_iterations,
            } => {
                let mut builder = core_config::SamplingConfigBuilder::new();
                if let Some(method) = method {
                    builder = builder.method(*method);
                }
                if let Some(n) = num_samples {
                    builder = builder.num_samples(*n);
                }
                if let Some(seed) = seed {
                    builder = builder.seed(*seed);
                }
                if let Some(iterations) = cvt_iterations {
                    builder = builder.cvt_iterations(*iterations);
                }
                Algorithm::sampling(builder.build().map_err(EngineError::from)?)
            }
        };
        Ok(Some(algorithm))
    }

    fn runner(&self) -> Result<CommandRunner> {
        let runner = self.runner.clone().unwrap_or_default();
        let command = runner.command.ok_or_else(|| {
            CliError::Config("`runner.command` is required to run an analysis.".to_string())
        })?;
        let program = if command.contains(['/', '\\']) {
            self.resolve(Path::new(&command))
        } else {
            PathBuf::from(command)
        };
        Ok(CommandRunner::new(program, runner.args))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "name" => self.name = Some(value_str.to_string()),
                "seed" => self.seed = Some(PathBuf::from(value_str)),
                "weather-file" => self.weather_file = Some(PathBuf::from(value_str)),
                "runner.command" => {
                    self.runner.get_or_insert_with(Default::default).command =
                        Some(value_str.to_string());
                }
                "run.queue-size" => {
                    self.run.get_or_insert_with(Default::default).queue_size =
                        Some(parse_value(key, value_str)?);
                }
                "run.max-iterations" => {
                    self.run.get_or_insert_with(Default::default).max_iterations =
                        Some(parse_value(key, value_str)?);
                }
                "run.clean-up" => {
                    let behavior = match value_str {
                        "none" => JobCleanUpBehavior::None,
                        "standard" => JobCleanUpBehavior::Standard,
                        "aggressive" => JobCleanUpBehavior::Aggressive,
                        _ => {
                            return Err(CliError::Config(format!(
                                "Invalid value for {}: {} (expected none, standard or aggressive)",
                                key, value_str
                            )));
                        }
                    };
                    self.run.get_or_insert_with(Default::default).clean_up = Some(behavior);
                }
                "algorithm.objective-to-minimize-first" => match &mut self.algorithm {
                    Some(PartialAlgorithm::SequentialSearch {
                        objective_to_minimize_first,
                    }) => *objective_to_minimize_first = Some(parse_value(key, value_str)?),
                    _ => return Err(wrong_algorithm(key, "sequential-search")),
                },
                "algorithm.num-samples" => match &mut self.algorithm {
                    Some(PartialAlgorithm::Sampling { num_samples, .. }) => {
                        *num_samples = Some(parse_value(key, value_str)?)
                    }
                    _ => return Err(wrong_algorithm(key, "sampling")),
                },
                "algorithm.seed" => match &mut self.algorithm {
                    Some(PartialAlgorithm::Sampling { seed, .. }) => {
                        *seed = Some(parse_value(key, value_str)?)
                    }
                    _ => return Err(wrong_algorithm(key, "sampling")),
                },
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn wrong_algorithm(key: &str, expected: &str) -> CliError {
    CliError::Config(format!(
        "'{}' only applies to an algorithm of type '{}'",
        key, expected
    ))
}

fn build_function(partial: &PartialFunction, variables: &HashMap<&str, Uuid>) -> Result<LinearFunction> {
    let mut function = LinearFunction::new(&partial.name);
    function.display_name = partial.display_name.clone();
    for term in &partial.terms {
        let coefficient = term.coefficient.unwrap_or(1.0);
        function = match (&term.attribute, &term.variable) {
            (Some(attribute), None) => function.with_attribute(coefficient, attribute),
            (None, Some(variable)) => {
                let uuid = variables.get(variable.as_str()).ok_or_else(|| {
                    CliError::Config(format!(
                        "Function '{}' refers to unknown variable '{}'.",
                        partial.name, variable
                    ))
                })?;
                function.with_input(coefficient, *uuid)
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Each term of function '{}' needs exactly one of `attribute` or `variable`.",
                    partial.name
                )));
            }
        };
    }
    Ok(function)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use once_cell::sync::Lazy;
    use osanalysis::core::models::algorithm::AlgorithmKind;
    use osanalysis::core::models::workflow::FileReferenceType;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    const SEQUENTIAL_SEARCH: &str = r#"
name = "Office retrofit"
seed = "seed/office.osm"
weather-file = "weather/golden.epw"

[runner]
command = "./simulate.sh"
args = ["--fast"]

[run]
queue-size = 4
clean-up = "standard"

[algorithm]
type = "sequential-search"
objective-to-minimize-first = 1

[[workflow]]
type = "discrete"
name = "Wall insulation"

[[workflow.perturbations]]
type = "null"
name = "Existing"

[[workflow.perturbations]]
type = "ruleset"
name = "R-19"
file = "rules/r19.xml"

[[workflow.perturbations]]
type = "ruby"
name = "R-30"
script = "measures/insulation.rb"
arguments = { r-value = "30" }
selected = false

[[workflow]]
type = "continuous"
name = "Window to wall ratio"
minimum = 0.2
maximum = 0.6
increment = 0.1
script = "measures/wwr.rb"
argument = "wwr"

[[workflow]]
type = "work-item"
job = "energy-plus"

[[objectives]]
name = "Site EUI"
terms = [{ attribute = "site-eui" }]

[[objectives]]
name = "Cost"
terms = [{ attribute = "capital-cost" }, { variable = "Window to wall ratio", coefficient = 1000.0 }]
"#;

    fn write_config_file(name: &str, content: &str) -> PathBuf {
        let file_path = TEST_DIR.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn run_args(config_path: &Path, extra: &[&str]) -> RunArgs {
        let mut args = vec![
            "osanalysis".to_string(),
            "run".to_string(),
            "-c".to_string(),
            config_path.to_str().unwrap().to_string(),
            "-o".to_string(),
            "out".to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(args).command {
            Commands::Run(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn full_definition_builds_the_analysis() {
        let path = write_config_file("full.toml", SEQUENTIAL_SEARCH);
        let setup = PartialAnalysisConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&run_args(&path, &[]))
            .unwrap();

        let analysis = &setup.analysis;
        assert_eq!(analysis.name(), "Office retrofit");
        assert_eq!(analysis.seed().path, TEST_DIR.path().join("seed/office.osm"));
        assert_eq!(
            analysis.weather_file().map(|w| w.file_type),
            Some(FileReferenceType::Epw)
        );

        let problem = analysis.problem();
        assert_eq!(problem.num_variables(), 2);
        assert_eq!(problem.workflow().len(), 3);
        assert_eq!(problem.objectives().len(), 2);
        let insulation = problem.variable(0).unwrap().as_discrete().unwrap();
        assert_eq!(insulation.num_perturbations(false), 3);
        assert_eq!(insulation.num_perturbations(true), 2);

        assert!(matches!(
            analysis.algorithm().unwrap().kind(),
            AlgorithmKind::SequentialSearch(options) if options.objective_to_minimize_first == 1
        ));
        assert_eq!(setup.runner.program(), TEST_DIR.path().join("simulate.sh"));
        assert_eq!(setup.runner.args(), ["--fast".to_string()]);
        assert_eq!(setup.options.queue_size, Some(4));
        assert_eq!(setup.options.clean_up, JobCleanUpBehavior::Standard);
        assert_eq!(setup.options.working_directory, PathBuf::from("out"));
    }

    #[test]
    fn cli_arguments_override_the_file() {
        let path = write_config_file("override.toml", SEQUENTIAL_SEARCH);
        let args = run_args(
            &path,
            &[
                "--queue-size",
                "2",
                "--force",
                "-S",
                "run.max-iterations=7",
                "-S",
                "algorithm.objective-to-minimize-first=0",
            ],
        );
        let setup = PartialAnalysisConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&args)
            .unwrap();

        assert_eq!(setup.options.queue_size, Some(2));
        assert_eq!(setup.options.max_iterations, Some(7));
        assert!(setup.options.force);
        assert!(matches!(
            setup.analysis.algorithm().unwrap().kind(),
            AlgorithmKind::SequentialSearch(options) if options.objective_to_minimize_first == 0
        ));
    }

    #[test]
    fn set_values_are_validated() {
        let path = write_config_file("set.toml", SEQUENTIAL_SEARCH);
        let mut config = PartialAnalysisConfig::from_file(&path).unwrap();

        assert!(config.apply_set_values(&["run.queue-size".to_string()]).is_err());
        assert!(config.apply_set_values(&["run.queue-size=many".to_string()]).is_err());
        assert!(config.apply_set_values(&["algorithm.num-samples=5".to_string()]).is_err());
        assert!(config.apply_set_values(&["unknown.key=1".to_string()]).is_err());
        assert!(config.apply_set_values(&["run.clean-up=aggressive".to_string()]).is_ok());
    }

    #[test]
    fn unknown_variable_in_objective_is_rejected() {
        let content = SEQUENTIAL_SEARCH.replace("\"Window to wall ratio\", coefficient", "\"Roof\", coefficient");
        let path = write_config_file("unknown_variable.toml", &content);
        let result = PartialAnalysisConfig::from_file(&path).unwrap().build_analysis();
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("Roof")));
    }

    #[test]
    fn incompatible_algorithm_is_rejected() {
        let content = SEQUENTIAL_SEARCH.replace("type = \"sequential-search\"\nobjective-to-minimize-first = 1", "type = \"design-of-experiments\"");
        let path = write_config_file("incompatible.toml", &content);
        let result = PartialAnalysisConfig::from_file(&path).unwrap().build_analysis();
        assert!(matches!(result, Err(CliError::Engine(_))));
    }

    #[test]
    fn sampling_definition_uses_builder_defaults() {
        let content = SEQUENTIAL_SEARCH.replace(
            "type = \"sequential-search\"\nobjective-to-minimize-first = 1",
            "type = \"sampling\"\nmethod = \"latin-hypercube\"\nnum-samples = 12",
        );
        let path = write_config_file("sampling.toml", &content);
        let mut config = PartialAnalysisConfig::from_file(&path).unwrap();
        config.apply_set_values(&["algorithm.seed=42".to_string()]).unwrap();
        let analysis = config.build_analysis().unwrap();

        match analysis.algorithm().unwrap().kind() {
            AlgorithmKind::Sampling(options) => {
                assert_eq!(options.method, SamplingMethod::LatinHypercube);
                assert_eq!(options.num_samples, 12);
                assert_eq!(options.seed, Some(42));
                assert_eq!(options.cvt_iterations, 50);
            }
            other => panic!("unexpected algorithm {:?}", other),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let path = write_config_file("typo.toml", "nmae = \"x\"\nseed = \"a.osm\"\n");
        assert!(matches!(
            PartialAnalysisConfig::from_file(&path),
            Err(CliError::FileParsing { .. })
        ));
    }

    #[test]
    fn missing_runner_command_is_a_config_error() {
        let content = SEQUENTIAL_SEARCH.replace("command = \"./simulate.sh\"\n", "");
        let path = write_config_file("no_runner.toml", &content);
        let result = PartialAnalysisConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&run_args(&path, &[]));
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
