//! JSON scenario runner
//!
//! A scenario file drives named nodes through an ordered list of steps
//! against a fresh aggregate and compares each step's observable state with
//! the expected values it lists.
//!
//! ```json
//! {
//!   "id": "boundary-visible",
//!   "steps": [
//!     { "op": "raise", "node": "a", "kind": 5 },
//!     { "op": "query", "node": "b", "expected": { "emergency": true } },
//!     { "op": "raise", "node": "a", "kind": 64, "expected": { "return": "OutOfRange" } }
//!   ],
//!   "expected": { "counter": 1, "boundary": true }
//! }
//! ```

use emk::{
    Aggregate, AggregateConfig, AlarmOutput, CountingOutput, EmergencyKind, EmergencyNode,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors from scenario loading and execution
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("step {index}: unknown op '{op}'")]
    UnknownOp { index: usize, op: String },

    #[error("step {index}: '{op}' requires field '{field}'")]
    MissingField {
        index: usize,
        op: String,
        field: &'static str,
    },
}

// ============================================================================
// Scenario Structures
// ============================================================================

/// Scenario file contents
#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: AggregateConfig,
    pub steps: Vec<Step>,
    /// Expected aggregate state after the last step
    #[serde(default)]
    pub expected: Option<Value>,
}

/// One operation
#[derive(Debug, Deserialize)]
pub struct Step {
    pub op: String,
    #[serde(default)]
    pub node: Option<String>,
    /// Kept wide and signed so out-of-range kinds can be expressed
    #[serde(default)]
    pub kind: Option<i64>,
    #[serde(default)]
    pub expected: Option<Value>,
}

/// Scenario outcome
#[derive(Debug, Serialize)]
pub struct ScenarioResult {
    pub id: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
}

impl ScenarioResult {
    fn failed(id: String, error: String, actual: Option<Value>) -> Self {
        Self {
            id,
            passed: false,
            error: Some(error),
            actual,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Parse a scenario file
pub fn load(path: &Path) -> Result<Scenario, ScenarioError> {
    let content = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ScenarioError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and run a scenario file, reporting load failures as a failed result
pub fn run_file(path: &Path) -> ScenarioResult {
    match load(path) {
        Ok(scenario) => run(&scenario),
        Err(e) => ScenarioResult::failed(
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string(),
            e.to_string(),
            None,
        ),
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Run a scenario against a fresh aggregate
pub fn run(scenario: &Scenario) -> ScenarioResult {
    debug!(
        id = %scenario.id,
        description = %scenario.description,
        steps = scenario.steps.len(),
        "running scenario"
    );

    let aggregate = Aggregate::with_config(scenario.config, CountingOutput::new());
    // Fresh instance, cannot already be initialized
    let _ = aggregate.initialize();
    let mut nodes: BTreeMap<String, EmergencyNode<'_, CountingOutput>> = BTreeMap::new();

    for (index, step) in scenario.steps.iter().enumerate() {
        let actual = match execute(index, step, &aggregate, &mut nodes) {
            Ok(actual) => actual,
            Err(e) => return ScenarioResult::failed(scenario.id.clone(), e.to_string(), None),
        };

        if let Some(expected) = &step.expected {
            if !compare_results(expected, &actual) {
                return ScenarioResult::failed(
                    scenario.id.clone(),
                    format!("step {}: '{}' expected {}", index, step.op, expected),
                    Some(actual),
                );
            }
        }
    }

    let actual = aggregate_state(&aggregate);
    let passed = scenario
        .expected
        .as_ref()
        .map_or(true, |expected| compare_results(expected, &actual));

    ScenarioResult {
        id: scenario.id.clone(),
        passed,
        error: (!passed).then(|| "final aggregate state mismatch".to_string()),
        actual: Some(actual),
    }
}

fn execute<'a>(
    index: usize,
    step: &Step,
    aggregate: &'a Aggregate<CountingOutput>,
    nodes: &mut BTreeMap<String, EmergencyNode<'a, CountingOutput>>,
) -> Result<Value, ScenarioError> {
    if step.op == "aggregate" {
        return Ok(aggregate_state(aggregate));
    }

    let name = step.node.clone().ok_or_else(|| ScenarioError::MissingField {
        index,
        op: step.op.clone(),
        field: "node",
    })?;
    let node = nodes
        .entry(name)
        .or_insert_with(|| EmergencyNode::new(aggregate));

    let outcome = match step.op.as_str() {
        "init" => {
            node.init();
            Ok(())
        }
        "raise" | "solve" => {
            let kind = step.kind.ok_or_else(|| ScenarioError::MissingField {
                index,
                op: step.op.clone(),
                field: "kind",
            })?;
            // Anything outside 0..=255 still has to report OutOfRange
            let kind = EmergencyKind::try_from(kind).unwrap_or(EmergencyKind::MAX);
            if step.op == "raise" {
                node.raise(kind)
            } else {
                node.solve(kind)
            }
        }
        "destroy" => {
            node.destroy();
            Ok(())
        }
        "query" => Ok(()),
        other => {
            return Err(ScenarioError::UnknownOp {
                index,
                op: other.to_string(),
            })
        }
    };

    Ok(json!({
        "return": return_code(outcome),
        "active_count": node.active_count(),
        "bitmap": node.bitmap(),
        "emergency": node.is_emergency_active(),
        "counter": aggregate.read_counter(),
        "boundary": aggregate.is_boundary_active(),
    }))
}

fn aggregate_state(aggregate: &Aggregate<CountingOutput>) -> Value {
    let snapshot = aggregate.snapshot();
    let output = aggregate.output();
    json!({
        "counter": snapshot.entities_in_emergency,
        "boundary": snapshot.boundary_active,
        "line": output.is_driven(),
        "rising_edges": output.rising_edges(),
        "falling_edges": output.falling_edges(),
    })
}

fn return_code(outcome: emk::Result<()>) -> &'static str {
    match outcome {
        Ok(()) => "OK",
        Err(emk::Error::OutOfRange { .. }) => "OutOfRange",
        Err(emk::Error::AlreadyInitialized) => "AlreadyInitialized",
        Err(emk::Error::LogicViolation) => "LogicViolation",
    }
}

// ============================================================================
// Result Comparison
// ============================================================================

fn compare_results(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(exp_map), Value::Object(act_map)) => exp_map.iter().all(|(key, exp_val)| {
            act_map
                .get(key)
                .is_some_and(|act_val| compare_results(exp_val, act_val))
        }),
        (Value::Array(exp), Value::Array(act)) => {
            exp.len() == act.len() && exp.iter().zip(act).all(|(e, a)| compare_results(e, a))
        }
        _ => expected == actual,
    }
}
