/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::fmt;

use crate::KResult;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestOutcome {
    pub name: String,
    pub status: TestStatus,
}

/// Runs the sub-tests of one tool and keeps their outcomes.
///
/// A skipped sub-test counts as passed, it means the feature under test is
/// absent rather than broken.
#[derive(Debug)]
pub struct TestSuite {
    name: String,
    outcomes: Vec<TestOutcome>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::info!("=== {name} ===");
        Self {
            name,
            outcomes: Vec::new(),
        }
    }

    /// Runs `test`, a failure is recorded and doesn't stop the suite.
    pub fn run(&mut self, name: &str, test: impl FnOnce() -> KResult<()>) -> bool {
        tracing::info!("running {name}");

        let status = match test() {
            Ok(()) => {
                tracing::info!("[SUCCESS] {name}");
                TestStatus::Passed
            }
            Err(error) => {
                tracing::error!("[ERROR] {name}: {error} ({})", error.kind());
                if let Some(hint) = error.hint() {
                    tracing::error!("[ERROR] {hint}");
                }
                TestStatus::Failed {
                    error: error.to_string(),
                }
            }
        };

        let passed = status == TestStatus::Passed;
        self.outcomes.push(TestOutcome {
            name: name.to_string(),
            status,
        });
        passed
    }

    pub fn skip(&mut self, name: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!("[SKIPPED] {name}: {reason}");
        self.outcomes.push(TestOutcome {
            name: name.to_string(),
            status: TestStatus::Skipped { reason },
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn passed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| !matches!(outcome.status, TestStatus::Failed { .. }))
            .count()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "[SUCCESS]"),
            TestStatus::Skipped { reason } => write!(f, "[SKIPPED] {reason}"),
            TestStatus::Failed { error } => write!(f, "[ERROR] {error}"),
        }
    }
}

impl fmt::Display for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.name)?;
        for outcome in &self.outcomes {
            writeln!(f, "{:<40} {}", outcome.name, outcome.status)?;
        }
        write!(f, "{}/{} tests passed", self.passed(), self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KnobError;

    #[test]
    fn summary_counts_failures_only() {
        let mut suite = TestSuite::new("sample");
        assert!(suite.run("first", || Ok(())));
        assert!(!suite.run("second", || Err(KnobError::invalid_param("clos", "16 >= 16"))));
        suite.skip("third", "cqm is absent");

        assert_eq!(suite.total(), 3);
        assert_eq!(suite.passed(), 2);
        assert!(!suite.all_passed());
        assert_eq!(suite.exit_code(), 1);
        assert!(suite.to_string().ends_with("2/3 tests passed"));
    }

    #[test]
    fn empty_and_green_suites_exit_zero() {
        let suite = TestSuite::new("empty");
        assert_eq!(suite.exit_code(), 0);

        let mut suite = TestSuite::new("green");
        suite.run("only", || Ok(()));
        assert_eq!(suite.exit_code(), 0);
        assert!(suite.to_string().ends_with("1/1 tests passed"));
    }
}
