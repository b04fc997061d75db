// Scenario table and the helper prelude injected ahead of every payload

use verdict_probe_common::types::{ExpectedStatuses, Scenario, Verdict};

/// Helpers available to every Go payload: one allocates and touches memory,
/// the other spins without yielding so CPU time is actually consumed.
pub const GO_HELPERS: &str = r#"
var memoryHolder []byte

func EatMemory(nMB int) {
	memoryHolder = make([]byte, nMB*1024*1024)
	for i := range memoryHolder {
		memoryHolder[i] = 1
	}
}

func ActiveSleep(ms int) {
	start := time.Now()
	target := time.Duration(ms) * time.Millisecond
	for time.Since(start) < target {
	}
}
"#;

/// Source prepended to each scenario body at submission time.
#[derive(Debug, Clone, Copy)]
pub struct Prelude {
    language: &'static str,
    helpers: &'static str,
}

impl Prelude {
    pub fn for_language(language: &str) -> Option<Self> {
        match language {
            "go" => Some(Self {
                language: "go",
                helpers: GO_HELPERS,
            }),
            _ => None,
        }
    }

    pub fn language(&self) -> &'static str {
        self.language
    }

    pub fn assemble(&self, body: &str) -> String {
        format!("{}\n{}", self.helpers, body)
    }
}

/// The verdict table, in the order results are printed.
pub fn default_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new(
            "Positive (AC)",
            "func Sum(a, b int) int { return a + b }",
            ExpectedStatuses::one(Verdict::Accepted),
        ),
        Scenario::new(
            "Wrong Answer (WA)",
            "func Sum(a, b int) int { return a + b + 1 }",
            ExpectedStatuses::one(Verdict::WrongAnswer),
        ),
        Scenario::new(
            "Compilation Err (CE)",
            "func Sum(a, b int) int { return a + }",
            ExpectedStatuses::one(Verdict::CompileError),
        ),
        Scenario::new(
            "Runtime Err (RE)",
            r#"func Sum(a, b int) int { panic("panic"); return a + b }"#,
            ExpectedStatuses::one(Verdict::RuntimeError),
        ),
        Scenario::new(
            "Memory Limit (MLE)",
            "func Sum(a, b int) int { EatMemory(100); return a+b }",
            ExpectedStatuses::one(Verdict::MemoryLimitExceeded),
        ),
        // a hard kill on the time limit may surface as either
        Scenario::new(
            "Time Limit (TO)",
            "func Sum(a, b int) int { ActiveSleep(3000); return a+b }",
            ExpectedStatuses::any_of([Verdict::TimeLimitExceeded, Verdict::RuntimeError]),
        ),
    ]
}

/// Keep scenarios whose name contains any filter, ignoring case. No filters
/// keeps everything. Declaration order is preserved.
pub fn select(scenarios: Vec<Scenario>, filters: &[String]) -> Vec<Scenario> {
    if filters.is_empty() {
        return scenarios;
    }
    let filters: Vec<String> = filters.iter().map(|f| f.to_lowercase()).collect();
    scenarios
        .into_iter()
        .filter(|s| {
            let name = s.name.to_lowercase();
            filters.iter().any(|f| name.contains(f.as_str()))
        })
        .collect()
}
