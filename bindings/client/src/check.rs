use serde_json::Value;
use stampede_instruments::CheckOutcome;

const SNIPPET_CHARS: usize = 200;

/// A received response, with the body read and parsed if it is JSON.
#[derive(Debug, Clone)]
pub struct StepResponse {
    status: u16,
    body: String,
    json: Option<Value>,
}

impl StepResponse {
    pub fn new(status: u16, body: String) -> Self {
        let json = serde_json::from_str(&body).ok();
        Self { status, body, json }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Look up a value in the JSON body by JSON pointer, for example `/data/team_id`.
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.json.as_ref()?.pointer(pointer)
    }

    /// The start of the body, for logs.
    pub fn snippet(&self) -> String {
        self.body.chars().take(SNIPPET_CHARS).collect()
    }
}

#[derive(Debug, Clone)]
enum Rule {
    Status(u16),
    IsTrue(&'static str),
    AnyPresent(Vec<&'static str>),
    IsArray(&'static str),
}

/// Named structural checks that a step's response must pass to be usable.
#[derive(Debug, Clone, Default)]
pub struct Checks {
    rules: Vec<(String, Rule)>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, name: impl Into<String>, expected: u16) -> Self {
        self.rules.push((name.into(), Rule::Status(expected)));
        self
    }

    /// The value at `pointer` is the JSON literal `true`.
    pub fn is_true(mut self, name: impl Into<String>, pointer: &'static str) -> Self {
        self.rules.push((name.into(), Rule::IsTrue(pointer)));
        self
    }

    /// At least one of the pointers resolves to a non-null value.
    pub fn any_present(mut self, name: impl Into<String>, pointers: &[&'static str]) -> Self {
        self.rules
            .push((name.into(), Rule::AnyPresent(pointers.to_vec())));
        self
    }

    pub fn is_array(mut self, name: impl Into<String>, pointer: &'static str) -> Self {
        self.rules.push((name.into(), Rule::IsArray(pointer)));
        self
    }

    pub fn evaluate(&self, response: &StepResponse) -> Vec<CheckOutcome> {
        self.rules
            .iter()
            .map(|(name, rule)| {
                let passed = match rule {
                    Rule::Status(expected) => response.status() == *expected,
                    Rule::IsTrue(pointer) => response.pointer(pointer) == Some(&Value::Bool(true)),
                    Rule::AnyPresent(pointers) => pointers
                        .iter()
                        .any(|p| response.pointer(p).is_some_and(|v| !v.is_null())),
                    Rule::IsArray(pointer) => response.pointer(pointer).is_some_and(Value::is_array),
                };
                CheckOutcome::new(name.as_str(), passed)
            })
            .collect()
    }
}
