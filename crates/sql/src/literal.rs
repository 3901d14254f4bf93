//! The only place runtime filter values are turned into SQL text.

use quarry_common::config::ValueBinding;
use serde_json::Value;

/// Text form of a filter value: strings as-is, `null` as the empty string,
/// everything else as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Single-quoted SQL string literal with embedded quotes doubled.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Collects bound values while a statement is assembled.
#[derive(Debug)]
pub struct Binder {
    mode: ValueBinding,
    params: Vec<String>,
}

impl Binder {
    pub fn new(mode: ValueBinding) -> Self {
        Self {
            mode,
            params: Vec::new(),
        }
    }

    /// Returns the SQL fragment standing for `text`: a quoted literal or the
    /// next `$n` placeholder.
    pub fn bind_text(&mut self, text: String) -> String {
        match self.mode {
            ValueBinding::Inline => quote(&text),
            ValueBinding::Parameterized => {
                self.params.push(text);
                format!("${}", self.params.len())
            }
        }
    }

    pub fn bind(&mut self, value: &Value) -> String {
        self.bind_text(render_value(value))
    }

    pub fn into_params(self) -> Vec<String> {
        self.params
    }
}
