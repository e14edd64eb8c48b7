//! Rendering of the diagnostics that stop a run

use std::fmt;

use tfunk_parser::Diagnostics;

/// Parse and evaluation diagnostics of one run, in that order
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    pub parse: Diagnostics,
    pub eval: Diagnostics,
}

impl DiagnosticReport {
    pub fn parse(parse: Diagnostics) -> Self {
        Self {
            parse,
            eval: Diagnostics::new(),
        }
    }

    pub fn eval(eval: Diagnostics) -> Self {
        Self {
            parse: Diagnostics::new(),
            eval,
        }
    }

    fn len(&self) -> usize {
        self.parse.len() + self.eval.len()
    }

    /// A count line followed by one line per diagnostic
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("wrong number of diagnostics {}; want 0", self.len())];
        lines.extend(self.parse.iter().map(|d| format!("ParseDiag - {}", d)));
        lines.extend(self.eval.iter().map(|d| format!("ValDiag - {}", d)));
        lines
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}
