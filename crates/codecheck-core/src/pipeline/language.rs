//! Extension-keyed syntax check table.

use serde::{Deserialize, Serialize};

use crate::ingest::extension_of;

/// Best-effort language check run by the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxCheck {
    /// `.js` / `.ts`: eslint
    Lint,

    /// `.py`: python -m py_compile
    CompileCheck,

    /// `.java`: javac
    Compile,

    /// Anything else: line count only.
    None,
}

impl SyntaxCheck {
    /// Pick the check for a submitted file name.
    pub fn for_file_name(file_name: &str) -> Self {
        match extension_of(file_name).as_deref() {
            Some("js") | Some("ts") => SyntaxCheck::Lint,
            Some("py") => SyntaxCheck::CompileCheck,
            Some("java") => SyntaxCheck::Compile,
            _ => SyntaxCheck::None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyntaxCheck::Lint => "lint",
            SyntaxCheck::CompileCheck => "compile_check",
            SyntaxCheck::Compile => "compile",
            SyntaxCheck::None => "none",
        }
    }

    /// Banner echoed before the tool runs.
    pub fn banner(&self) -> &'static str {
        match self {
            SyntaxCheck::Lint => "Running JavaScript/TypeScript checks...",
            SyntaxCheck::CompileCheck => "Running Python checks...",
            SyntaxCheck::Compile => "Running Java checks...",
            SyntaxCheck::None => "Basic file checks...",
        }
    }

    /// Tool invocation; the file is always referenced through `$CHECK_FILE`.
    /// Failures are swallowed so the job never fails on a finding.
    pub fn command(&self) -> Option<&'static str> {
        match self {
            SyntaxCheck::Lint => Some(r#"npx --yes eslint "$CHECK_FILE" || true"#),
            SyntaxCheck::CompileCheck => Some(r#"python -m py_compile "$CHECK_FILE" || true"#),
            SyntaxCheck::Compile => Some(r#"javac "$CHECK_FILE" || true"#),
            SyntaxCheck::None => None,
        }
    }

    /// Full shell script for the language check step.
    pub fn script(&self) -> String {
        let mut lines = vec![
            r#"echo "Checking file: $CHECK_FILE""#.to_string(),
            r#"echo "File size: $(wc -l < "$CHECK_FILE") lines""#.to_string(),
            format!("echo \"{}\"", self.banner()),
        ];
        if let Some(command) = self.command() {
            lines.push(command.to_string());
        }
        lines.join("\n") + "\n"
    }
}
