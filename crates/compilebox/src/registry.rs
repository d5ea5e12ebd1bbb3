use std::collections::BTreeMap;

use sandbox::CompilerSpec;
use serde::Serialize;

use crate::error::{RunnerError, RunnerResult};

/// (id, toolchain, source file, run command, display name, extra args)
type Entry = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
);

const BUILTIN: &[Entry] = &[
    ("python", "python", "file.py", "", "Python", ""),
    ("ruby", "ruby", "file.rb", "", "Ruby", ""),
    ("clojure", "clojure", "file.clj", "", "Clojure", ""),
    ("php", "php", "file.php", "", "Php", ""),
    ("nodejs", "nodejs", "file.js", "", "Nodejs", ""),
    ("scala", "scala", "file.scala", "", "Scala", ""),
    ("go", "go run", "file.go", "", "Go", ""),
    (
        "cpp",
        "g++ -o /usercode/a.out",
        "file.cpp",
        "/usercode/a.out",
        "C/C++",
        "",
    ),
    (
        "c",
        "gcc -o /usercode/a.out",
        "file.c",
        "/usercode/a.out",
        "C",
        "",
    ),
    (
        "vbnet",
        "vbnc -nologo -quiet",
        "file.vb",
        "mono /usercode/file.exe",
        "VB.Net",
        "",
    ),
    (
        "csharp",
        "gmcs",
        "file.cs",
        "mono /usercode/file.exe",
        "C#",
        "",
    ),
    ("bash", "/bin/bash", "file.sh", "", "Bash", ""),
    (
        "objective-c",
        "gcc",
        "file.m",
        "/usercode/a.out",
        "Objective-C",
        "-o /usercode/a.out -I/usr/include/GNUstep -L/usr/lib/GNUstep -lobjc -lgnustep-base -Wall -fconstant-string-class=NSConstantString",
    ),
    ("perl", "perl", "file.pl", "", "Perl", ""),
    (
        "rust",
        "env HOME=/opt/rust /opt/rust/.cargo/bin/rustc",
        "file.rs",
        "/usercode/a.out",
        "Rust",
        "-o /usercode/a.out",
    ),
];

/// Language id to invocation parameters. Read-only once built.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    entries: BTreeMap<String, CompilerSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub id: String,
    pub name: String,
}

impl LanguageRegistry {
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|&(id, toolchain, source_file, run_command, name, extra)| {
                let spec = CompilerSpec {
                    toolchain: toolchain.to_string(),
                    source_file: source_file.to_string(),
                    run_command: run_command.to_string(),
                    display_name: name.to_string(),
                    extra_args: extra.to_string(),
                };
                (id.to_string(), spec)
            })
            .collect();
        Self { entries }
    }

    /// Built-in table with `overrides` merged on top. Every resulting entry
    /// is validated.
    pub fn with_overrides(overrides: BTreeMap<String, CompilerSpec>) -> RunnerResult<Self> {
        let mut registry = Self::builtin();
        registry.entries.extend(overrides);
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> RunnerResult<()> {
        for (id, spec) in &self.entries {
            if id.trim().is_empty() {
                return Err(RunnerError::Config("language id is empty".into()));
            }
            spec.validate()
                .map_err(|e| RunnerError::Config(format!("language {id}: {e}")))?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> RunnerResult<&CompilerSpec> {
        self.entries
            .get(id)
            .ok_or_else(|| RunnerError::UnknownLanguage(id.to_string()))
    }

    /// Ids and display names, sorted by id.
    pub fn list(&self) -> Vec<LanguageInfo> {
        self.entries
            .iter()
            .map(|(id, spec)| LanguageInfo {
                id: id.clone(),
                name: spec.display_name.clone(),
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CompilerSpec)> {
        self.entries.iter().map(|(id, spec)| (id.as_str(), spec))
    }
}
