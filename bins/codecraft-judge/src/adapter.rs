/// Language Runtime Adapters
///
/// Each adapter knows which files a submission becomes, how to compile them
/// (if the language needs it) and how to run the result. Commands are relative
/// to the invocation's working directory so every engine can use them as is.
///
/// Adapters never execute anything themselves; the engine does.

use codecraft_common::types::Language;

/// A file written into the compile workspace before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub contents: String,
}

impl SourceFile {
    fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;
    fn file_extension(&self) -> &'static str;
    fn prepare_sources(&self, source: &str) -> Vec<SourceFile>;
    /// `None` for interpreted languages.
    fn compile_command(&self, source: &str) -> Option<Vec<String>>;
    fn run_command(&self, source: &str) -> Vec<String>;
}

pub fn adapter_for(language: Language) -> &'static dyn LanguageAdapter {
    match language {
        Language::Javascript => &JavascriptAdapter,
        Language::Python => &PythonAdapter,
        Language::Java => &JavaAdapter,
        Language::Cpp => &CppAdapter,
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

// Runs the submission as a function body with `input` and `require` in scope.
// A submission that defines `solution` gets it called with the input.
const JAVASCRIPT_HARNESS: &str = r#""use strict";
const fs = require("fs");
const path = require("path");

const input = fs.readFileSync(0, "utf8").replace(/\s+$/, "");
const source = fs.readFileSync(path.join(__dirname, "solution.js"), "utf8");
const definesSolution =
  /\bfunction\s+solution\s*\(|\b(?:const|let|var)\s+solution\s*=/.test(source);
const body = definesSolution ? source + "\n;return solution(input);" : source;

const emit = (value) => {
  if (value === undefined) return;
  const text = typeof value === "string" ? value : JSON.stringify(value);
  process.stdout.write(text + "\n");
};

Promise.resolve(new Function("input", "require", body)(input, require)).then(emit, (err) => {
  process.stderr.write(String(err && err.stack ? err.stack : err) + "\n");
  process.exitCode = 1;
});
"#;

const PYTHON_HARNESS: &str = r#"import importlib.util
import json
import sys

spec = importlib.util.spec_from_file_location("solution", "solution.py")
module = importlib.util.module_from_spec(spec)
spec.loader.exec_module(module)

result = module.solution(sys.stdin.read().rstrip("\n"))
if result is not None:
    print(result if isinstance(result, str) else json.dumps(result, default=str))
"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct JavascriptAdapter;

impl LanguageAdapter for JavascriptAdapter {
    fn language(&self) -> Language {
        Language::Javascript
    }

    fn file_extension(&self) -> &'static str {
        "js"
    }

    fn prepare_sources(&self, source: &str) -> Vec<SourceFile> {
        vec![
            SourceFile::new("solution.js", source),
            SourceFile::new("main.js", JAVASCRIPT_HARNESS),
        ]
    }

    fn compile_command(&self, _source: &str) -> Option<Vec<String>> {
        None
    }

    fn run_command(&self, _source: &str) -> Vec<String> {
        argv(&["node", "--stack-size=65500", "main.js"])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PythonAdapter;

fn defines_python_solution(source: &str) -> bool {
    source
        .lines()
        .any(|line| line.trim_start().starts_with("def solution("))
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn file_extension(&self) -> &'static str {
        "py"
    }

    fn prepare_sources(&self, source: &str) -> Vec<SourceFile> {
        if defines_python_solution(source) {
            vec![
                SourceFile::new("solution.py", source),
                SourceFile::new("main.py", PYTHON_HARNESS),
            ]
        } else {
            vec![SourceFile::new("main.py", source)]
        }
    }

    fn compile_command(&self, _source: &str) -> Option<Vec<String>> {
        None
    }

    fn run_command(&self, _source: &str) -> Vec<String> {
        argv(&["python3", "-B", "main.py"])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JavaAdapter;

/// Class generated next to a template-style submission; never a valid user
/// class name in practice.
const JAVA_HARNESS_CLASS: &str = "CodecraftHarness";

// Reads all of stdin, trims trailing whitespace and prints what `solution`
// returns. `Object` boxes primitive return types.
const JAVA_HARNESS: &str = r#"import java.nio.charset.StandardCharsets;

public class CodecraftHarness {
    public static void main(String[] args) throws Exception {
        String input = new String(System.in.readAllBytes(), StandardCharsets.UTF_8).replaceAll("\\s+$", "");
        Object result = __CLASS__.solution(input);
        if (result != null) {
            System.out.println(result);
        }
    }
}
"#;

/// Name of the first `public class`, which javac requires to match the file name.
fn java_class_name(source: &str) -> String {
    for line in source.lines() {
        let trimmed = line.trim();
        let rest = trimmed
            .strip_prefix("public final class ")
            .or_else(|| trimmed.strip_prefix("public class "));
        if let Some(rest) = rest {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
                .collect();
            if !name.is_empty() {
                return name;
            }
        }
    }
    "Main".to_string()
}

fn without_whitespace(source: &str) -> String {
    source.chars().filter(|c| !c.is_whitespace()).collect()
}

/// The editor template's `static ... solution(String input)`.
fn defines_java_solution(source: &str) -> bool {
    let compact = without_whitespace(source);
    compact.contains("solution(String") && !compact.contains("solution(String[]")
}

impl LanguageAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    fn file_extension(&self) -> &'static str {
        "java"
    }

    fn prepare_sources(&self, source: &str) -> Vec<SourceFile> {
        let class = java_class_name(source);
        let mut files = vec![SourceFile::new(format!("{}.java", class), source)];
        if defines_java_solution(source) {
            files.push(SourceFile::new(
                format!("{}.java", JAVA_HARNESS_CLASS),
                JAVA_HARNESS.replace("__CLASS__", &class),
            ));
        }
        files
    }

    fn compile_command(&self, source: &str) -> Option<Vec<String>> {
        let file = format!("{}.java", java_class_name(source));
        let mut command = argv(&["javac", "-encoding", "UTF-8", "-nowarn", &file]);
        if defines_java_solution(source) {
            command.push(format!("{}.java", JAVA_HARNESS_CLASS));
        }
        Some(command)
    }

    fn run_command(&self, source: &str) -> Vec<String> {
        let class = if defines_java_solution(source) {
            JAVA_HARNESS_CLASS.to_string()
        } else {
            java_class_name(source)
        };
        argv(&["java", "-Xss64m", "-XX:+UseSerialGC", "-cp", ".", &class])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CppAdapter;

// Headers come first so the `main` rename below cannot reach into them. The
// `#line` keeps compiler diagnostics pointing at the submission's own lines.
const CPP_HARNESS_PREFIX: &str = "#include <cctype>
#include <iostream>
#include <iterator>
#include <string>
#define main codecraft_user_main
#line 1 \"main.cpp\"
";

const CPP_HARNESS_DRIVER: &str = "
#undef main
int main() {
    std::string input((std::istreambuf_iterator<char>(std::cin)), std::istreambuf_iterator<char>());
    while (!input.empty() && std::isspace(static_cast<unsigned char>(input.back()))) {
        input.pop_back();
    }
    std::cout << solution(input) << std::endl;
    return 0;
}
";

/// The editor template's `std::string solution(std::string input)`.
fn defines_cpp_solution(source: &str) -> bool {
    let compact = without_whitespace(source);
    ["solution(std::string", "solution(string", "solution(conststd::string", "solution(conststring"]
        .iter()
        .any(|signature| compact.contains(signature))
}

impl LanguageAdapter for CppAdapter {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn file_extension(&self) -> &'static str {
        "cpp"
    }

    fn prepare_sources(&self, source: &str) -> Vec<SourceFile> {
        if defines_cpp_solution(source) {
            let wrapped = format!("{}{}{}", CPP_HARNESS_PREFIX, source, CPP_HARNESS_DRIVER);
            vec![SourceFile::new("main.cpp", wrapped)]
        } else {
            vec![SourceFile::new("main.cpp", source)]
        }
    }

    fn compile_command(&self, _source: &str) -> Option<Vec<String>> {
        Some(argv(&[
            "g++", "-O2", "-std=c++17", "-pipe", "-o", "main", "main.cpp",
        ]))
    }

    fn run_command(&self, _source: &str) -> Vec<String> {
        argv(&["./main"])
    }
}
