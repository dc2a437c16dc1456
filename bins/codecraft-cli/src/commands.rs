// CLI commands for operating a CodeCraft judge deployment
use anyhow::{bail, Context, Result};
use codecraft_common::types::{Comparator, Language, ProblemSpec, TestCase};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// One entry of `languages.json`.
///
/// Limits left out fall back to the judge's built-in defaults, so they stay
/// optional here and are written back only when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub name: String,
    pub version: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_time_limit_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_time_limit_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguagesJson {
    pub languages: Vec<LanguageEntry>,
}

fn load_languages_config(config_path: &Path) -> Result<LanguagesJson> {
    if !config_path.exists() {
        bail!(
            "{} not found. Create one with: codecraft-cli init",
            config_path.display()
        );
    }

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", config_path.display()))
}

fn language_entry(language: Language, version: &str) -> LanguageEntry {
    LanguageEntry {
        name: language.as_str().to_string(),
        version: version.to_string(),
        image: format!("codecraft-{}:{}", language, version),
        dockerfile_path: Some(format!("dockerfiles/{}/Dockerfile", language)),
        memory_limit_mb: None,
        cpu_time_limit_ms: None,
        wall_time_limit_ms: None,
        compile_timeout_ms: None,
    }
}

/// The four languages the judge ships adapters for.
pub fn default_languages() -> LanguagesJson {
    let mut java = language_entry(Language::Java, "21");
    // JVM startup needs more headroom than the defaults.
    java.memory_limit_mb = Some(512);
    java.cpu_time_limit_ms = Some(4000);
    java.wall_time_limit_ms = Some(8000);

    LanguagesJson {
        languages: vec![
            language_entry(Language::Javascript, "20"),
            language_entry(Language::Python, "3.12"),
            java,
            language_entry(Language::Cpp, "13"),
        ],
    }
}

/// Sandbox image for a language. The judge bind-mounts the workspace at
/// `/box` and runs as nobody, so images only need the toolchain.
pub fn generate_dockerfile(language: Language, version: &str) -> String {
    let body = match language {
        Language::Javascript => format!(
            r#"# JavaScript sandbox
FROM node:{}-alpine

ENV NODE_ENV=production \
    NODE_OPTIONS=--max-old-space-size=192
"#,
            version
        ),
        Language::Python => format!(
            r#"# Python sandbox
FROM python:{}-alpine

ENV PYTHONUNBUFFERED=1 \
    PYTHONDONTWRITEBYTECODE=1
"#,
            version
        ),
        Language::Java => format!(
            r#"# Java sandbox
FROM eclipse-temurin:{}-jdk-alpine
"#,
            version
        ),
        Language::Cpp => format!(
            r#"# C++ sandbox
FROM gcc:{}
"#,
            version
        ),
    };

    format!(
        "# GENERATED BY codecraft-cli\n{}\nENV LANG=C.UTF-8\nWORKDIR /box\nUSER 65534:65534\n",
        body
    )
}

/// Problem 1 of a fresh deployment: double an integer.
pub fn example_problem() -> ProblemSpec {
    let case = |input: &str, expected: &str, is_sample: bool, is_hidden: bool| TestCase {
        input: input.to_string(),
        expected_output: expected.to_string(),
        is_sample,
        is_hidden,
    };

    ProblemSpec {
        id: 1,
        comparator: Comparator::Exact,
        time_limit_ms: None,
        memory_limit_mb: None,
        test_cases: vec![
            case("21", "42", true, false),
            case("0", "0", true, false),
            case("-7", "-14", false, true),
            case("123456789", "246913578", false, true),
        ],
    }
}

/// Initialize a new deployment directory
pub async fn init_project(path: &str) -> Result<()> {
    println!("🚀 Initializing CodeCraft judge at: {}", path);

    let project_path = Path::new(path);

    for dir in ["config", "dockerfiles", "problems"] {
        fs::create_dir_all(project_path.join(dir))
            .with_context(|| format!("Failed to create directory: {}", dir))?;
        println!("  ✅ Created: {}", dir);
    }

    let languages = default_languages();
    write_if_missing(
        &project_path.join("config/languages.json"),
        &serde_json::to_string_pretty(&languages)?,
    )?;

    for entry in &languages.languages {
        let language: Language = entry.name.parse()?;
        let dockerfile = PathBuf::from(format!("dockerfiles/{}/Dockerfile", language));
        let target = project_path.join(&dockerfile);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        write_if_missing(&target, &generate_dockerfile(language, &entry.version))?;
    }

    write_if_missing(
        &project_path.join("problems/1.json"),
        &serde_json::to_string_pretty(&example_problem())?,
    )?;

    println!("✅ Project initialized successfully!");
    println!("\n📋 Next steps:");
    println!("  1. Build sandbox images: codecraft-cli build-image --name python");
    println!("  2. Validate the setup: codecraft-cli check");
    println!("  3. Start the judge: cargo run -p codecraft-judge");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("  ⏭️  Kept existing: {}", path.display());
        return Ok(());
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("  ✅ Created: {}", path.display());
    Ok(())
}

/// List all configured languages
pub async fn list_languages(config: &str) -> Result<()> {
    let languages_json = load_languages_config(Path::new(config))?;

    if languages_json.languages.is_empty() {
        println!("No languages configured.");
        return Ok(());
    }

    let show = |value: Option<u64>| value.map_or_else(|| "default".to_string(), |v| v.to_string());

    println!("📋 Configured Languages:\n");
    println!(
        "{:<12} {:<10} {:<30} {:<10} {:<10} {:<10}",
        "Name", "Version", "Image", "Mem MB", "CPU ms", "Wall ms"
    );
    println!("{}", "─".repeat(86));

    for lang in &languages_json.languages {
        println!(
            "{:<12} {:<10} {:<30} {:<10} {:<10} {:<10}",
            lang.name,
            lang.version,
            lang.image,
            show(lang.memory_limit_mb),
            show(lang.cpu_time_limit_ms),
            show(lang.wall_time_limit_ms),
        );
    }

    println!("\n✅ Total: {} language(s)", languages_json.languages.len());

    Ok(())
}

/// Problems with `languages.json`, relative to the directory holding `config/`.
pub fn validate_languages(languages: &LanguagesJson, root: &Path) -> Vec<String> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    if languages.languages.is_empty() {
        issues.push("no languages configured".to_string());
    }

    for entry in &languages.languages {
        let language = match entry.name.parse::<Language>() {
            Ok(language) => language,
            Err(e) => {
                issues.push(e.to_string());
                continue;
            }
        };
        if !seen.insert(language) {
            issues.push(format!("{} is configured twice", language));
        }
        if entry.image.trim().is_empty() {
            issues.push(format!("{}: image is empty", entry.name));
        }
        for (field, value) in [
            ("memory_limit_mb", entry.memory_limit_mb),
            ("cpu_time_limit_ms", entry.cpu_time_limit_ms),
            ("wall_time_limit_ms", entry.wall_time_limit_ms),
            ("compile_timeout_ms", entry.compile_timeout_ms),
        ] {
            if value == Some(0) {
                issues.push(format!("{}: {} must be positive", entry.name, field));
            }
        }
        if let (Some(cpu), Some(wall)) = (entry.cpu_time_limit_ms, entry.wall_time_limit_ms) {
            if wall < cpu {
                issues.push(format!(
                    "{}: wall_time_limit_ms ({}) is below cpu_time_limit_ms ({})",
                    entry.name, wall, cpu
                ));
            }
        }
        if let Some(dockerfile) = &entry.dockerfile_path {
            if !root.join(dockerfile).exists() {
                issues.push(format!("{}: {} does not exist", entry.name, dockerfile));
            }
        }
    }

    issues
}

/// Problems with one problem file's content.
pub fn validate_problem(problem: &ProblemSpec) -> Vec<String> {
    let mut issues = Vec::new();

    if problem.test_cases.is_empty() {
        issues.push("has no test cases".to_string());
    } else if problem.test_cases.iter().all(|tc| tc.is_hidden && !tc.is_sample) {
        issues.push("every test case is hidden, so Run mode has nothing to execute".to_string());
    }
    if problem.time_limit_ms == Some(0) {
        issues.push("time_limit_ms must be positive".to_string());
    }
    if problem.memory_limit_mb == Some(0) {
        issues.push("memory_limit_mb must be positive".to_string());
    }
    if let Comparator::Float {
        abs_tolerance,
        rel_tolerance,
    } = problem.comparator
    {
        if !(abs_tolerance >= 0.0 && rel_tolerance >= 0.0) {
            issues.push("float tolerances must be non-negative".to_string());
        }
    }

    issues
}

/// Validate languages.json and every `<id>.json` under the problems directory
pub async fn check(config: &str, problems_dir: &str) -> Result<()> {
    let config_path = Path::new(config);
    // Dockerfile paths are relative to the deployment root, one level above config/.
    let root = config_path
        .parent()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    let mut failures = 0;

    println!("🔍 Checking {}", config_path.display());
    let languages = load_languages_config(config_path)?;
    let issues = validate_languages(&languages, root);
    if issues.is_empty() {
        println!("  ✅ {} language(s) OK", languages.languages.len());
    }
    for issue in issues {
        println!("  ❌ {}", issue);
        failures += 1;
    }

    println!("\n🔍 Checking problems in {}", problems_dir);
    let mut files: Vec<PathBuf> = fs::read_dir(problems_dir)
        .with_context(|| format!("Failed to read {}", problems_dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    if files.is_empty() {
        println!("  ⚠️  No problem files found");
    }

    for path in &files {
        let name = path.display();
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if stem.parse::<u64>().is_err() {
            println!("  ❌ {}: file name must be the numeric problem id", name);
            failures += 1;
            continue;
        }

        let parsed = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", name))
            .and_then(|content| {
                serde_json::from_str::<ProblemSpec>(&content)
                    .with_context(|| format!("Failed to parse {}", name))
            });
        let problem = match parsed {
            Ok(problem) => problem,
            Err(e) => {
                println!("  ❌ {:#}", e);
                failures += 1;
                continue;
            }
        };

        let issues = validate_problem(&problem);
        if issues.is_empty() {
            println!("  ✅ {} ({} test cases)", name, problem.test_cases.len());
        }
        for issue in issues {
            println!("  ❌ {}: {}", name, issue);
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{} problem(s) found", failures);
    }

    println!("\n✅ Everything looks good!");
    Ok(())
}

/// Build the sandbox Docker image for a language
pub async fn build_docker_image(config: &str, name: &str, no_cache: bool) -> Result<()> {
    println!("🐳 Building Docker image for: {}", name);

    let languages_json = load_languages_config(Path::new(config))?;

    let lang_config = languages_json
        .languages
        .iter()
        .find(|l| l.name == name)
        .ok_or_else(|| anyhow::anyhow!("Language '{}' not found in config", name))?;

    let dockerfile_path = PathBuf::from(
        lang_config
            .dockerfile_path
            .clone()
            .unwrap_or_else(|| format!("dockerfiles/{}/Dockerfile", name)),
    );

    if !dockerfile_path.exists() {
        bail!(
            "Dockerfile not found at {}. Generate it first with: codecraft-cli init",
            dockerfile_path.display()
        );
    }

    let image_versioned = lang_config.image.clone();
    let image_latest = format!("codecraft-{}:latest", name);

    println!("📦 Building tags:");
    println!("  - {}", image_versioned);
    println!("  - {}", image_latest);

    let mut docker_args = vec![
        "build".to_string(),
        "-t".to_string(),
        image_versioned.clone(),
        "-t".to_string(),
        image_latest.clone(),
        "-f".to_string(),
        dockerfile_path.to_string_lossy().to_string(),
    ];

    if no_cache {
        docker_args.push("--no-cache".to_string());
    }

    docker_args.push(".".to_string());

    println!("\n🔨 Running: docker {}", docker_args.join(" "));

    let status = Command::new("docker")
        .args(&docker_args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .context("Failed to execute docker build. Is Docker installed and running?")?;

    if !status.success() {
        bail!("Docker build failed with exit code: {:?}", status.code());
    }

    println!("\n✅ Docker image built successfully!");
    println!("  - {}", image_versioned);
    println!("  - {}", image_latest);

    Ok(())
}
