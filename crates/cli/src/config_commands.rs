use {anyhow::Result, gqlbus_codegen::Generator};

use gqlbus_config::{
    Severity,
    validate::{self, ValidationResult},
};

use crate::project::ProjectConfig;

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Validate the config file, then, unless `offline`, fetch every catalogue
/// and check the query documents against it.
pub async fn check(
    config_path: Option<&std::path::Path>,
    verbose: bool,
    offline: bool,
) -> Result<()> {
    let result = validate::validate(config_path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found.\n");
    }

    let shown = print_diagnostics(&result, verbose);
    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No config issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }
    if offline || result.config_path.is_none() {
        return Ok(());
    }

    let project = ProjectConfig::load(config_path)?;
    let generator: Generator = project.generator(&[])?;
    match generator.analyse().await {
        Ok(packages) => {
            for package in &packages {
                eprintln!(
                    "  {BOLD}{}{RESET}: {} operation(s), {} enum(s), {} input(s)",
                    package.service,
                    package.operations.len(),
                    package.enums.len(),
                    package.inputs.len()
                );
            }
            Ok(())
        },
        Err(e) => {
            eprintln!("  {BOLD}{RED}error{RESET} {e}");
            std::process::exit(1);
        },
    }
}

fn print_diagnostics(result: &ValidationResult, verbose: bool) -> usize {
    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }
    shown
}
