//! The `examgrade validate` command.

use std::path::PathBuf;

use anyhow::Result;

use examgrade_core::parser;
use examgrade_store::config::load_config_from;

pub fn execute(fixture_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let options = config.fixture_options();

    let fixtures = if fixture_path.is_dir() {
        parser::load_fixture_directory(&fixture_path, &options)?
    } else {
        vec![parser::parse_fixture(&fixture_path, &options)?]
    };

    let mut total_warnings = 0;

    for fixture in &fixtures {
        println!(
            "Fixture: {} exams, {} attempts",
            fixture.exams.len(),
            fixture.attempts.len()
        );

        let warnings = parser::validate_fixture(fixture);
        for w in &warnings {
            let prefix = w
                .subject
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All fixtures valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
