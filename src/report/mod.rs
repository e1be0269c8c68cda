pub mod json;
pub mod junit;
pub mod types;

use anyhow::Result;
use std::path::Path;

pub use types::{ReplayResults, StepOutcome};

/// Write `results.json` and `junit.xml` into `output_dir`
pub async fn write_reports(results: &ReplayResults, output_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(output_dir).await?;
    json::generate(results, Some(&output_dir.join("results.json"))).await?;
    junit::write_report(results, output_dir)?;
    Ok(())
}

/// Generate a report from saved replay results
pub async fn generate_report(
    results_path: &Path,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let results = tokio::fs::read_to_string(results_path).await?;
    let replay_results: ReplayResults = serde_json::from_str(&results)?;

    match format {
        "json" => json::generate(&replay_results, output).await,
        "junit" => {
            let xml = junit::generate_junit_xml(&replay_results)?;
            match output {
                Some(path) => {
                    tokio::fs::write(path, xml).await?;
                    println!("JUnit report saved to: {}", path.display());
                }
                None => println!("{}", xml),
            }
            Ok(())
        }
        _ => anyhow::bail!("Unknown format: {}", format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;
    use crate::replayer::ReplayRun;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_reports() {
        let mut run = ReplayRun::new("login", vec![Action::click("#go", 1)]);
        run.start();
        run.advance();
        run.finish();
        let results = ReplayResults::from_run(&run, Some("42"));
        assert_eq!(results.outcome(0), StepOutcome::Passed);

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("reports");
        write_reports(&results, &out).await.unwrap();

        let saved = out.join("results.json");
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&saved).unwrap()).unwrap();
        assert_eq!(json["recordingId"], "42");
        assert_eq!(json["cursor"], 1);
        assert!(out.join("junit.xml").exists());

        let junit = dir.path().join("again.xml");
        generate_report(&saved, "junit", Some(&junit)).await.unwrap();
        assert!(std::fs::read_to_string(&junit).unwrap().contains("testcase"));
        assert!(generate_report(&saved, "pdf", None).await.is_err());
    }
}
