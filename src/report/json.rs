use anyhow::Result;
use std::path::Path;

use super::types::ReplayResults;

/// Generate JSON report
pub async fn generate(results: &ReplayResults, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;

    if let Some(path) = output {
        tokio::fs::write(path, json).await?;
        println!("JSON report saved to: {}", path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}
