use anyhow::{Context, Result};
use onebowl_core::{extract, fetch_html, ExtractRecipeOutput, FetchConfig};
use std::fs;
use std::path::Path;

/// Extract a recipe from an HTML file.
/// Outputs JSON to stdout (the extraction output on success or an error message on failure).
pub fn parse_html(file: &Path, source_url: &str) -> Result<()> {
    let html = fs::read_to_string(file)
        .with_context(|| format!("Failed to read HTML file: {}", file.display()))?;

    print_extraction(extract(&html, source_url))
}

/// Fetch a page through the SSRF guard and extract a recipe from it.
///
/// Honors the fetch timeout and redirect limit from the environment; no API key is needed.
pub async fn fetch_and_parse(url: &str) -> Result<()> {
    let config = FetchConfig::from_env().context("Invalid fetch configuration")?;
    let html = fetch_html(url, &config).await?;
    print_extraction(extract(&html, url))
}

fn print_extraction(
    result: Result<ExtractRecipeOutput, onebowl_core::ExtractError>,
) -> Result<()> {
    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            let error_json = serde_json::json!({
                "error": e.to_string()
            });
            println!("{}", serde_json::to_string_pretty(&error_json)?);
            // Return error so exit code is non-zero
            Err(anyhow::anyhow!("Failed to extract recipe: {}", e))
        }
    }
}
