use anyhow::{Context, Result};
use clap::Parser;
use listing_cleaner::{
    artifact::{ArtifactSpec, Store},
    clean, table,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Fetch a raw listings artifact, drop price/latitude outliers, parse the
/// review dates, and publish the cleaned table as a new artifact.
#[derive(Parser, Debug)]
#[command(name = "listing-cleaner")]
struct Args {
    /// Reference to the input dataset (`name` or `name:version`)
    #[arg(long = "input_artifact")]
    input_artifact: String,

    /// Name for the cleaned output artifact
    #[arg(long = "output_artifact")]
    output_artifact: String,

    /// Type recorded on the output artifact
    #[arg(long = "output_type")]
    output_type: String,

    /// Description recorded on the output artifact
    #[arg(long = "output_description")]
    output_description: String,

    /// Minimum price cutoff (inclusive)
    #[arg(long = "min_price")]
    min_price: f64,

    /// Maximum price cutoff (inclusive)
    #[arg(long = "max_price")]
    max_price: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let store = Store::from_env()?;

    // one scratch directory for the whole run; removed on every exit path
    let scratch = tempfile::tempdir().context("creating scratch directory")?;

    info!(artifact = %args.input_artifact, "downloading and reading artifact");
    let input_path = store
        .resolve_to_file(&args.input_artifact, scratch.path())
        .await?;
    let raw = table::read_csv_file(&input_path)?;
    info!(rows = raw.num_rows(), "loaded raw table");

    info!(
        min_price = args.min_price,
        max_price = args.max_price,
        "dropping outliers and converting `last_review` to datetime"
    );
    let cleaned = clean::clean_listings(&raw, args.min_price, args.max_price)?;
    info!(rows = cleaned.num_rows(), "rows kept after cleaning");

    let output_path = scratch.path().join(&args.output_artifact);
    table::write_csv_file(&cleaned, &output_path)?;

    info!(artifact = %args.output_artifact, "uploading cleaned dataset");
    let spec = ArtifactSpec {
        name: args.output_artifact,
        artifact_type: args.output_type,
        description: args.output_description,
    };
    let published = store.publish(&spec, &output_path).await?;
    store.wait_committed(&published).await?;
    info!(name = %published.name, version = %published.version, "artifact committed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_six_flags_parse() {
        let args = Args::try_parse_from([
            "listing-cleaner",
            "--input_artifact",
            "nyc_raw.csv:latest",
            "--output_artifact",
            "clean_sample.csv",
            "--output_type",
            "clean_sample",
            "--output_description",
            "Listings with outliers removed",
            "--min_price",
            "10",
            "--max_price",
            "350",
        ])
        .expect("full flag set should parse");

        assert_eq!(args.input_artifact, "nyc_raw.csv:latest");
        assert_eq!(args.min_price, 10.0);
        assert_eq!(args.max_price, 350.0);
    }

    #[test]
    fn missing_flag_is_a_startup_error() {
        let err = Args::try_parse_from([
            "listing-cleaner",
            "--input_artifact",
            "nyc_raw.csv:latest",
            "--output_artifact",
            "clean_sample.csv",
            "--output_type",
            "clean_sample",
            "--output_description",
            "Listings with outliers removed",
            "--min_price",
            "10",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("--max_price"));
    }

    #[test]
    fn non_numeric_price_is_a_startup_error() {
        assert!(Args::try_parse_from([
            "listing-cleaner",
            "--input_artifact",
            "a",
            "--output_artifact",
            "b",
            "--output_type",
            "c",
            "--output_description",
            "d",
            "--min_price",
            "cheap",
            "--max_price",
            "350",
        ])
        .is_err());
    }
}
