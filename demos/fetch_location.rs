// demos/fetch_location.rs
use chrono::NaiveDate;
use noaa_cdo::{Dataset, FetchError, Noaa, NoaaError};

#[tokio::main]
async fn main() -> Result<(), NoaaError> {
    // Set RUST_LOG=info (or debug) to follow chunking, pacing and retries.
    env_logger::init();

    // Reads NOAA_TOKEN (and optionally NOAA_API_URL) from the environment or a .env file.
    let client = Noaa::from_env().await?;

    let result = client
        .location()
        .dataset(Dataset::Gsom)
        .location_id("FIPS:BR")
        .location_name("Brazil".to_string())
        .start(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
        .end(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
        .call()
        .await;

    match result {
        Ok(observations) => {
            println!("Fetched {} observations", observations.len());
            for observation in observations.iter().take(5) {
                println!(
                    "{} {} {} = {}",
                    observation.date, observation.station, observation.datatype, observation.value
                );
            }
        }
        Err(NoaaError::Fetch(FetchError::PartialFetch(partial))) => {
            println!(
                "Recovered {} observations, {} units still missing:",
                partial.records.len(),
                partial.failures.len()
            );
            for failure in &partial.failures {
                println!("  {failure}");
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(e);
        }
    }

    if let Some(entry) = client.cache().location_entry("FIPS:BR").await {
        println!(
            "Whitelist: {} stations with data, {} items, status {:?}",
            entry.count, entry.items, entry.status
        );
    }
    Ok(())
}
