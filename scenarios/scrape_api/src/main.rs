use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use stampede_runner::prelude::*;
use url::Url;

const DEFAULT_CONNECTION_STRING: &str = "http://localhost:8080";

const SCRAPE_URLS: &[&str] = &[
    "https://map.naver.com/",
    "https://shopping.naver.com/",
    "https://shoppinglive.naver.com/",
];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct ScrapeRunnerContext {
    client: reqwest::Client,
    endpoint: Option<Url>,
}

impl UserValuesConstraint for ScrapeRunnerContext {}

#[derive(Serialize)]
struct ScrapeRequest<'a> {
    urls: &'a [&'a str],
}

#[derive(Deserialize)]
struct ScrapeResponse {
    results: Option<serde_json::Value>,
}

fn setup(ctx: &mut RunnerContext<ScrapeRunnerContext>) -> HookResult {
    let base = ctx
        .connection_string()
        .unwrap_or(DEFAULT_CONNECTION_STRING)
        .to_string();
    let endpoint = Url::parse(&base)
        .with_context(|| format!("Invalid connection string: {base}"))?
        .join("/api/scrape")?;
    log::info!("Scraping through {endpoint}");

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    ctx.get_mut().client = client;
    ctx.get_mut().endpoint = Some(endpoint);

    Ok(())
}

fn behaviour(ctx: &mut VirtualUserContext<ScrapeRunnerContext, ()>) -> HookResult {
    let client = ctx.runner_context().get().client.clone();
    let endpoint = ctx
        .runner_context()
        .get()
        .endpoint
        .clone()
        .context("Scrape endpoint was not configured")?;

    let (status, response) = ctx
        .runner_context()
        .executor()
        .execute_in_place(async move {
            let response = client
                .post(endpoint)
                .json(&ScrapeRequest { urls: SCRAPE_URLS })
                .send()
                .await
                .context("Scrape request failed")?;

            let status = response.status();
            let body = response.json::<ScrapeResponse>().await;
            Ok((status, body))
        })?;

    ctx.check("is status 200", status == reqwest::StatusCode::OK);
    let valid_json = match response {
        Ok(response) => response.results.is_some(),
        Err(e) => {
            log::debug!("Response was not valid JSON: {e}");
            false
        }
    };
    ctx.check("is valid JSON", valid_json);

    Ok(())
}

fn main() -> StampedeResult<()> {
    let builder =
        ScenarioDefinitionBuilder::<ScrapeRunnerContext, ()>::new_with_init(env!("CARGO_PKG_NAME"))
            .with_default_virtual_users(1000)
            .with_default_duration_s(30 * 60)
            .with_default_iteration_delay(Duration::from_secs(1))
            .use_setup(setup)
            .use_behaviour(behaviour);

    run(builder)?;

    Ok(())
}
