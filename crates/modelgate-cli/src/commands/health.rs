use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Table};
use modelgate_ai::{BreakerStatus, CircuitState};
use serde_json::json;

use crate::cli::HealthArgs;
use crate::config::CliConfig;
use crate::output::{OutputFormat, json::print_json, table::print_table};
use crate::setup::prepare_gateway;

pub async fn run(config: &CliConfig, args: HealthArgs, format: OutputFormat) -> Result<()> {
    let gateway = prepare_gateway(config, Duration::from_secs(1)).await;
    let breaker = &gateway.breaker;

    if args.reset {
        let removed = match &args.model_key {
            Some(key) => {
                breaker.reset(key).await;
                1
            }
            None => breaker.reset_all().await,
        };
        if format.is_json() {
            return print_json(&json!({ "reset": removed }));
        }
        println!("Reset {removed} circuit(s)");
        return Ok(());
    }

    let keys = match args.model_key {
        Some(key) => vec![key],
        None => breaker.tracked_keys().await,
    };
    let statuses = breaker.statuses(&keys).await;

    if format.is_json() {
        return print_json(&json!({
            "backend": gateway.state.backend_name(),
            "degraded": gateway.state.is_degraded(),
            "circuits": statuses,
        }));
    }

    println!("State backend: {}", describe_backend(&gateway));
    if statuses.is_empty() {
        println!("No tracked models");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Model", "State", "Failures", "Available", "Retry In"]);
    for status in &statuses {
        table.add_row(vec![
            Cell::new(&status.model_key),
            Cell::new(state_label(status)),
            Cell::new(status.failure_count),
            Cell::new(if status.available { "yes" } else { "no" }),
            Cell::new(
                status
                    .retry_in_ms
                    .map(|ms| format!("{}s", (ms + 999) / 1000))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    print_table(table)
}

fn state_label(status: &BreakerStatus) -> &'static str {
    match status.state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
    }
}

fn describe_backend(gateway: &crate::setup::Gateway) -> String {
    if gateway.state.is_degraded() {
        format!("{} (degraded, state is process-local)", gateway.state.backend_name())
    } else {
        gateway.state.backend_name().to_string()
    }
}
