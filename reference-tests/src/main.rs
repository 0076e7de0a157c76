//! Reference test binary entry point
//!
//! Runs every reference scenario and exits non-zero if any fails.

use reference_tests::suite::all_tests;
use reference_tests::TestResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into())
}

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(log_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    tracing::info!("SPH Reference Test Suite");
    tracing::info!("========================");

    let tests = all_tests();
    tracing::info!("Found {} reference tests", tests.len());

    let mut results: Vec<TestResult> = Vec::new();
    let mut passed_count = 0;
    let mut failed_count = 0;

    for test in tests {
        match test.run() {
            Ok(result) => {
                if result.passed {
                    passed_count += 1;
                } else {
                    failed_count += 1;
                }
                result.print_summary();
                results.push(result);
            }
            Err(e) => {
                eprintln!("\nERROR running test {}: {}", test.name, e);
                failed_count += 1;
            }
        }
    }

    // Print overall summary
    println!("\n{}", "=".repeat(80));
    println!("OVERALL SUMMARY");
    println!("{}", "=".repeat(80));
    println!("Total tests: {}", passed_count + failed_count);
    println!("Passed: {}", passed_count);
    println!("Failed: {}", failed_count);
    println!("{}", "=".repeat(80));

    if failed_count > 0 {
        std::process::exit(1);
    }
}
