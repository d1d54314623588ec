#![allow(dead_code)]

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, registry};

/// Helper function to set up tracing for tests
pub fn setup_tracing(level: Level) {
    let subscriber = registry()
        .with(
            fmt::layer()
                .with_test_writer()
                .with_ansi(false) // Better for CI logs
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            EnvFilter::from_default_env()
                .add_directive(level.into())
                .add_directive("reqwest=info".parse().unwrap())
                .add_directive("hyper=info".parse().unwrap()),
        );

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Sources blob in the shape the search provider produces
pub fn legal_search_blob() -> String {
    serde_json::json!([
        {
            "url": "https://leginfo.legislature.ca.gov/faces/codes_displaySection.xhtml?lawCode=CCP&sectionNum=337",
            "content": "Within four years: An action upon any contract, obligation or liability founded upon an instrument in writing."
        },
        {
            "url": "https://www.courts.ca.gov/9618.htm",
            "content": "The statute of limitations for breach of an oral contract is two years."
        }
    ])
    .to_string()
}
