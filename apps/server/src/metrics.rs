//! Metrics collection for the surrogate key catalog
//!
//! Prometheus metrics registered in the default registry.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    Encoder, Histogram, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};

lazy_static! {
    /// In-memory lookups against the unbounded vocabularies, by result (hit/miss)
    pub static ref CATALOG_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fhir_catalog_lookups_total",
        "Surrogate key cache lookups for unbounded vocabularies",
        &["vocabulary", "result"]
    )
    .expect("Failed to register CATALOG_LOOKUPS_TOTAL");

    /// Cold-path get-or-create duration
    pub static ref CATALOG_CREATE_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "fhir_catalog_get_or_create_duration_seconds",
        "Duration of store round trips resolving unseen vocabulary values",
        &["vocabulary"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register CATALOG_CREATE_DURATION_SECONDS");

    /// Get-or-create attempts repeated after losing a concurrent registration race
    pub static ref CATALOG_CREATE_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fhir_catalog_get_or_create_retries_total",
        "Get-or-create transactions retried after a serialization conflict",
        &["vocabulary"]
    )
    .expect("Failed to register CATALOG_CREATE_RETRIES_TOTAL");

    /// Bootstrap duration
    pub static ref CATALOG_BOOTSTRAP_DURATION_SECONDS: Histogram = register_histogram!(
        "fhir_catalog_bootstrap_duration_seconds",
        "Duration of surrogate key catalog bootstrap",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register CATALOG_BOOTSTRAP_DURATION_SECONDS");

    /// Entries loaded per vocabulary at bootstrap
    pub static ref CATALOG_VOCABULARY_SIZE: IntGaugeVec = register_int_gauge_vec!(
        "fhir_catalog_vocabulary_size",
        "Entries loaded into the catalog at bootstrap",
        &["vocabulary"]
    )
    .expect("Failed to register CATALOG_VOCABULARY_SIZE");

    /// Search parameter status sync outcomes
    pub static ref CATALOG_STATUS_SYNC_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fhir_catalog_status_sync_total",
        "Search parameter status synchronizations by outcome",
        &["outcome"]
    )
    .expect("Failed to register CATALOG_STATUS_SYNC_TOTAL");
}

/// Render all registered metrics in the Prometheus text format.
pub fn render() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_touched_metrics() {
        CATALOG_STATUS_SYNC_TOTAL
            .with_label_values(&["skipped"])
            .inc();
        CATALOG_VOCABULARY_SIZE
            .with_label_values(&["resource_type"])
            .set(2);

        let text = render().unwrap();
        assert!(text.contains("fhir_catalog_status_sync_total"));
        assert!(text.contains("fhir_catalog_vocabulary_size{vocabulary=\"resource_type\"}"));
    }
}
