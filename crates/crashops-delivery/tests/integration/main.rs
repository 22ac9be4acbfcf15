//! Integration tests for crashops-delivery
//!
//! Drives the DeliveryScheduler against a real FileReportStore and a
//! recording transport, and the HttpTransport against a wiremock collector.

mod common;

mod test_http;
mod test_scheduler;
