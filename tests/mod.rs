mod config_tests;
mod metrics_tests;
mod shutdown_tests;
mod support;
mod user_tests;
