pub mod metadata;

#[allow(unused_imports)]
pub use metadata::{PostgresTestMetadata, TestMetadata, run_metadata_test_both};
