pub mod faulty;
pub mod fixtures;
pub mod harness;

#[allow(unused_imports)]
pub use faulty::{FaultyMetadata, FaultyStore};
#[allow(unused_imports)]
pub use fixtures::{seeded_bytes, sha256_hash};
#[allow(unused_imports)]
pub use harness::TestUploader;
