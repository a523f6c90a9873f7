//! Bin and segment command drivers
//!

mod bin;
mod segment;

pub use self::bin::{BIN_SETTINGS_FILENAME, BINNED_GENES_FILENAME, run_bin};
pub use self::segment::{SEGMENT_SETTINGS_FILENAME, run_segment};

fn get_worker_pool(thread_count: usize) -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .unwrap()
}
