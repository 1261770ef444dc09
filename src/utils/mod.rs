pub mod utils_ids;
pub mod utils_time;

pub use utils_ids::{escape_segment, join_segments};
pub use utils_time::current_time_ms;
