pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    accent, dim, error, file_removed, header, info, muted, section, status, success, summary_row,
    timing, warn,
};
pub use progress::IndexProgress;
pub use table::{TableBuilder, stats_table};
pub use theme::{Theme, theme};
