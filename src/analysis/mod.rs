pub mod cutoffs;
pub mod metrics;
pub mod screen;

pub use cutoffs::{aggregate, aggregate_top, aggregate_with_direction, quantile};
pub use metrics::{extract, extract_company, resolve_line_items, LineItem};
pub use screen::{passes, screen, MetricSelection, ScreenCriteria};
