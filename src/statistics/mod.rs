mod presenter;
mod store;

pub use presenter::{BlinkStatistic, StatisticsModel};
pub use store::{StatRecord, StatisticsRepository, StatisticsStore};
