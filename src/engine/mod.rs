pub mod daily_counter;
pub mod dashboard;
pub mod fees;
pub mod intake;
pub mod lifecycle;
pub mod payments;
pub mod penalty;
pub mod pricing;
