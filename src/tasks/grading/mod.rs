mod retry;
mod worker;

pub(crate) use worker::{grade, GradingAborted};
