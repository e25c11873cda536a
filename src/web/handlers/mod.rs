pub mod comments;
pub mod feeds;

use crate::app_error::AppError;
use crate::models::comment::{SortMode, Timeframe};

pub(crate) fn parse_sort(raw: Option<&str>) -> Result<SortMode, AppError> {
    match raw.unwrap_or("hot") {
        "hot" => Ok(SortMode::Hot),
        "top" => Ok(SortMode::Top),
        "new" => Ok(SortMode::New),
        other => Err(AppError::validation(format!("unknown sort '{other}'"))),
    }
}

pub(crate) fn parse_timeframe(raw: Option<&str>) -> Result<Timeframe, AppError> {
    match raw.unwrap_or("all") {
        "hour" => Ok(Timeframe::Hour),
        "day" => Ok(Timeframe::Day),
        "week" => Ok(Timeframe::Week),
        "month" => Ok(Timeframe::Month),
        "year" => Ok(Timeframe::Year),
        "all" => Ok(Timeframe::All),
        other => Err(AppError::validation(format!("unknown timeframe '{other}'"))),
    }
}
