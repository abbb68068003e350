//! `stepwise query`: filter recorded context across sessions.

use chrono::{DateTime, NaiveDateTime, Utc};
use stepwise_context::render_query;
use stepwise_core::context::{ContextQuery, SessionId};

use super::{CommandResult, load_config, open_store, parse_entry_type};

pub struct QueryArgs {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub entry_type: Option<String>,
    pub session: Option<String>,
    pub limit: Option<usize>,
}

pub async fn run(args: QueryArgs) -> CommandResult {
    let query = ContextQuery {
        session_id: args.session.as_deref().map(SessionId::from),
        entry_type: parse_entry_type(args.entry_type.as_deref())?,
        start_time: args.start_time.as_deref().map(parse_time).transpose()?,
        end_time: args.end_time.as_deref().map(parse_time).transpose()?,
        limit: args.limit,
    };

    let config = load_config()?;
    let store = open_store(&config).await?;
    let entries = store.query(query).await?;

    println!("🔍 Querying context:");
    print!("{}", render_query(&entries));

    Ok(())
}

/// Accept RFC 3339, or a zone-less ISO-8601 date-time (read as UTC), or a bare date.
fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
    }
    Err(format!("Invalid timestamp '{value}', expected ISO-8601"))
}
