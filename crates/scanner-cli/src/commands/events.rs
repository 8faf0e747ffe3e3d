use super::query_args::{QueryArgs, RankArgs};
use crate::app::AppContext;
use scanner_core::{evaluate, Event, LogBuffer, Query, ResultSet};
use tracing::{debug, info, warn};

/// Write `<label>: <headline>` for each event, oldest first, in one write.
pub fn write_events<'a, I>(buffer: &LogBuffer, label: &str, events: I)
where
    I: DoubleEndedIterator<Item = &'a Event>,
{
    let lines: Vec<String> = events
        .rev()
        .map(|e| format!("{}: {}", label, e.headline()))
        .collect();
    if !lines.is_empty() {
        buffer.write(&lines.join("\n"));
    }
}

/// Stored events, or `None` after warning that there are none.
fn stored_events(ctx: &AppContext) -> anyhow::Result<Option<Vec<Event>>> {
    let events = ctx.store().load()?;
    if events.is_empty() {
        warn!("No events saved, run 'refresh' first");
        return Ok(None);
    }
    Ok(Some(events))
}

pub async fn refresh(ctx: &AppContext) -> anyhow::Result<()> {
    info!("Refreshing events (fetching)...");
    let events = ctx.refresher.refresh().await?;

    if events.is_empty() {
        info!("No new events");
        return Ok(());
    }

    write_events(&ctx.buffer, "REFRESH", events.iter());
    info!("Returned {} events", events.len());
    Ok(())
}

pub fn load(ctx: &AppContext) -> anyhow::Result<()> {
    info!("Loading events (stored)...");
    let Some(events) = stored_events(ctx)? else {
        return Ok(());
    };

    write_events(&ctx.buffer, "LOAD", events.iter());
    info!("Returned {} events", events.len());
    Ok(())
}

pub fn more(ctx: &AppContext, id: Option<&str>) -> anyhow::Result<()> {
    let Some(id) = id else {
        warn!("Please specify event id");
        return Ok(());
    };

    info!("Getting more info about event...");
    let Some(events) = stored_events(ctx)? else {
        return Ok(());
    };

    let event = id
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|id| events.iter().find(|e| e.id() == id));
    let Some(event) = event else {
        warn!("Event {} does not exist", id);
        return Ok(());
    };

    let lines: Vec<String> = event
        .fields()
        .keys()
        .map(|key| format!("{}: {}", key, event.display_field(key)))
        .collect();
    ctx.buffer.write(&lines.join("\n"));
    Ok(())
}

pub fn find(ctx: &AppContext, words: &[String]) -> anyhow::Result<()> {
    if words.is_empty() {
        warn!("Please enter text to find");
        return Ok(());
    }

    let query = Query::new().with_text(words.join(" "));
    debug!("query: {:?}", query);

    info!("Finding events (stored)...");
    let Some(events) = stored_events(ctx)? else {
        return Ok(());
    };

    let result = evaluate(&events, &query)?;
    let hits = result.events().unwrap_or_default();
    write_events(&ctx.buffer, "FIND", hits.iter().map(|s| s.event));
    info!("Returned {} events", hits.len());
    Ok(())
}

pub fn search(ctx: &AppContext, args: &QueryArgs) -> anyhow::Result<()> {
    let query = args.to_query()?;
    debug!("query: {:?}", query);

    info!("Searching in events (stored)...");
    let Some(events) = stored_events(ctx)? else {
        return Ok(());
    };

    let result = evaluate(&events, &query)?;
    let hits = result.events().unwrap_or_default();

    let lines: Vec<String> = hits
        .iter()
        .rev()
        .map(|s| {
            if query.strict {
                format!("SEARCH: {}", s.event.headline())
            } else {
                format!("SEARCH (score={}): {}", s.score, s.event.headline())
            }
        })
        .collect();
    if !lines.is_empty() {
        ctx.buffer.write(&lines.join("\n"));
    }

    info!("Returned {} events", hits.len());
    Ok(())
}

pub fn rank(ctx: &AppContext, args: &RankArgs) -> anyhow::Result<()> {
    let Some(query) = args.to_query()? else {
        warn!("rank requires --group");
        return Ok(());
    };
    debug!("query: {:?}", query);

    info!("Ranking events (stored)...");
    let Some(events) = stored_events(ctx)? else {
        return Ok(());
    };

    let groups = match evaluate(&events, &query)? {
        ResultSet::Groups(groups) => groups,
        ResultSet::Events(_) => Vec::new(),
    };
    if groups.is_empty() {
        info!("No ranking results");
        return Ok(());
    }

    let lines: Vec<String> = groups
        .iter()
        .rev()
        .map(|g| {
            format!(
                "RANK: {} (count={} / avg_score={:.2})",
                g.group, g.count, g.avg_score
            )
        })
        .collect();
    ctx.buffer.write(&lines.join("\n"));
    info!("Returned {} ranked groups", groups.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::handle_line;
    use super::super::test_support::*;

    async fn seeded() -> Harness {
        let h = harness(true);
        h.feed.batches.lock().unwrap().push(sample_events());
        handle_line(&h.ctx, "refresh").await;
        h
    }

    #[tokio::test]
    async fn test_refresh_writes_new_events_oldest_first() {
        let h = seeded().await;
        assert_eq!(
            h.results("REFRESH"),
            vec![
                "REFRESH: 1 - Rån, Solna - Butiksrån i centrum",
                "REFRESH: 2 - Brand, Stockholm - Brand i lägenhet",
                "REFRESH: 3 - Brand, Solna - Bilbrand vid skolan",
            ]
        );

        handle_line(&h.ctx, "refresh").await;
        assert!(h.ctx.buffer.snapshot().contains("No new events"));
        assert_eq!(h.results("REFRESH").len(), 3);
    }

    #[tokio::test]
    async fn test_load_warns_on_empty_store() {
        let h = harness(true);
        handle_line(&h.ctx, "load").await;
        assert!(h.ctx.buffer.snapshot().contains("[-] No events saved"));
    }

    #[tokio::test]
    async fn test_load_lists_stored_events() {
        let h = seeded().await;
        handle_line(&h.ctx, "load").await;
        let loaded = h.results("LOAD");
        assert_eq!(loaded.len(), 3);
        assert!(loaded[0].starts_with("LOAD: 1 - "));
        assert!(loaded[2].starts_with("LOAD: 3 - "));
    }

    #[tokio::test]
    async fn test_more_prints_fields() {
        let h = seeded().await;
        handle_line(&h.ctx, "more 2").await;
        let lines = h.lines();
        assert!(lines.contains(&"name: Brand, Stockholm".to_string()));
        assert!(lines.contains(&r#"location: {"name":"Stockholm"}"#.to_string()));

        handle_line(&h.ctx, "more 99").await;
        assert!(h.ctx.buffer.snapshot().contains("Event 99 does not exist"));
    }

    #[tokio::test]
    async fn test_find_requires_all_words() {
        let h = seeded().await;
        handle_line(&h.ctx, "find brand solna").await;
        assert_eq!(
            h.results("FIND"),
            vec!["FIND: 3 - Brand, Solna - Bilbrand vid skolan"]
        );
    }

    #[tokio::test]
    async fn test_search_non_strict_shows_scores() {
        let h = seeded().await;
        handle_line(&h.ctx, "search --text brand solna --strict false").await;
        let results = h.results("SEARCH");
        // Best match last, next to the prompt.
        assert_eq!(
            results.last().map(String::as_str),
            Some("SEARCH (score=2): 3 - Brand, Solna - Bilbrand vid skolan")
        );
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_search_errors_become_warnings() {
        let h = seeded().await;
        handle_line(&h.ctx, "search --limit ten --text brand").await;
        assert!(h.ctx.buffer.snapshot().contains("[-] Invalid query"));

        handle_line(&h.ctx, "search --filters type").await;
        assert!(h.ctx.buffer.snapshot().contains("field/value pairs"));
    }

    #[tokio::test]
    async fn test_rank_groups() {
        let h = seeded().await;
        handle_line(&h.ctx, "rank --group location.name").await;
        assert_eq!(
            h.results("RANK"),
            vec![
                "RANK: stockholm (count=1 / avg_score=0.00)",
                "RANK: solna (count=2 / avg_score=0.00)",
            ]
        );

        handle_line(&h.ctx, "rank --text brand").await;
        assert!(h.ctx.buffer.snapshot().contains("rank requires --group"));
    }
}
