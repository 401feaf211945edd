//! History command implementation.

use anyhow::{Context, Result};

use dropline_core::history::HistoryStore;

use super::HistoryArgs;

/// Run the history command.
pub async fn run(args: HistoryArgs) -> Result<()> {
    let global_config = super::load_config();
    let store =
        HistoryStore::load(global_config.history.clone()).context("Failed to load history")?;

    if args.clear {
        store.clear().context("Failed to clear history")?;
        if args.json {
            println!("{}", serde_json::json!({ "cleared": true }));
        } else {
            println!("  History cleared.");
        }
        return Ok(());
    }

    let entries = store.list(Some(args.limit));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!();
        println!("  No transfers yet.");
        println!();
        return Ok(());
    }

    println!();
    println!(
        "  {:<5} {:<17} {:<9} {:<28} {:>10}  {:<16} {}",
        "ID", "When", "Direction", "File", "Size", "Peer", "Status"
    );
    println!("  {}", "-".repeat(100));
    for entry in &entries {
        let id = entry
            .id()
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        println!(
            "  {:<5} {:<17} {:<9} {:<28} {:>10}  {:<16} {}",
            id,
            entry.formatted_timestamp(),
            entry.direction().to_string(),
            truncate(entry.file_name(), 28),
            entry.formatted_size(),
            truncate(&entry.peer_label(), 16),
            entry.status()
        );
    }
    println!();
    println!(
        "  Showing {} of {} entries ({})",
        entries.len(),
        store.len(),
        store.path().display()
    );
    println!();

    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short.txt", 28), "short.txt");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("résumé-final.pdf", 9), "résumé...");
    }
}
