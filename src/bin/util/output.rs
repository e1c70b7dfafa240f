use audiosearch::{Collection, IndexReport, SearchResponse};
use colored::Colorize;
use std::path::Path;

pub fn print_index_report(report: &IndexReport, collection: Collection, pretty: bool) -> anyhow::Result<()> {
    if !pretty {
        let json_output = serde_json::json!({
            "collection": collection,
            "total": report.total,
            "new": report.new,
            "indexed": report.indexed,
            "failures": report.failures,
        });
        println!("{}", serde_json::to_string_pretty(&json_output)?);
        return Ok(());
    }

    println!(
        "{} {} candidate(s), {} new, {} indexed into '{}'",
        "Indexing completed!".green().bold(),
        report.total,
        report.new,
        report.indexed,
        collection
    );
    if !report.failures.is_empty() {
        println!("{}", "Failed files:".red().bold());
        for failure in &report.failures {
            println!(
                " {} {} [{:?}] {}",
                "✗".red(),
                failure.path,
                failure.stage,
                failure.error.dimmed()
            );
        }
    }
    Ok(())
}

pub fn print_search_response(response: &SearchResponse, pretty: bool) -> anyhow::Result<()> {
    if !pretty {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    println!("Searching for: \"{}\"", response.query.bold());
    if response.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} results:", response.total);
    println!();
    for (i, result) in response.results.iter().enumerate() {
        println!(
            "Result {} - {} {}",
            i + 1,
            result.file_name.cyan().bold(),
            format!("(distance {:.4})", result.distance).dimmed()
        );
        println!("   Path: {}", result.file_path);
        println!("   Duration: {:.3}s", result.duration_seconds);
        println!();
    }
    Ok(())
}

pub fn print_stats(db_path: &Path, stats: &[(Collection, usize)], pretty: bool) -> anyhow::Result<()> {
    if !pretty {
        let collections: serde_json::Map<String, serde_json::Value> = stats
            .iter()
            .map(|(collection, count)| (collection.to_string(), serde_json::json!(count)))
            .collect();
        let json_output = serde_json::json!({
            "database": db_path.display().to_string(),
            "collections": collections,
        });
        println!("{}", serde_json::to_string_pretty(&json_output)?);
        return Ok(());
    }

    println!("Database: {}", db_path.display().to_string().bold());
    for (collection, count) in stats {
        println!("   {:<14} {}", collection.to_string(), count.to_string().green());
    }
    Ok(())
}
