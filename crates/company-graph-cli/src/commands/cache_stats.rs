use anyhow::Result;

use crate::context::AppContext;

pub fn run(ctx: &AppContext, clear_namespace: Option<&str>) -> Result<()> {
    if let Some(namespace) = clear_namespace {
        let removed = ctx.cache.clear_namespace(namespace)?;
        println!("cleared {removed} entries from namespace {namespace}");
    }

    let stats = ctx.cache.stats()?;
    println!("cache: {}", stats.cache_dir.display());
    println!("total entries: {}", stats.total);
    println!("size: {:.2} MB", stats.size_bytes as f64 / (1024.0 * 1024.0));
    for (namespace, count) in &stats.by_namespace {
        println!("  {namespace}: {count}");
    }
    Ok(())
}
