use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use company_graph_neo4j::bootstrap::{
    load_domains, load_technologies, read_jsonl, DomainRecord, TechnologyMapping,
};
use company_graph_neo4j::constraints::ensure_constraints;

use crate::context::AppContext;
use crate::CommonArgs;

pub async fn run(
    ctx: &AppContext,
    common: &CommonArgs,
    domains_file: Option<PathBuf>,
    technologies_file: Option<PathBuf>,
) -> Result<()> {
    let domains: Option<Vec<DomainRecord>> = match domains_file {
        Some(path) => {
            let mut records = read_jsonl(&path)?;
            if let Some(limit) = common.limit {
                records.truncate(limit);
            }
            Some(records)
        }
        None => None,
    };
    let technologies: Option<Vec<TechnologyMapping>> = match technologies_file {
        Some(path) => {
            let mut mappings = read_jsonl(&path)?;
            if let Some(limit) = common.limit {
                mappings.truncate(limit);
            }
            Some(mappings)
        }
        None => None,
    };

    if !common.execute {
        info!(
            domains = domains.as_ref().map_or(0, Vec::len),
            technology_mappings = technologies.as_ref().map_or(0, Vec::len),
            "[dry run] would ensure constraints and load the domain-status layer; \
             pass --execute to apply"
        );
        return Ok(());
    }

    let client = ctx.graph().await?;
    ensure_constraints(&client).await?;

    if let Some(records) = domains {
        load_domains(&client, &records).await?;
    }
    if let Some(mappings) = technologies {
        load_technologies(&client, &mappings).await?;
    }

    Ok(())
}
