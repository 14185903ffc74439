use canopy::hierarchy::Chunk;
use canopy::{Capabilities, ClusteringConfig, HierarchicalIndex, IndexConfig, TreeConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Chunks tagged with sector/company/year are grouped by those keys before
    // any embedding clustering, so each summary stays within one filing.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let filings = [
        ("Energy", "Northwind Oil", 2023, "Production rose on new offshore wells."),
        ("Energy", "Northwind Oil", 2023, "Refining margins held near record levels."),
        ("Energy", "Northwind Oil", 2023, "Capital spending was cut by a tenth."),
        ("Financials", "Harbor Bank", 2023, "Net interest income grew with higher rates."),
        ("Financials", "Harbor Bank", 2023, "Credit losses stayed below guidance."),
        ("Financials", "Harbor Bank", 2022, "Deposits declined as customers sought yield."),
        ("Technology", "Vertex Chips", 2023, "Data center revenue doubled."),
        ("Technology", "Vertex Chips", 2023, "Gross margin expanded on premium parts."),
    ];

    let chunks: Vec<Chunk> = filings
        .iter()
        .map(|&(sector, company, year, text)| {
            Chunk::new(text)
                .with_metadata("sector", sector)
                .with_metadata("company", company)
                .with_metadata("year", i64::from(year))
        })
        .collect();

    let clustering = ClusteringConfig::default()
        .with_min_cluster_size(2)
        .with_metadata_keys(["sector", "company", "year"]);
    let config = IndexConfig::default()
        .with_embedding_dimension(64)
        .with_tree(TreeConfig::default().with_clustering(clustering));

    let mut index = HierarchicalIndex::new(config, Capabilities::local(64))?;
    index.add_chunks(chunks)?;

    let tree = index.tree().ok_or("no tree built")?;
    for parent in tree.nodes_at_level(1) {
        println!("{} ({} children)", parent.id, parent.children.len());
        for (key, value) in &parent.metadata {
            println!("  {key} = {value:?}");
        }
        println!("  summary: {}", parent.text);
    }

    let response = index.query("How did Harbor Bank's credit losses compare to guidance?", None, Some(3))?;
    println!("\n{}", response.answer.answer);

    Ok(())
}
