use canopy::{Capabilities, HealthCheck, HierarchicalIndex, IndexConfig, RetrievalMethod};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Offline end-to-end: chunk -> embed -> cluster/summarize -> query.
    //
    // Run with `RUST_LOG=canopy=debug` to see the per-level build log.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let documents = [
        "Refinery output rose 8% in the third quarter. Crude prices stayed above $80. \
         Drilling revenue climbed as new wells came online.",
        "The bank grew its loan book by 5%. Deposit margins widened. \
         Lending fees lifted net interest income to a record.",
        "Chip shipments doubled year over year. Semiconductor demand from data centers \
         drove software and hardware sales.",
        "Oil majors raised dividends after strong crude margins. Refining capacity \
         utilization reached 94%.",
        "Regional lenders tightened credit standards. Loan loss provisions rose modestly.",
        "Processor makers announced new fabs. Chip supply constraints eased in the quarter.",
    ];

    let config = IndexConfig::default()
        .with_chunking(24, 4)
        .with_embedding_dimension(128);
    let mut index = HierarchicalIndex::new(config, Capabilities::local(128))?;
    index.add_documents(documents)?;

    if let Some(stats) = index.statistics() {
        println!(
            "nodes={} leaves={} roots={} depth={}",
            stats.total_nodes, stats.leaf_nodes, stats.root_nodes, stats.tree_depth
        );
        for (level, count) in &stats.levels {
            println!("  level {level}: {count} nodes");
        }
    }
    if let Some(tree) = index.tree() {
        println!("{}", tree.health_check());
    }

    let question = "What happened to crude oil margins?";
    for method in [RetrievalMethod::TreeTraversal, RetrievalMethod::CollapsedTree] {
        let response = index.query(question, Some(method), Some(4))?;
        println!("\n[{method}] {}", response.answer.answer);
        for node in &response.retrieved_nodes {
            println!("  {:<22} level={} score={:.3}", node.node_id, node.level, node.score);
        }
    }

    Ok(())
}
