//! End-to-end pipeline behaviour over the bundled terminology.

use std::fs;
use std::sync::Arc;

use lekton::config::{ProcessorConfig, ValidatorConfig};
use lekton::export::GraphSnapshot;
use lekton::graph::KnowledgeGraph;
use lekton::pipeline::{DocumentInput, Processor};
use lekton::terminology::TerminologyIndex;
use lekton::validate::{RejectReason, ValidationMode};

const LECTURE: &str = "Нейро-сталкинг включает поле внимания и наблюдающее сознание. \
    Метанаблюдение это практика для поля внимания. \
    Практикуй остановку внутреннего диалога 5 минут ежедневно.";

const TRIAD: &str = "Наблюдение мыслей открывает осознавание происходящего. \
    Осознавание углубляется в метанаблюдение процесса. \
    Метанаблюдение завершается трансформацией восприятия.";

const OFF_TOPIC: &str = "Сегодня хорошая погода на улице и все гуляют в парке.";

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

fn processor(mode: ValidationMode) -> Processor {
    init_tracing();
    let index = Arc::new(TerminologyIndex::bundled().unwrap());
    let config = ProcessorConfig {
        validator: ValidatorConfig {
            mode,
            ..ValidatorConfig::default()
        },
        ..ProcessorConfig::default()
    };
    Processor::new(index, config).unwrap()
}

#[test]
fn rejected_document_contributes_nothing() {
    let processor = processor(ValidationMode::Smart);
    let report = processor
        .process(&DocumentInput::new("off-topic", OFF_TOPIC))
        .unwrap();
    assert!(!report.validation.accepted);
    assert!(matches!(
        report.validation.reason,
        Some(RejectReason::InsufficientDensity { .. })
    ));
    assert!(report.patterns.is_empty());
    assert!(report.chains.is_empty());
    assert!(report.hierarchy.is_none());
    assert!(report.merge.is_none());
    assert_eq!(processor.with_graph(|g| g.node_count()), 0);
}

#[test]
fn low_density_is_rejected_under_every_mode() {
    for mode in [
        ValidationMode::Smart,
        ValidationMode::Off,
        ValidationMode::Soft,
        ValidationMode::Strict,
    ] {
        let report = processor(mode)
            .process(&DocumentInput::new("off-topic", OFF_TOPIC))
            .unwrap();
        assert!(!report.validation.accepted, "mode {mode}");
        assert!(
            matches!(
                report.validation.reason,
                Some(RejectReason::InsufficientDensity { .. })
            ),
            "mode {mode}: {:?}",
            report.validation.reason
        );
        assert!(report.merge.is_none());
    }
}

#[test]
fn lecture_builds_hierarchy_and_graph() {
    let processor = processor(ValidationMode::Smart);
    let report = processor
        .process(&DocumentInput::new("lecture-001", LECTURE).with_span(0.0, 90.0))
        .unwrap();
    assert!(report.validation.accepted);
    assert_eq!(report.span.map(|s| s.end_secs), Some(90.0));

    let hierarchy = report.hierarchy.expect("hierarchy");
    assert_eq!(hierarchy.root.name, "нейро-сталкинг");
    assert!(!hierarchy.domains.is_empty());
    assert!(!hierarchy.practices.is_empty());

    let merge = report.merge.expect("merge report");
    assert!(merge.nodes_added > 0);
    assert!(merge.edges_added > 0);
    assert_eq!(merge.conflicts, 0);

    processor.with_graph(|graph| {
        assert!(graph.contains("нейро-сталкинг"));
        assert!(graph.contains("поле внимания"));
        let practices = graph.find_practices_for_concept("поле внимания");
        assert!(practices.iter().any(|p| p.practice == "метанаблюдение"));
    });
}

#[test]
fn chain_stages_are_walkable_after_merge() {
    let processor = processor(ValidationMode::Smart);
    let report = processor
        .process(&DocumentInput::new("lecture-002", TRIAD))
        .unwrap();
    assert!(report.validation.accepted);
    let chain = report
        .chains
        .iter()
        .find(|c| c.category == "transformation_triad")
        .expect("triad chain");
    assert!(chain.stages.len() >= 2);
    assert!(chain.confidence >= 0.5);

    let first = chain.stages[0].name.clone();
    let last = chain.stages[chain.stages.len() - 1].name.clone();
    processor.with_graph(|graph| {
        let path = graph.shortest_path(&first, &last).expect("stage path");
        assert!(!path.is_empty());
    });
}

#[test]
fn reprocessing_the_same_document_changes_nothing() {
    let processor = processor(ValidationMode::Smart);
    let doc = DocumentInput::new("lecture-001", LECTURE);
    processor.process(&doc).unwrap();
    let nodes = processor.with_graph(|g| g.node_count());
    let edges = processor.with_graph(|g| g.edge_count());

    let second = processor.process(&doc).unwrap();
    let merge = second.merge.expect("merge report");
    assert_eq!(merge.nodes_added, 0);
    assert_eq!(merge.edges_added, 0);
    assert_eq!(processor.with_graph(|g| g.node_count()), nodes);
    assert_eq!(processor.with_graph(|g| g.edge_count()), edges);
    let snapshot = processor.snapshot();
    assert!(snapshot.edges.iter().all(|e| e.edge.weight == 1));
}

#[test]
fn a_second_source_reinforces_edges() {
    let processor = processor(ValidationMode::Smart);
    processor
        .process(&DocumentInput::new("lecture-001", LECTURE))
        .unwrap();
    processor
        .process(&DocumentInput::new("lecture-001b", LECTURE))
        .unwrap();
    let snapshot = processor.snapshot();
    assert!(snapshot.edges.iter().all(|e| e.edge.weight == 2));
    assert!(snapshot.nodes.iter().all(|n| n.sources.len() == 2));
}

#[test]
fn strict_mode_rejects_forbidden_vocabulary() {
    let text =
        "Осознавание растворяет эго. Разотождествление и метанаблюдение углубляют присутствие.";
    let strict = processor(ValidationMode::Strict);
    let report = strict.process(&DocumentInput::new("doc", text)).unwrap();
    assert!(!report.validation.accepted);
    assert!(matches!(
        report.validation.reason,
        Some(RejectReason::ForbiddenTerm { .. })
    ));
    assert_eq!(strict.with_graph(|g| g.node_count()), 0);

    // the same fragment passes under smart, with the hit reported
    let smart = processor(ValidationMode::Smart);
    let report = smart.process(&DocumentInput::new("doc", text)).unwrap();
    assert!(report.validation.accepted);
    assert_eq!(report.validation.forbidden_hits, vec!["эго".to_string()]);
}

#[test]
fn modes_agree_on_an_explanatory_forbidden_occurrence() {
    // half the significant tokens are domain terms; "эго" sits between them
    let text = "Осознавание растворяет эго, разотождествление углубляет присутствие.";
    for mode in [
        ValidationMode::Smart,
        ValidationMode::Off,
        ValidationMode::Soft,
    ] {
        let report = processor(mode)
            .process(&DocumentInput::new("doc", text))
            .unwrap();
        assert!(report.validation.accepted, "mode {mode}: {:?}", report.validation.reason);
    }
    let report = processor(ValidationMode::Strict)
        .process(&DocumentInput::new("doc", text))
        .unwrap();
    assert!(!report.validation.accepted);
}

#[test]
fn dense_lecture_passes_strict_with_patterns_and_chains() {
    let processor = processor(ValidationMode::Strict);
    let report = processor
        .process(&DocumentInput::new("lecture-002", TRIAD))
        .unwrap();
    assert!(report.validation.accepted, "reason: {:?}", report.validation.reason);
    assert!(report.validation.density > 0.25);

    let pattern = report
        .patterns
        .iter()
        .find(|p| p.category == "transformation_triad")
        .expect("triad pattern");
    assert!(pattern.confidence >= 0.5);
    assert!(report.chains.iter().any(|c| c.stages.len() >= 2));
}

#[test]
fn snapshot_survives_a_disk_round_trip() {
    let processor = processor(ValidationMode::Smart);
    processor
        .process(&DocumentInput::new("lecture-001", LECTURE))
        .unwrap();
    let snapshot = processor.snapshot();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.json");
    fs::write(&path, snapshot.to_json().unwrap()).unwrap();

    let loaded = GraphSnapshot::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
    let restored = KnowledgeGraph::from_snapshot(&loaded).unwrap();
    assert_eq!(restored.node_count(), snapshot.stats.nodes);
    assert_eq!(restored.edge_count(), snapshot.stats.edges);
    let practices = restored.find_practices_for_concept("поле внимания");
    assert!(practices.iter().any(|p| p.practice == "метанаблюдение"));
}

#[test]
fn batches_process_in_parallel_and_merge_once_each() {
    let processor = processor(ValidationMode::Smart);
    let documents = vec![
        DocumentInput::new("lecture-001", LECTURE),
        DocumentInput::new("off-topic", OFF_TOPIC),
        DocumentInput::new("lecture-002", TRIAD),
    ];
    let reports = processor.process_all(&documents);
    assert_eq!(reports.len(), 3);
    let by_id = |id: &str| {
        reports
            .iter()
            .map(|r| r.as_ref().unwrap())
            .find(|r| r.document_id == id)
            .unwrap()
            .clone()
    };
    assert!(by_id("lecture-001").merge.is_some());
    assert!(by_id("off-topic").merge.is_none());
    assert!(by_id("lecture-002").validation.accepted);
    processor.with_graph(|graph| {
        assert!(graph.contains("нейро-сталкинг"));
        assert_eq!(graph.conflicts().len(), 0);
    });
}
