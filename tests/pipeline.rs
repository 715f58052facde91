use std::fs;

use serde_json::json;

use period_corpus::{
    cluster::results::write_groups,
    source::{load_dir, FieldSelector},
    AnalysisConfig, AnalysisError, AnalysisSession, AuthorCluster, AuthorKey, ClusterCount,
    FrequencyRecord, HierarchicalOutcome, KMeansConfig, LinkageMethod, ModelScope, NGram,
    PeriodIndex, PeriodMap, ScoreSource, StopWords, TsneConfig,
};

fn keys(k: &[&str]) -> Vec<NGram> {
    NGram::parse_list(k).unwrap()
}

/// Two volumes: sea writers and garden writers in 1800-1849, one late text in 1850-1899.
fn write_volumes(dir: &std::path::Path) {
    let mut sea = serde_json::Map::new();
    let mut garden = serde_json::Map::new();
    for i in 0..6 {
        sea.insert(
            i.to_string(),
            json!({
                "Author": format!("Sailor {i}"),
                "Year Published": 1800 + i,
                "Text": format!("whale sea the ship whale sea storm{i}")
            }),
        );
        garden.insert(
            i.to_string(),
            json!({
                "Author": format!("Gardener {i}"),
                "Year Published": format!("{}", 1810 + i),
                "Text": ["rose", "the", "garden", "rose", "soil", format!("bloom{i}").as_str()]
            }),
        );
    }
    sea.insert(
        "late".to_string(),
        json!({"Author": "Sailor 0", "Year Published": 1860, "Text": "whale oil lamp"}),
    );
    sea.insert("bad".to_string(), json!({"Author": "Nobody", "Text": "no year"}));
    fs::write(dir.join("sea.json"), serde_json::Value::Object(sea).to_string()).unwrap();
    fs::write(dir.join("garden.json"), serde_json::Value::Object(garden).to_string()).unwrap();
    fs::write(dir.join(".DS_Store"), "junk").unwrap();
}

fn session(scope: ModelScope) -> (tempfile::TempDir, AnalysisSession) {
    let dir = tempfile::tempdir().unwrap();
    write_volumes(dir.path());
    let docs = load_dir(dir.path(), &FieldSelector::default()).unwrap();
    assert_eq!(docs.len(), 13);
    let config = AnalysisConfig::default()
        .with_stop_words(StopWords::new(["the"]))
        .with_author_scope(scope);
    let mut s = AnalysisSession::new(PeriodIndex::new(vec![1800, 1850, 1900]).unwrap(), config);
    let report = s.ingest(docs);
    assert_eq!(report.accepted, 13);
    (dir, s)
}

fn fast_projection() -> TsneConfig {
    TsneConfig {
        iterations: 100,
        exaggeration_iters: 50,
        ..TsneConfig::default()
    }
}

#[test]
fn frequency_statistics_and_snapshot() {
    let (dir, mut s) = session(ModelScope::Documents);
    let g = s.global_frequency(&keys(&["whale", "rose"])).unwrap();
    // 6 sea docs x 6 kept tokens + 6 garden docs x 5 kept tokens
    let early = &g[&1800];
    assert_eq!(early.doc_count, 12);
    assert!((early.get(&"whale".parse().unwrap()).unwrap() - 12.0 / 66.0).abs() < 1e-12);
    assert!((early.total - 24.0 / 66.0).abs() < 1e-12);
    let late = &g[&1850];
    assert!((late.get(&"whale".parse().unwrap()).unwrap() - 1.0 / 3.0).abs() < 1e-12);

    let var = s.variance(&keys(&["whale"])).unwrap();
    // every containing doc has 2 whales, average over all 12 docs is 1
    assert!((var[&1800].total - 1.0).abs() < 1e-12);

    for name in ["freq.json", "freq.cbor"] {
        let path = dir.path().join("out").join(name);
        s.frequency(1).unwrap().save(&path).unwrap();
        let record = FrequencyRecord::load(&path).unwrap();
        assert_eq!(&record, s.frequency(1).unwrap());

        let mut resumed = AnalysisSession::resume(record, AnalysisConfig::default());
        assert_eq!(resumed.global_frequency(&keys(&["whale", "rose"])).unwrap(), g);
        assert!(matches!(
            resumed.global_frequency(&keys(&["whale sea"])),
            Err(AnalysisError::ArityMismatch { .. })
        ));
    }

    let raw = fs::read_to_string(dir.path().join("out/freq.json")).unwrap();
    for field in ["__N__", "NUM_DOCS", "TOTAL_WORDS", "FDIST"] {
        assert!(raw.contains(field), "missing {field}");
    }
}

#[test]
fn silent_authors_are_omitted_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    write_volumes(dir.path());
    let quiet = json!({
        "0": {"Author": "Quiet Poet", "Year Published": 1820, "Text": ["the", "the"]},
        "1": {"Author": "Empty Poet", "Year Published": 1821, "Text": []}
    });
    fs::write(dir.path().join("quiet.json"), quiet.to_string()).unwrap();
    let docs = load_dir(dir.path(), &FieldSelector::default()).unwrap();

    for scope in [ModelScope::Documents, ModelScope::Authors] {
        let config = AnalysisConfig::default()
            .with_stop_words(StopWords::new(["the"]))
            .with_author_scope(scope);
        let mut s = AnalysisSession::new(PeriodIndex::new(vec![1800, 1850, 1900]).unwrap(), config);
        s.ingest(docs.clone());

        let mut expected: Vec<AuthorKey> = s
            .documents()
            .iter()
            .filter(|d| d.year < 1850)
            .map(|d| d.author_key())
            .collect();
        expected.sort();
        expected.dedup();
        assert_eq!(expected.len(), 14);

        let matrices = s.score_matrices(&keys(&["whale", "rose"])).unwrap();
        let active = matrices[&1800].partition();
        assert!(active.omitted.contains(&AuthorKey::normalize("Quiet Poet")));
        assert!(active.omitted.contains(&AuthorKey::normalize("Empty Poet")));
        assert!(active.authors.iter().all(|a| !active.omitted.contains(a)));
        let mut seen: Vec<AuthorKey> = active.authors.iter().chain(&active.omitted).cloned().collect();
        seen.sort();
        assert_eq!(seen, expected);
    }
}

#[test]
fn keyword_documents_per_period() {
    let (_dir, mut s) = session(ModelScope::Documents);
    let hits = s.top_n_for_keyword(&"storm3".parse().unwrap(), 5).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[&1800].list[0].key, "sea.json[3]");
    assert_eq!(hits[&1800].num_docs, 1);
    assert!(hits[&1850].is_empty());

    let ranked = s.top_n_for_keyword(&"rose".parse().unwrap(), 3).unwrap();
    assert_eq!(ranked[&1800].len(), 3);
    // identical weights: ties resolved by ascending id
    let ids: Vec<&str> = ranked[&1800].list.iter().map(|h| h.key.as_str()).collect();
    assert_eq!(ids, vec!["garden.json[0]", "garden.json[1]", "garden.json[2]"]);
}

#[test]
fn authors_cluster_into_their_volumes() {
    for scope in [ModelScope::Documents, ModelScope::Authors] {
        let (dir, mut s) = session(scope);
        let matrices = s.score_matrices(&keys(&["whale", "sea", "rose", "garden", "lamp"])).unwrap();
        let matrix = &matrices[&1800];
        assert_eq!(matrix.rows().len(), 12);

        let active = matrix.partition().with_projection(fast_projection());
        assert_eq!(active.len() + active.omitted.len(), 12);

        let mut engine = AuthorCluster::new(&active);
        let result = engine
            .kmeans(ClusterCount::Fixed(2), &KMeansConfig::default())
            .unwrap();
        assert_eq!(result.labels.len(), result.authors.len());
        assert_eq!(result.embedding.len(), result.authors.len());
        for (author, label) in result.authors.iter().zip(&result.labels) {
            let expected = if author.as_str().starts_with("gardener") { 0 } else { 1 };
            assert_eq!(*label, expected, "{author}");
        }

        let auto = engine.kmeans(ClusterCount::Auto, &KMeansConfig::default()).unwrap();
        assert!(auto.cluster_count() >= 1 && auto.cluster_count() <= 3);

        let path = dir.path().join("groups.txt");
        let mut all = PeriodMap::new();
        all.insert(1800, result);
        write_groups(&all, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Year Period beginning: 1800"));
        assert!(text.contains("\t\tsailor_0"));
    }
}

#[test]
fn single_document_period_has_no_active_authors() {
    let (_dir, mut s) = session(ModelScope::Documents);
    let matrices = s.score_matrices(&keys(&["whale", "lamp"])).unwrap();
    // one document: every idf is ln(1) = 0
    let active = matrices[&1850].partition().with_projection(fast_projection());
    assert!(active.is_empty());
    assert_eq!(active.omitted, vec![AuthorKey::normalize("Sailor 0")]);
    let mut engine = AuthorCluster::new(&active);
    assert!(matches!(
        engine.kmeans(ClusterCount::Auto, &KMeansConfig::default()),
        Err(AnalysisError::ClusteringUnavailable { rows: 0 })
    ));
}

#[test]
fn recluster_from_snapshot() {
    let (dir, mut s) = session(ModelScope::Documents);
    let matrices = s.score_matrices(&keys(&["whale", "rose"])).unwrap();
    let path = dir.path().join("scores.cbor");
    matrices[&1800].save(&path).unwrap();

    let matrix = ScoreSource::FromPersistedSnapshot(path).resolve().unwrap();
    assert_eq!(&matrix, &matrices[&1800]);

    let active = matrix.partition().with_projection(fast_projection());
    let mut engine = AuthorCluster::new(&active);
    let outcome = engine.hierarchical(LinkageMethod::Average, None).unwrap();
    let HierarchicalOutcome::Uncut(linkage) = outcome else {
        panic!("expected an uncut linkage");
    };
    assert_eq!(linkage.steps.len(), active.len() - 1);

    let top = linkage.steps.last().unwrap().distance;
    let labeled = engine.cut(top / 2.0).unwrap();
    assert_eq!(labeled.cluster_count(), 2);
    assert_eq!(labeled.labels[0], 0);
}
