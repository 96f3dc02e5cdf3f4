use proptest::prelude::*;

use vaultlink_core::engine::add::{self, AddOptions};
use vaultlink_core::engine::build::{self, BuildOptions};
use vaultlink_core::engine::disambiguate::{self, DisambiguateOptions};
use vaultlink_core::error::{IntegrityError, PreconditionError, VaultError};
use vaultlink_core::progress::NoopReporter;
use vaultlink_core::query;
use vaultlink_core::store::GraphRead;
use vaultlink_core::types::IndexStats;
use vaultlink_test::TestVault;

fn counts(stats: &IndexStats) -> (u64, u64, u64, u64, u64) {
    (stats.notes, stats.phantoms, stats.tags, stats.assets, stats.edges)
}

#[test]
fn build_counts_every_node_kind() {
    let tv = TestVault::with_files(&[
        (
            "Home.md",
            "---\ntags:\n  - index\n---\n# Home\n[[Projects/Plan]] [[Someday]] #inbox\n![[img/map.png]]\n",
        ),
        ("Projects/Plan.md", "Back to [[Home]]. #inbox #project/alpha\n```\n[[NotALink]]\n```\n"),
        ("img/map.png", "png"),
        (".obsidian/workspace.md", "[[Ignored]]\n"),
    ]);
    let (_vault, store) = tv.build();

    let stats = query::stats(&store).unwrap();
    assert_eq!(counts(&stats), (2, 1, 3, 1, 8));
    assert!(stats.built_at.is_some());
    assert!(store.note_by_path(".obsidian/workspace.md").unwrap().is_none());
    assert!(store.node_by_key("phantom:name:notalink").unwrap().is_none());
}

#[test]
fn incremental_add_matches_full_rebuild() {
    let tv = TestVault::with_files(&[
        ("B.md", "[[A]] #t [[Later]]\n"),
        ("sub/C.md", "[[B]]\n"),
    ]);
    let (vault, mut store) = tv.build();

    tv.write("A.md", "[[B]] [[sub/C]]\n");
    add::run(&vault, &mut store, &["A.md".into()], AddOptions::default()).unwrap();
    let incremental = store.stats().unwrap();

    let (_vault, rebuilt) = tv.build();
    assert_eq!(counts(&incremental), counts(&rebuilt.stats().unwrap()));
}

#[test]
fn scan_only_disambiguation_leaves_index_untouched() {
    let tv = TestVault::with_files(&[("sub/A.md", ""), ("B.md", "[[A]]\n")]);
    let (vault, store) = tv.build();
    let before = query::backlinks(&store, "sub/A.md").unwrap();

    let outcome = disambiguate::run_scan_only(&vault, "A", &DisambiguateOptions::default()).unwrap();

    assert_eq!(outcome.rewritten.len(), 1);
    assert_eq!(tv.read("B.md"), "[[sub/A]]\n");
    assert_eq!(query::backlinks(&store, "sub/A.md").unwrap(), before);
    assert_eq!(before[0].raw_link, "[[A]]");
}

#[test]
fn operations_without_index_report_index_not_found() {
    let tv = TestVault::with_files(&[("A.md", "")]);
    let vault = tv.vault();

    let err = vault.open_index().unwrap_err();
    assert!(matches!(err, VaultError::Precondition(PreconditionError::IndexNotFound(_))));
}

#[test]
fn config_excludes_and_strict_mode_apply() {
    let tv = TestVault::with_files(&[
        (".vaultlink/config.toml", "[build]\nexclude_patterns = [\"drafts/**\"]\nstrict = true\n"),
        ("A.md", "[[B]] [[N]]\n"),
        ("drafts/B.md", ""),
        ("x/N.md", ""),
        ("y/N.md", ""),
    ]);
    let vault = tv.vault();
    let mut store = vault.create_index().unwrap();
    let strict = BuildOptions {
        strict: vault.config().build.strict,
    };

    let err = build::run(&vault, &mut store, strict, &NoopReporter).unwrap_err();
    assert!(matches!(err, VaultError::Integrity(IntegrityError::AmbiguousLink { .. })));

    let report = build::run(&vault, &mut store, BuildOptions::default(), &NoopReporter).unwrap();
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.stats.notes, 3);
    assert_eq!(report.stats.phantoms, 1, "excluded document is not a link target");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn root_priority_holds_for_any_subdirectory(dir in "[a-z]{1,8}") {
        let nested = format!("{dir}/Topic.md");
        let tv = TestVault::with_files(&[
            ("Topic.md", ""),
            (nested.as_str(), ""),
            ("Index.md", "[[Topic]]\n"),
        ]);
        let (_vault, store) = tv.build();

        let root = store.note_by_path("Topic.md").unwrap().unwrap();
        let links = query::backlinks(&store, "Topic.md").unwrap();
        prop_assert_eq!(links.len(), 1);
        prop_assert_eq!(store.incoming_edges(root.id).unwrap().len(), 1);
    }
}
