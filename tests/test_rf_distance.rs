use itertools::Itertools;
use rf_tree_distance::distances::{build_bitset_snapshots, distance_matrix, Metric};
use rf_tree_distance::{
    calculate_rf_distance, parse_newick, read_newick_trees, rf_distance, write_matrix_tsv, Distance,
    NewickParseError, RfError, RfOptions,
};

fn defaults() -> RfOptions {
    RfOptions::default()
}

#[test]
fn two_leaf_trees_in_either_order() {
    assert_eq!(calculate_rf_distance("(A,B);", "(B,A);", &defaults()).unwrap(), Distance::Count(0));
}

#[test]
fn incompatible_quartets() {
    assert_eq!(rf_distance("((A,B),(C,D));", "((A,C),(B,D));").unwrap(), 2);
}

#[test]
fn star_versus_resolved_triple() {
    assert_eq!(rf_distance("(A,B,C);", "((A,B),C);").unwrap(), 0);
    let rooted = defaults().with_rooted(true);
    assert_eq!(calculate_rf_distance("(A,B,C);", "((A,B),C);", &rooted).unwrap(), Distance::Count(1));
}

#[test]
fn taxon_mismatch_reports_both_labels() {
    let err = rf_distance("(A,B);", "(A,C);").unwrap_err();
    assert!(matches!(&err, RfError::LabelMismatch { labels } if labels == &["B", "C"]));
    assert_eq!(
        err.to_string(),
        "Trees do not share the same taxon set; differing labels: {B, C}"
    );
}

#[test]
fn unclosed_parenthesis() {
    assert!(matches!(
        rf_distance("(A,B;", "(A,B);"),
        Err(RfError::Parse(NewickParseError::UnbalancedParentheses { .. }))
    ));
}

// Six taxa, several topologies, each also written rerooted and reordered.
const TOPOLOGIES: [(&str, &str); 4] = [
    ("((A,B),(C,D),(E,F));", "(F,(E,((D,C),(B,A))));"),
    ("(((A,B),C),(D,(E,F)));", "((E,F),D,(C,(A,B)));"),
    ("((A,C),(B,D),(E,F));", "((F,E),((A,C),(D,B)));"),
    ("(A,B,C,(D,E,F));", "((F,E,D),C,B,A);"),
];

#[test]
fn rerooted_and_reordered_copies_are_identical() {
    for (tree, same) in TOPOLOGIES {
        assert_eq!(rf_distance(tree, same).unwrap(), 0, "{tree} vs {same}");
        assert_eq!(rf_distance(tree, tree).unwrap(), 0);
    }
}

#[test]
fn distance_is_symmetric_and_bounded() {
    for pair in TOPOLOGIES.iter().map(|(tree, _)| *tree).combinations(2) {
        let (a, b) = (pair[0], pair[1]);
        let ab = rf_distance(a, b).unwrap();
        assert_eq!(ab, rf_distance(b, a).unwrap());
        // At most 2 * (n - 3) for six taxa
        assert!(ab <= 6);

        let normalized = calculate_rf_distance(a, b, &defaults().with_normalized(true))
            .unwrap()
            .as_f64();
        assert!((0.0..=1.0).contains(&normalized));
    }
}

#[test]
fn unweighted_ignores_branch_lengths() {
    let plain = "((A,B),(C,D),(E,F));";
    let with_lengths = "((A:0.3,B:1.2):0.7,(C:2,D:0.1):5,(E:1e-3,F:4):0.25);";
    assert_eq!(rf_distance(plain, with_lengths).unwrap(), 0);
}

#[test]
fn comments_quotes_and_internal_labels() {
    let a = "[&R] (('taxon one':1,B:2)90:0.5,C,D);";
    let b = "(('taxon one',C),B,D);";
    assert_eq!(rf_distance(a, b).unwrap(), 2);
}

#[test]
fn deep_caterpillar_does_not_overflow() {
    let n = 5_000;
    let mut newick = String::from("t0");
    for i in 1..n {
        newick = format!("({newick},t{i})");
    }
    newick.push(';');
    let reversed = {
        let mut s = format!("t{}", n - 1);
        for i in (0..n - 1).rev() {
            s = format!("({s},t{i})");
        }
        s.push(';');
        s
    };
    assert_eq!(rf_distance(&newick, &newick).unwrap(), 0);
    // Both caterpillars order the same taxa along one path, only from opposite ends
    assert_eq!(rf_distance(&newick, &reversed).unwrap(), 0);
}

#[test]
fn matrix_from_file_round_trip() {
    let dir = std::env::temp_dir();
    let input = dir.join(format!("rf_tree_distance_it_{}.nwk", std::process::id()));
    let output = dir.join(format!("rf_tree_distance_it_{}.tsv", std::process::id()));
    std::fs::write(&input, "((A,B),(C,D),E);\n((A,C),(B,D),E);\n((B,A),(D,C),E);\n").unwrap();

    let named = read_newick_trees(&input).unwrap();
    let (names, trees): (Vec<String>, Vec<_>) = named.into_iter().unzip();
    let (index, snaps) = build_bitset_snapshots(&trees, false).unwrap();
    assert_eq!(index.labels(), &["A", "B", "C", "D", "E"]);

    let mat = distance_matrix(&snaps, Metric::Rf);
    assert_eq!(mat, vec![vec![0.0, 4.0, 0.0], vec![4.0, 0.0, 4.0], vec![0.0, 4.0, 0.0]]);

    write_matrix_tsv(&output, &names, &mat).unwrap();
    let content = std::fs::read_to_string(&output).unwrap();
    std::fs::remove_file(&input).unwrap();
    std::fs::remove_file(&output).unwrap();

    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[2].ends_with("\t4\t0\t4"));
}

#[test]
fn parsed_tree_round_trips_through_display() {
    let tree = parse_newick("((A:1,'b c':2.5)x:0.5,D);").unwrap();
    assert_eq!(tree.to_string(), "((A:1,'b c':2.5)x:0.5,D);");
}
