//! Reading tree files and writing distance matrices.
//!
//! Two input formats are supported:
//! - plain Newick files holding one or more `;`-terminated trees,
//!   optionally gzip-compressed (`.gz`),
//! - NEXUS files with a `TREES` block, as written by BEAST or MrBayes.
//!   Bracketed annotations such as `[&R]` or `:[&rate=0.1]2.45` are comments
//!   to the Newick parser and are skipped.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, warn};

use crate::error::RfError;
use crate::newick::{parse_newick, read_label, split_trees};
use crate::normalize::LeafIndex;
use crate::tree::Tree;

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// File name without directory and without `.gz`, `.trees`, `.nwk`,
/// `.newick`, `.tre` or `.nex` suffixes.
fn base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    let name = name.trim_end_matches(".gz");
    [".trees", ".nwk", ".newick", ".tre", ".nex", ".nexus"]
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name)
        .to_string()
}

fn read_text(path: &Path) -> Result<String, RfError> {
    if is_gz(path) {
        let mut content = String::new();
        GzDecoder::new(File::open(path)?).read_to_string(&mut content)?;
        Ok(content)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// Read every tree of a Newick file.
///
/// Trees are named `<base name>_tree<index>` with a zero-based index.
///
/// # Errors
/// - `Io` if the file cannot be read or decompressed
/// - the parse error of the first malformed tree
pub fn read_newick_trees<P: AsRef<Path>>(path: P) -> Result<Vec<(String, Tree)>, RfError> {
    let path = path.as_ref();
    let content = read_text(path)?;
    let base = base_name(path);

    let trees = split_trees(&content)?
        .into_iter()
        .enumerate()
        .map(|(idx, newick)| {
            let tree = parse_newick(newick).inspect_err(|e| {
                warn!(file = %path.display(), tree = idx, error = %e, "failed to parse tree");
            })?;
            Ok((format!("{base}_tree{idx}"), tree))
        })
        .collect::<Result<Vec<_>, RfError>>()?;

    debug!(file = %path.display(), trees = trees.len(), "read newick file");
    Ok(trees)
}

/// Read the trees of a NEXUS `TREES` block.
///
/// # Parameters
/// - `burnin`: number of leading trees to drop
/// - `use_translate`: rename leaves through the `TRANSLATE` table when present
///
/// Trees are named `<base name>_<tree name>`, e.g. `run1_STATE_1000`.
///
/// # Errors
/// - `Io` if the file cannot be read
/// - the parse error of the first malformed tree kept after burn-in
pub fn read_nexus_trees<P: AsRef<Path>>(
    path: P,
    burnin: usize,
    use_translate: bool,
) -> Result<Vec<(String, Tree)>, RfError> {
    let path = path.as_ref();
    let content = read_text(path)?;
    let base = base_name(path);
    let translate = parse_translate_block(&content)?;

    let blocks = collect_tree_blocks(&content);
    let total = blocks.len();
    let trees = blocks
        .into_iter()
        .enumerate()
        .skip(burnin)
        .map(|(idx, block)| {
            let mut tree = parse_newick(&block.body).inspect_err(|e| {
                warn!(file = %path.display(), tree = idx, error = %e, "failed to parse tree");
            })?;
            if use_translate && !translate.is_empty() {
                rename_leaf_nodes(&mut tree, &translate)?;
            }
            Ok((format!("{base}_{}", block.name), tree))
        })
        .collect::<Result<Vec<_>, RfError>>()?;

    debug!(
        file = %path.display(),
        total,
        kept = trees.len(),
        translated = use_translate && !translate.is_empty(),
        "read nexus file"
    );
    Ok(trees)
}

struct TreeBlock<'a> {
    name: &'a str,
    body: String,
}

/// `TREE <name> = <newick>` lines between the first tree line and `END;`.
fn collect_tree_blocks(content: &str) -> Vec<TreeBlock<'_>> {
    content
        .lines()
        .map(str::trim)
        .skip_while(|line| !is_tree_line(line))
        .take_while(|line| !line.to_ascii_uppercase().starts_with("END;"))
        .filter(|line| is_tree_line(line))
        .filter_map(|line| {
            let (header, body) = line.split_once('=')?;
            // Drop the `TREE` keyword and an optional `*` marking the default tree
            let name = header[4..].trim().trim_start_matches('*').trim();
            Some(TreeBlock {
                name,
                body: body.trim().to_string(),
            })
        })
        .collect()
}

fn is_tree_line(line: &str) -> bool {
    line.get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("TREE ") || head.eq_ignore_ascii_case("TREE*"))
}

/// Map of `TRANSLATE` ids to taxon labels.
///
/// ```text
/// Translate
///     1 '1959.M.CD.59.ZR59',
///     2 'Homo sapiens'
/// ;
/// ```
/// Labels are read with the Newick label rules, so quoted labels keep their
/// spaces.
fn parse_translate_block(content: &str) -> Result<HashMap<String, String>, RfError> {
    let mut map = HashMap::new();
    let entries = content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'));
    for line in entries {
        let Some((id, rest)) = line.trim().split_once(char::is_whitespace) else {
            continue;
        };
        if let Some(label) = read_label(rest.trim_start())? {
            map.insert(id.to_string(), label);
        }
    }
    Ok(map)
}

/// Replace leaf labels found in `translate`; other labels are kept.
///
/// # Errors
/// `DuplicateLabel` if two leaves end up with the same label.
pub fn rename_leaf_nodes(tree: &mut Tree, translate: &HashMap<String, String>) -> Result<(), RfError> {
    for leaf_id in tree.get_leaves() {
        let node = tree.get_mut(leaf_id)?;
        if let Some(label) = node.name.as_ref().and_then(|n| translate.get(n)) {
            node.name = Some(label.clone());
        }
    }
    LeafIndex::from_tree(tree)?;
    Ok(())
}

/// Write a labeled square matrix as TSV.
/// If `path` ends with `.gz`, the output is gzip-compressed.
pub fn write_matrix_tsv<P: AsRef<Path>, T: std::fmt::Display>(
    path: P,
    names: &[String],
    mat: &[Vec<T>],
) -> Result<(), RfError> {
    let p = path.as_ref();
    if mat.len() != names.len() {
        return Err(RfError::InvariantViolation(format!(
            "{} names for a matrix with {} rows",
            names.len(),
            mat.len()
        )));
    }

    let mut out: Box<dyn Write> = if is_gz(p) {
        let enc = GzEncoder::new(File::create(p)?, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    write_rows(&mut out, names, mat)?;
    out.flush()?;
    Ok(())
}

fn write_rows<W: Write, T: std::fmt::Display>(out: &mut W, names: &[String], mat: &[Vec<T>]) -> io::Result<()> {
    // Header row
    write!(out, "\t")?;
    for (k, name) in names.iter().enumerate() {
        if k > 0 {
            write!(out, "\t")?;
        }
        write!(out, "{name}")?;
    }
    writeln!(out)?;

    for (name, row) in names.iter().zip(mat) {
        write!(out, "{name}")?;
        for val in row {
            write!(out, "\t{val}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}
