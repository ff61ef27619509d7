//! Newick parser.
//!
//! # Grammar
//! ```text
//! tree    := subtree ';'
//! subtree := leaf | '(' subtree (',' subtree)* ')' label?
//! leaf    := label
//! each subtree may be followed by ':' number (branch length)
//! ```
//!
//! Labels are either unquoted (any run of characters other than whitespace
//! and `(),:;[`), single-quoted (`'it''s'`, doubled quote escapes a quote) or
//! double-quoted. Quoted labels keep their interior verbatim. Bracketed
//! comments such as BEAST annotations (`[&rate=0.1]`) may appear anywhere
//! between tokens and are skipped.
//!
//! Parsing uses an explicit stack of open groups rather than recursion, so
//! deeply nested (caterpillar) trees cannot overflow the call stack.

use std::collections::HashSet;
use std::str::FromStr;

use tracing::debug;

use crate::error::{NewickParseError, RfError};
use crate::tree::{Node, NodeId, Tree};

/// Lexical token of a Newick string.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Comma,
    Colon,
    Semicolon,
    Label { text: String, quoted: bool },
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Open => "(".to_string(),
            Token::Close => ")".to_string(),
            Token::Comma => ",".to_string(),
            Token::Colon => ":".to_string(),
            Token::Semicolon => ";".to_string(),
            Token::Label { text, .. } => text.clone(),
        }
    }
}

/// Splits Newick text into tokens, skipping whitespace and comments.
struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), NewickParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('[') => {
                    let start = self.pos;
                    match self.rest().find(']') {
                        Some(end) => self.pos += end + 1,
                        None => return Err(NewickParseError::UnterminatedComment { position: start }),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Returns the next token and the byte offset where it starts.
    fn next_token(&mut self) -> Result<Option<(Token, usize)>, NewickParseError> {
        self.skip_whitespace_and_comments()?;
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            '(' => Token::Open,
            ')' => Token::Close,
            ',' => Token::Comma,
            ':' => Token::Colon,
            ';' => Token::Semicolon,
            '\'' | '"' => return self.quoted_label(c, start).map(|t| Some((t, start))),
            _ => {
                let len = self
                    .rest()
                    .find(|ch: char| ch.is_whitespace() || "(),:;[".contains(ch))
                    .unwrap_or(self.rest().len());
                let text = self.rest()[..len].to_string();
                self.pos += len;
                return Ok(Some((Token::Label { text, quoted: false }, start)));
            }
        };
        self.bump();
        Ok(Some((token, start)))
    }

    fn quoted_label(&mut self, quote: char, start: usize) -> Result<Token, NewickParseError> {
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(NewickParseError::UnterminatedQuote { position: start }),
                Some(c) if c == quote => {
                    // Doubled single quote is an escaped quote inside the label.
                    if quote == '\'' && self.peek() == Some('\'') {
                        self.bump();
                        text.push('\'');
                    } else {
                        return Ok(Token::Label { text, quoted: true });
                    }
                }
                Some(c) => text.push(c),
            }
        }
    }
}

/// What the parser expects next.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Expect {
    /// A subtree: `(` or a leaf label.
    Subtree,
    /// The tail of a finished subtree: label, `:length`, `,`, `)` or `;`.
    Tail,
}

/// Parses a single Newick tree.
///
/// # Errors
/// - `RfError::Parse` for malformed input (see [`NewickParseError`])
/// - `RfError::DuplicateLabel` if a leaf label occurs twice
///
/// # Example
/// ```
/// use rf_tree_distance::newick::parse_newick;
///
/// let tree = parse_newick("((A:0.1,B:0.2):0.3,'C d',E);").unwrap();
/// assert_eq!(tree.n_leaves(), 4);
/// assert_eq!(tree.leaf_names(), vec!["A", "B", "C d", "E"]);
/// ```
pub fn parse_newick(newick: &str) -> Result<Tree, RfError> {
    let mut lexer = Lexer::new(newick);
    let mut tree = Tree::new();

    let mut open: Vec<NodeId> = Vec::new();
    let mut expect = Expect::Subtree;
    // Node whose tail (label / length) is currently being read
    let mut current: Option<NodeId> = None;
    let mut has_label = false;
    let mut has_length = false;
    let mut leaf_labels: HashSet<String> = HashSet::new();

    loop {
        let Some((token, position)) = lexer.next_token()? else {
            return Err(if tree.is_empty() && expect == Expect::Subtree {
                NewickParseError::Empty
            } else if !open.is_empty() {
                NewickParseError::UnbalancedParentheses { position: newick.len() }
            } else {
                NewickParseError::MissingSemicolon
            }
            .into());
        };

        match (expect, token) {
            (Expect::Subtree, Token::Open) => {
                let id = attach(&mut tree, open.last().copied(), Node::new(), "(", position)?;
                open.push(id);
            }
            (Expect::Subtree, Token::Label { text, .. }) => {
                if text.is_empty() {
                    return Err(NewickParseError::EmptyLabel { position }.into());
                }
                if !leaf_labels.insert(text.clone()) {
                    return Err(RfError::DuplicateLabel { label: text });
                }
                let id = attach(&mut tree, open.last().copied(), Node::new_named(&text), &text, position)?;
                current = Some(id);
                has_label = true;
                has_length = false;
                expect = Expect::Tail;
            }
            (Expect::Subtree, _) => {
                return Err(NewickParseError::EmptyLabel { position }.into());
            }
            (Expect::Tail, Token::Label { text, .. }) => {
                let id = current_node(current)?;
                if has_label || has_length {
                    return Err(NewickParseError::UnexpectedToken { found: text, position }.into());
                }
                tree.get_mut(id)?.name = Some(text);
                has_label = true;
            }
            (Expect::Tail, Token::Colon) => {
                let id = current_node(current)?;
                if has_length {
                    return Err(NewickParseError::UnexpectedToken { found: ":".to_string(), position }.into());
                }
                let length = branch_length(&mut lexer, position)?;
                tree.get_mut(id)?.parent_edge = Some(length);
                has_length = true;
            }
            (Expect::Tail, Token::Comma) => {
                if open.is_empty() {
                    return Err(NewickParseError::UnexpectedToken { found: ",".to_string(), position }.into());
                }
                current = None;
                expect = Expect::Subtree;
            }
            (Expect::Tail, Token::Close) => {
                let Some(id) = open.pop() else {
                    return Err(NewickParseError::UnbalancedParentheses { position }.into());
                };
                current = Some(id);
                has_label = false;
                has_length = false;
            }
            (Expect::Tail, Token::Semicolon) => {
                if !open.is_empty() {
                    return Err(NewickParseError::UnbalancedParentheses { position }.into());
                }
                if let Some((_, trailing)) = lexer.next_token()? {
                    return Err(NewickParseError::TrailingInput { position: trailing }.into());
                }
                break;
            }
            (Expect::Tail, token @ Token::Open) => {
                return Err(NewickParseError::UnexpectedToken { found: token.describe(), position }.into());
            }
        }
    }

    debug!(leaves = tree.n_leaves(), nodes = tree.size(), "parsed newick tree");
    Ok(tree)
}

/// Adds a node below `parent`, or as the root if there is no open group.
fn attach(
    tree: &mut Tree,
    parent: Option<NodeId>,
    node: Node,
    found: &str,
    position: usize,
) -> Result<NodeId, RfError> {
    match parent {
        Some(parent) => tree.add_child(node, parent, None),
        None if tree.is_empty() => tree.add(node),
        // A second top-level subtree, e.g. "(A,B)(C,D);"
        None => Err(NewickParseError::UnexpectedToken {
            found: found.to_string(),
            position,
        }
        .into()),
    }
}

fn current_node(current: Option<NodeId>) -> Result<NodeId, RfError> {
    current.ok_or_else(|| RfError::InvariantViolation("subtree tail without a subtree".to_string()))
}

/// Reads the number following a `:`.
fn branch_length(lexer: &mut Lexer<'_>, colon: usize) -> Result<f64, NewickParseError> {
    match lexer.next_token()? {
        Some((Token::Label { text, quoted: false }, position)) => match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(NewickParseError::InvalidBranchLength { value: text, position }),
        },
        Some((token, position)) => Err(NewickParseError::InvalidBranchLength {
            value: token.describe(),
            position,
        }),
        None => Err(NewickParseError::InvalidBranchLength {
            value: String::new(),
            position: colon + 1,
        }),
    }
}

/// Splits text holding several `;`-terminated trees into one slice per tree.
///
/// Semicolons inside quoted labels or comments do not split. Text after the
/// last semicolon is returned as a final slice if it is not blank, so that
/// parsing it reports the missing semicolon.
pub fn split_trees(content: &str) -> Result<Vec<&str>, NewickParseError> {
    let mut lexer = Lexer::new(content);
    let mut trees = Vec::new();
    let mut start = 0;
    while let Some((token, position)) = lexer.next_token()? {
        if token == Token::Semicolon {
            trees.push(content[start..=position].trim());
            start = position + 1;
        }
    }
    let tail = content[start..].trim();
    if !tail.is_empty() {
        trees.push(tail);
    }
    Ok(trees)
}

/// Reads one label, quoted or not, from the start of `text`.
///
/// Quoted labels keep their spaces and unescape `''`. Returns `None` if
/// `text` does not start with a label.
pub(crate) fn read_label(text: &str) -> Result<Option<String>, NewickParseError> {
    match Lexer::new(text).next_token()? {
        Some((Token::Label { text, .. }, _)) => Ok(Some(text)),
        _ => Ok(None),
    }
}

impl Tree {
    /// Parses a tree from a Newick string. See [`parse_newick`].
    pub fn from_newick(newick: &str) -> Result<Self, RfError> {
        parse_newick(newick)
    }
}

impl FromStr for Tree {
    type Err = RfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_newick(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_err(newick: &str) -> NewickParseError {
        match parse_newick(newick) {
            Err(RfError::Parse(e)) => e,
            other => panic!("expected parse error for {newick:?}, got {other:?}"),
        }
    }

    #[test]
    fn parses_nested_tree_with_lengths() {
        let tree = parse_newick("((A:0.1,B:0.2)AB:0.3,C:1e-2);").unwrap();
        assert_eq!(tree.n_leaves(), 3);
        assert_eq!(tree.size(), 5);
        assert_eq!(tree.leaf_names(), vec!["A", "B", "C"]);

        let root = tree.get(tree.get_root().unwrap()).unwrap();
        let ab = tree.get(root.children[0]).unwrap();
        assert_eq!(ab.name.as_deref(), Some("AB"));
        assert_eq!(ab.parent_edge, Some(0.3));
        assert_eq!(tree.get(root.children[1]).unwrap().parent_edge, Some(0.01));
    }

    #[test]
    fn ignores_whitespace_and_comments() {
        let tree = parse_newick("  ( A [&rate=0.5] : 1.5 ,\n\t(B,C)[comment] ) ;  ").unwrap();
        assert_eq!(tree.leaf_names(), vec!["A", "B", "C"]);
        let root = tree.get(0).unwrap();
        assert_eq!(tree.get(root.children[0]).unwrap().parent_edge, Some(1.5));
    }

    #[test]
    fn degenerate_trees_are_valid() {
        let single = parse_newick("A;").unwrap();
        assert_eq!(single.n_leaves(), 1);
        assert_eq!(single.size(), 1);

        let pair = parse_newick("(A,B);").unwrap();
        assert_eq!(pair.n_leaves(), 2);
    }

    #[test]
    fn quoted_labels_keep_interior() {
        let tree = parse_newick("('Homo sapiens','a,b:(c);', \"x y\", 'it''s');").unwrap();
        assert_eq!(
            tree.leaf_names(),
            vec!["Homo sapiens", "a,b:(c);", "x y", "it's"]
        );
    }

    #[test]
    fn numeric_labels_stay_strings() {
        let tree = parse_newick("((1,2)95,(3,007));").unwrap();
        assert_eq!(tree.leaf_names(), vec!["1", "2", "3", "007"]);
        let root = tree.get(0).unwrap();
        assert_eq!(tree.get(root.children[0]).unwrap().name.as_deref(), Some("95"));
    }

    #[test]
    fn unbalanced_parentheses() {
        assert!(matches!(parse_err("(A,B;"), NewickParseError::UnbalancedParentheses { position: 4 }));
        assert!(matches!(parse_err("(A,B));"), NewickParseError::UnbalancedParentheses { position: 5 }));
        assert!(matches!(parse_err("((A,B)"), NewickParseError::UnbalancedParentheses { .. }));
    }

    #[test]
    fn missing_semicolon() {
        assert_eq!(parse_err("(A,B)"), NewickParseError::MissingSemicolon);
        assert_eq!(parse_err("(A,B):0.5"), NewickParseError::MissingSemicolon);
    }

    #[test]
    fn empty_labels() {
        assert!(matches!(parse_err("(A,,B);"), NewickParseError::EmptyLabel { position: 3 }));
        assert!(matches!(parse_err("();"), NewickParseError::EmptyLabel { .. }));
        assert!(matches!(parse_err("(A,:0.1);"), NewickParseError::EmptyLabel { .. }));
        assert!(matches!(parse_err("('',B);"), NewickParseError::EmptyLabel { .. }));
        assert!(matches!(parse_err(";"), NewickParseError::EmptyLabel { .. }));
        assert_eq!(parse_err("   "), NewickParseError::Empty);
    }

    #[test]
    fn invalid_branch_lengths() {
        assert!(matches!(
            parse_err("(A:x,B);"),
            NewickParseError::InvalidBranchLength { ref value, .. } if value == "x"
        ));
        assert!(matches!(parse_err("(A:,B);"), NewickParseError::InvalidBranchLength { .. }));
        assert!(matches!(parse_err("(A:'1',B);"), NewickParseError::InvalidBranchLength { .. }));
        assert!(matches!(parse_err("(A:inf,B);"), NewickParseError::InvalidBranchLength { .. }));
    }

    #[test]
    fn trailing_and_unexpected_input() {
        assert!(matches!(parse_err("(A,B);C"), NewickParseError::TrailingInput { position: 6 }));
        assert!(matches!(parse_err("(A,B);;"), NewickParseError::TrailingInput { .. }));
        assert!(matches!(parse_err("(A,B)(C,D);"), NewickParseError::UnexpectedToken { .. }));
        assert!(matches!(parse_err("(A B,C);"), NewickParseError::UnexpectedToken { .. }));
        assert!(matches!(parse_err("A,B;"), NewickParseError::UnexpectedToken { .. }));
        assert!(matches!(parse_err("(A:1:2,B);"), NewickParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn unterminated_quote_and_comment() {
        assert!(matches!(parse_err("('A,B);"), NewickParseError::UnterminatedQuote { position: 1 }));
        assert!(matches!(parse_err("(A[x,B);"), NewickParseError::UnterminatedComment { position: 2 }));
    }

    #[test]
    fn duplicate_leaf_labels() {
        match parse_newick("((A,B),(A,C));") {
            Err(RfError::DuplicateLabel { label }) => assert_eq!(label, "A"),
            other => panic!("expected duplicate label error, got {other:?}"),
        }
        // Internal labels may repeat leaf labels
        assert!(parse_newick("((A,B)A,C);").is_ok());
    }

    #[test]
    fn deep_caterpillar_does_not_overflow() {
        let depth = 20_000;
        let mut newick = String::new();
        for _ in 0..depth {
            newick.push('(');
        }
        newick.push_str("L0");
        for i in 1..=depth {
            newick.push_str(&format!(",L{i})"));
        }
        newick.push(';');
        let tree = parse_newick(&newick).unwrap();
        assert_eq!(tree.n_leaves(), depth + 1);
    }

    #[test]
    fn round_trips_through_writer() {
        let input = "(('it''s':0.5,B)95:1,C,'D E');";
        let tree = parse_newick(input).unwrap();
        let again = parse_newick(&tree.to_newick()).unwrap();
        assert_eq!(tree, again);
    }

    #[test]
    fn from_str_and_from_newick_agree() {
        let a: Tree = "(A,(B,C));".parse().unwrap();
        let b = Tree::from_newick("(A,(B,C));").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn splits_multi_tree_text() {
        let content = "(A,B);\n('x;y',C) [;] ;\n\n(D,E)";
        let trees = split_trees(content).unwrap();
        assert_eq!(trees, vec!["(A,B);", "('x;y',C) [;] ;", "(D,E)"]);
        assert!(split_trees("  \n").unwrap().is_empty());
    }

    #[test]
    fn reads_single_labels() {
        assert_eq!(read_label("'Homo sapiens',").unwrap(), Some("Homo sapiens".to_string()));
        assert_eq!(read_label("'it''s'").unwrap(), Some("it's".to_string()));
        assert_eq!(read_label("Pan,").unwrap(), Some("Pan".to_string()));
        assert_eq!(read_label(";").unwrap(), None);
        assert!(read_label("'open").is_err());
    }
}
