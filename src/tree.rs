use std::fmt;

/// How an output redirection opens its file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutMode {
    /// `>`: create or truncate.
    #[default]
    Truncate,
    /// `>>`: create or append.
    Append,
}

/// Condition under which a node's `next` runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NextMode {
    /// `;`, `&` and implicit sequencing.
    #[default]
    Always,
    /// `&&`
    OnSuccess,
    /// `||`
    OnFailure,
}

impl NextMode {
    /// Whether `next` runs after a stage that did (or did not) succeed.
    pub fn permits(self, succeeded: bool) -> bool {
        match self {
            NextMode::Always => true,
            NextMode::OnSuccess => succeeded,
            NextMode::OnFailure => !succeeded,
        }
    }
}

/// One node of the command tree.
///
/// A node either runs the simple command in `argv` or delegates to the group
/// in `subshell`, never both. Children are owned exclusively, so the tree is
/// acyclic and dropping the root releases everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Command and arguments; empty when the node only carries a subshell.
    pub argv: Vec<String>,
    pub infile: Option<String>,
    pub outfile: Option<String>,
    /// Only meaningful when `outfile` is set.
    pub outmode: OutMode,
    /// When set, the caller does not wait for this node.
    pub background: bool,
    /// Parenthesized group.
    pub subshell: Option<Box<Node>>,
    /// Right-hand side of `|`.
    pub pipe_to: Option<Box<Node>>,
    /// Sequential or conditional successor.
    pub next: Option<Box<Node>>,
    /// Only meaningful when `next` is set.
    pub next_mode: NextMode,
}

impl Node {
    /// A node with nothing to run and no children.
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
            && self.subshell.is_none()
            && self.pipe_to.is_none()
            && self.next.is_none()
    }

    /// Printer that lists every field, including empty ones.
    pub fn display_full(&self) -> TreePrinter<'_> {
        TreePrinter {
            node: self,
            full: true,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        TreePrinter {
            node: self,
            full: false,
        }
        .fmt(f)
    }
}

const INDENT: &str = ":   ";

/// Indented block rendering of a tree, used by `--print-tree`.
pub struct TreePrinter<'a> {
    node: &'a Node,
    full: bool,
}

impl TreePrinter<'_> {
    fn write_node(&self, f: &mut fmt::Formatter<'_>, node: Option<&Node>, depth: usize) -> fmt::Result {
        let Some(node) = node else {
            return writeln!(f, "none");
        };
        let pad = INDENT.repeat(depth + 1);

        writeln!(f, "{{")?;
        write!(f, "{pad}argv:")?;
        for arg in &node.argv {
            write!(f, " [{arg}]")?;
        }
        writeln!(f)?;

        if self.full || node.infile.is_some() {
            writeln!(f, "{pad}infile: {}", node.infile.as_deref().unwrap_or("none"))?;
        }
        if self.full || node.outfile.is_some() {
            writeln!(f, "{pad}outfile: {}", node.outfile.as_deref().unwrap_or("none"))?;
            writeln!(f, "{pad}outmode: {:?}", node.outmode)?;
        }
        writeln!(f, "{pad}background: {}", node.background)?;

        let children = [
            ("subshell", node.subshell.as_deref()),
            ("pipe_to", node.pipe_to.as_deref()),
            ("next", node.next.as_deref()),
        ];
        for (name, child) in children {
            if self.full || child.is_some() {
                write!(f, "{pad}{name}: ")?;
                self.write_node(f, child, depth + 1)?;
            }
        }
        if self.full || node.next.is_some() {
            writeln!(f, "{pad}next_mode: {:?}", node.next_mode)?;
        }
        writeln!(f, "{}}}", INDENT.repeat(depth))
    }
}

impl fmt::Display for TreePrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, Some(self.node), 0)
    }
}
